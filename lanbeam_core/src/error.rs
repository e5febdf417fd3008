//! Error types returned by the transfer and receive paths.
//!
//! Discovery has no error type: finding nobody is an empty result.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure while pushing a file to a receiver
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("File '{}' does not exist", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Cannot read '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No file server found on local network")]
    NoReceiverFound,

    #[error("Cannot connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Transfer to {addr} failed: {source}")]
    Transfer {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Malformed two-line header on the receiving side
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("Stream ended before the header was complete")]
    Truncated,

    #[error("Header line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Header line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid file size in header: {0:?}")]
    InvalidSize(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure while accepting a file from a sender
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("Bad header: {0}")]
    Header(#[from] HeaderError),

    #[error("Sender disconnected after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },

    #[error("No header received within {0:?}")]
    HeaderTimeout(Duration),

    #[error(transparent)]
    Io(#[from] io::Error),
}
