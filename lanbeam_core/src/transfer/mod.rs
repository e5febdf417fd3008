//! Single-file transfer over TCP.
//!
//! Wire format: `<file_name>\n<file_size>\n` followed by exactly
//! `file_size` raw bytes. One connection per file.
//!
//! This module provides:
//! - Header framing shared by both sides
//! - The sending client with per-chunk progress
//! - The receiving side and its accept loop

pub mod constants;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod utils;

// Re-export public API
pub use constants::{AUTO_HOST, CHUNK_SIZE, TRANSFER_PORT};
pub use protocol::TransferHeader;
pub use receiver::{ReceivedFile, receive_file, receive_file_with_timeout};
pub use sender::{TransferRequest, resolve_host, send_file, send_file_with_config, send_request};
pub use server::run_server;
