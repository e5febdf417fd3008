/// Default TCP port the file server listens on
pub const TRANSFER_PORT: u16 = 9999;

/// Bytes read from disk and written to the socket per iteration
pub const CHUNK_SIZE: usize = 1024;

/// Host sentinel that asks the sender to resolve a receiver via discovery
pub const AUTO_HOST: &str = "auto";

/// Upper bound for a single header line, newline included
pub const MAX_HEADER_LINE: usize = 4096;

/// Longest file name the receiver will write to disk
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Connect attempts that take longer than this fail with `ConnectionFailed`
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connections that send no complete header within this are dropped
pub const HEADER_TIMEOUT_SECS: u64 = 30;

/// Read buffer used by the receiving side
pub const RECEIVE_BUFFER_SIZE: usize = 64 * 1024;
