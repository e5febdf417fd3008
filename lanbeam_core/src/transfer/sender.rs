use crate::config::{DiscoveryConfig, SenderConfig};
use crate::discovery::discover_one;
use crate::error::TransferError;
use std::io;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::constants::AUTO_HOST;
use super::protocol::TransferHeader;
use super::utils::{fill_chunk, progress_percent};

/// One file headed to one receiver. Built once per file, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub file_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub dest_filename: String,
}

impl TransferRequest {
    pub fn new(
        file_path: impl Into<PathBuf>,
        host: impl Into<String>,
        port: u16,
        dest_filename: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            host: host.into(),
            port,
            dest_filename: dest_filename.into(),
        }
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn addr(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Send `file_path` to `host:port` so the receiver stores it as `dest_filename`.
///
/// `host` may be `"auto"`, in which case the first receiver that answers a
/// discovery probe is used. `on_progress` gets the cumulative percentage after
/// every chunk; it never fires for an empty file. Returns the number of body
/// bytes sent.
pub async fn send_file<F>(
    file_path: impl AsRef<Path>,
    host: &str,
    port: u16,
    dest_filename: &str,
    on_progress: F,
) -> Result<u64, TransferError>
where
    F: FnMut(f64),
{
    send_file_with_config(
        file_path,
        host,
        port,
        dest_filename,
        &SenderConfig::default(),
        on_progress,
    )
    .await
}

pub async fn send_file_with_config<F>(
    file_path: impl AsRef<Path>,
    host: &str,
    port: u16,
    dest_filename: &str,
    config: &SenderConfig,
    on_progress: F,
) -> Result<u64, TransferError>
where
    F: FnMut(f64),
{
    let file_path = file_path.as_ref();
    let file_size = check_source(file_path).await?;

    let host = resolve_host(host, &config.discovery).await?;
    let request = TransferRequest::new(file_path, host, port, dest_filename);
    stream_file(&request, file_size, config, on_progress).await
}

/// Turn `"auto"` into a discovered address; pass anything else through
pub async fn resolve_host(host: &str, discovery: &DiscoveryConfig) -> Result<String, TransferError> {
    if !host.eq_ignore_ascii_case(AUTO_HOST) {
        return Ok(host.to_string());
    }

    debug!("Resolving receiver via discovery");
    discover_one(discovery)
        .await
        .map(|found| found.ip.to_string())
        .ok_or(TransferError::NoReceiverFound)
}

/// Stream one file over a fresh connection
pub async fn send_request<F>(
    request: &TransferRequest,
    config: &SenderConfig,
    on_progress: F,
) -> Result<u64, TransferError>
where
    F: FnMut(f64),
{
    let file_size = check_source(&request.file_path).await?;
    stream_file(request, file_size, config, on_progress).await
}

/// `file_size` comes from `check_source` and is what the header announces
async fn stream_file<F>(
    request: &TransferRequest,
    file_size: u64,
    config: &SenderConfig,
    mut on_progress: F,
) -> Result<u64, TransferError>
where
    F: FnMut(f64),
{
    let path = request.file_path.as_path();
    let file = File::open(path)
        .await
        .map_err(|source| read_error(path, source))?;

    let addr = request.addr();
    debug!("Connecting to {}", addr);
    let mut stream = connect(request, config.connect_timeout).await?;

    let header = TransferHeader::new(request.dest_filename.as_str(), file_size);
    header
        .write_to(&mut stream)
        .await
        .map_err(|source| transfer_error(&addr, source))?;

    // Never stream more than the header promised, even if the file grows.
    let mut body = file.take(file_size);
    let mut buffer = vec![0u8; config.chunk_size.max(1)];
    let mut sent: u64 = 0;

    while sent < file_size {
        let n = fill_chunk(&mut body, &mut buffer)
            .await
            .map_err(|source| read_error(path, source))?;
        if n == 0 {
            return Err(read_error(
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file shrank to {} of {} bytes", sent, file_size),
                ),
            ));
        }

        stream
            .write_all(&buffer[..n])
            .await
            .map_err(|source| transfer_error(&addr, source))?;
        sent += n as u64;

        on_progress(progress_percent(sent, file_size));
    }

    stream
        .shutdown()
        .await
        .map_err(|source| transfer_error(&addr, source))?;

    info!(
        "Sent {} as '{}' ({} bytes) to {}",
        path.display(),
        request.dest_filename,
        sent,
        addr
    );
    Ok(sent)
}

/// Size of `path` if it is an existing regular file
async fn check_source(path: &Path) -> Result<u64, TransferError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(TransferError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TransferError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(read_error(path, e)),
    }
}

async fn connect(request: &TransferRequest, timeout: Duration) -> Result<TcpStream, TransferError> {
    let attempt = TcpStream::connect((request.host.as_str(), request.port));
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TransferError::ConnectionFailed {
            addr: request.addr(),
            source,
        }),
        Err(_) => Err(TransferError::ConnectionFailed {
            addr: request.addr(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        }),
    }
}

fn read_error(path: &Path, source: io::Error) -> TransferError {
    TransferError::FileRead {
        path: path.to_path_buf(),
        source,
    }
}

fn transfer_error(addr: &str, source: io::Error) -> TransferError {
    TransferError::Transfer {
        addr: addr.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_addr() {
        let req = TransferRequest::new("/tmp/a", "192.168.1.20", 9999, "a");
        assert_eq!(req.addr(), "192.168.1.20:9999");

        let req = TransferRequest::new("/tmp/a", "::1", 9999, "a");
        assert_eq!(req.addr(), "[::1]:9999");

        let req = TransferRequest::new("/tmp/a", "laptop.local", 80, "a");
        assert_eq!(req.addr(), "laptop.local:80");
    }

    #[tokio::test]
    async fn test_resolve_explicit_host_passthrough() {
        let host = resolve_host("10.0.0.5", &DiscoveryConfig::default())
            .await
            .unwrap();
        assert_eq!(host, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_directory_is_not_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_source(dir.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound { .. }));
    }
}
