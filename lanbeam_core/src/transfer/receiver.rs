use crate::error::ReceiveError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::constants::{HEADER_TIMEOUT_SECS, RECEIVE_BUFFER_SIZE};
use super::protocol::TransferHeader;
use super::utils::{progress_percent, sanitize_file_name};

static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// A file that arrived completely and is on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Sanitized name actually used on disk
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Read one header + body from `stream` into `download_dir`.
///
/// The body may arrive in pieces of any size and is written to a temporary
/// `.part` file first. Only a complete body replaces `download_dir/<name>`;
/// if the sender disconnects early the temporary file is deleted and any
/// earlier file of the same name is left as it was.
pub async fn receive_file<R, F>(
    stream: R,
    download_dir: &Path,
    on_progress: F,
) -> Result<ReceivedFile, ReceiveError>
where
    R: AsyncRead + Unpin,
    F: FnMut(f64),
{
    receive_file_with_timeout(
        stream,
        download_dir,
        Duration::from_secs(HEADER_TIMEOUT_SECS),
        on_progress,
    )
    .await
}

/// Like [`receive_file`], failing with `HeaderTimeout` when the header does
/// not arrive within `header_timeout`
pub async fn receive_file_with_timeout<R, F>(
    stream: R,
    download_dir: &Path,
    header_timeout: Duration,
    mut on_progress: F,
) -> Result<ReceivedFile, ReceiveError>
where
    R: AsyncRead + Unpin,
    F: FnMut(f64),
{
    let mut reader = BufReader::new(stream);
    let header = tokio::time::timeout(header_timeout, TransferHeader::read_from(&mut reader))
        .await
        .map_err(|_| ReceiveError::HeaderTimeout(header_timeout))??;
    let file_name = sanitize_file_name(&header.file_name);
    if file_name != header.file_name {
        debug!("Sanitized '{}' to '{}'", header.file_name, file_name);
    }

    tokio::fs::create_dir_all(download_dir).await?;
    let path = download_dir.join(&file_name);

    info!("Receiving: {} ({} bytes)", file_name, header.file_size);
    let (part_path, mut file) = create_part_file(download_dir).await?;

    let written = write_body(&mut reader, &mut file, header.file_size, &mut on_progress).await;
    drop(file);
    let result = match written {
        Ok(()) => tokio::fs::rename(&part_path, &path).await.map_err(ReceiveError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        if let Err(remove_err) = tokio::fs::remove_file(&part_path).await {
            warn!("Cannot remove partial file {:?}: {}", part_path, remove_err);
        }
        return Err(e);
    }

    info!("Saved {:?}", path);
    Ok(ReceivedFile {
        file_name,
        path,
        size: header.file_size,
    })
}

/// Fresh, exclusively created temporary file inside `dir`
async fn create_part_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    loop {
        let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
        let part_path = dir.join(format!(".lanbeam-{}-{}.part", std::process::id(), seq));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .await
        {
            Ok(file) => return Ok((part_path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

async fn write_body<R, F>(
    reader: &mut R,
    file: &mut File,
    expected: u64,
    on_progress: &mut F,
) -> Result<(), ReceiveError>
where
    R: AsyncRead + Unpin,
    F: FnMut(f64),
{
    let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
    let mut received: u64 = 0;

    while received < expected {
        let want = (expected - received).min(buffer.len() as u64) as usize;
        let n = reader.read(&mut buffer[..want]).await?;
        if n == 0 {
            return Err(ReceiveError::Incomplete { expected, received });
        }
        file.write_all(&buffer[..n]).await?;
        received += n as u64;
        on_progress(progress_percent(received, expected));
    }

    file.flush().await?;
    Ok(())
}
