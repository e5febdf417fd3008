use crate::error::HeaderError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::MAX_HEADER_LINE;

/// Two-line preamble written before the file body.
///
/// Wire form is `<file_name>\n<file_size>\n`. There is no escaping, so a
/// file name containing `\n` breaks the framing; callers must not send one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    pub file_name: String,
    pub file_size: u64,
}

impl TransferHeader {
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{}\n{}\n", self.file_name, self.file_size).into_bytes()
    }

    /// Write the header onto an already-open stream
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.encode()).await
    }

    /// Read both header lines. Bytes after the second newline stay buffered
    /// in `reader` and belong to the file body.
    pub async fn read_from<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Self, HeaderError> {
        let file_name = read_line(reader).await?;
        let size_line = read_line(reader).await?;
        let file_size = size_line
            .trim()
            .parse::<u64>()
            .map_err(|_| HeaderError::InvalidSize(size_line.clone()))?;

        Ok(Self {
            file_name,
            file_size,
        })
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, HeaderError> {
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_HEADER_LINE as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if buf.last() != Some(&b'\n') {
        return Err(if n >= MAX_HEADER_LINE {
            HeaderError::LineTooLong(MAX_HEADER_LINE)
        } else {
            HeaderError::Truncated
        });
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    String::from_utf8(buf).map_err(|_| HeaderError::InvalidUtf8)
}
