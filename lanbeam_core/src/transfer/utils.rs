use super::constants::MAX_FILENAME_LENGTH;
use tokio::io::{AsyncRead, AsyncReadExt};

const FALLBACK_NAME: &str = "unknown_file";

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Cumulative progress as a percentage in `[0, 100]`
pub fn progress_percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    sent as f64 / total as f64 * 100.0
}

/// Read until `buf` is full or the reader hits EOF.
///
/// Returns the number of bytes placed in `buf`; less than `buf.len()` only at EOF.
pub async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reduce a name received from the network to a single safe path component
pub fn sanitize_file_name(file_name: &str) -> String {
    let last = file_name.rsplit(['/', '\\']).next().unwrap_or_default();

    let clean: String = last.chars().filter(|c| !c.is_control()).collect();

    if clean.trim().is_empty()
        || clean == "."
        || clean == ".."
        || RESERVED_NAMES.iter().any(|r| clean.eq_ignore_ascii_case(r))
    {
        return FALLBACK_NAME.to_string();
    }

    truncate_keeping_extension(clean)
}

fn truncate_keeping_extension(name: String) -> String {
    if name.len() <= MAX_FILENAME_LENGTH {
        return name;
    }

    let ext = match name.rfind('.') {
        Some(idx) if name.len() - idx < 20 => &name[idx..],
        _ => "",
    };

    let mut cutoff = MAX_FILENAME_LENGTH - ext.len();
    while !name.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = name[..cutoff].to_string();
    truncated.push_str(ext);
    truncated
}
