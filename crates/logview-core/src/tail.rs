//! Tail-offset engine — find where "the last N lines" start without reading
//! the whole file.
//!
//! The source is scanned backwards in fixed-size chunks from the end. LF and
//! CR are both terminators and are counted independently, so a CRLF pair
//! counts twice: on CRLF files a caller must ask for `2 * n` to get `n`
//! lines. Terminators are single ASCII bytes, so chunk boundaries never
//! corrupt detection whatever the text encoding.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Default chunk size for the backward scan.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// Fewer than two bytes: there is nothing to count back over.
    #[error("source is too short to tail")]
    TooShort,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Byte offset from which reading to end-of-stream yields the last `lines`
/// lines of `src`.
///
/// Returns `0` when the source holds no more than `lines` lines, and the
/// end offset when `lines == 0`. A final terminator does not open an extra
/// empty line. Unterminated trailing content is always part of the answer.
pub fn offset_for_last_lines<R: Read + Seek>(
    src: &mut R,
    lines: u64,
    buffer_size: usize,
) -> Result<u64, TailError> {
    let end = src.seek(SeekFrom::End(0))?;
    if end < 2 {
        return Err(TailError::TooShort);
    }
    if lines == 0 {
        return Ok(end);
    }

    let mut tail = [0u8; 2];
    src.seek(SeekFrom::Start(end - 2))?;
    src.read_exact(&mut tail)?;

    // Signed: the trailing terminator starts the count at -1.
    let target = i64::try_from(lines).unwrap_or(i64::MAX);
    let mut count: i64 = if is_terminator(tail[1]) { -1 } else { 0 };

    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut cursor = end;
    while cursor > 0 {
        let len = (buf.len() as u64).min(cursor) as usize;
        let start = cursor - len as u64;
        src.seek(SeekFrom::Start(start))?;
        let chunk = &mut buf[..len];
        src.read_exact(chunk)?;
        chunk.reverse();

        for (back, &b) in chunk.iter().enumerate() {
            if !is_terminator(b) {
                continue;
            }
            count += 1;
            if count >= target {
                // `back` counts from the end of the chunk; the offset is the
                // byte right after this terminator.
                return Ok(cursor - back as u64);
            }
        }
        cursor = start;
    }
    Ok(0)
}

/// [`offset_for_last_lines`] over a file on disk. The handle is closed
/// before returning.
pub fn offset_for_last_lines_in(
    path: impl AsRef<Path>,
    lines: u64,
    buffer_size: usize,
) -> Result<u64, TailError> {
    let mut file = std::fs::File::open(path)?;
    offset_for_last_lines(&mut file, lines, buffer_size)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
