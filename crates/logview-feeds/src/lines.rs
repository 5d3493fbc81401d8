//! Incremental line splitting for byte streams that arrive in pieces.

/// Splits bytes into lines terminated by LF, CR or CRLF.
///
/// A CRLF pair ends one line even when the CR and LF arrive in different
/// chunks. Unterminated bytes are held until a later chunk completes them,
/// up to `limit` bytes; a longer run is emitted in `limit`-sized pieces.
#[derive(Debug)]
pub struct LineDecoder {
    pending: Vec<u8>,
    after_cr: bool,
    limit: usize,
}

/// Longest line held back by a default decoder.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            after_cr: false,
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in chunk {
            if std::mem::take(&mut self.after_cr) && b == b'\n' {
                continue;
            }
            match b {
                b'\n' => lines.push(self.take_line()),
                b'\r' => {
                    lines.push(self.take_line());
                    self.after_cr = true;
                }
                _ => {
                    self.pending.push(b);
                    if self.pending.len() >= self.limit {
                        lines.push(self.take_line());
                    }
                }
            }
        }
        lines
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.after_cr = false;
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}
