//! On-disk fixtures: a temporary log tree plus small text corpora.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Three short terminated lines.
pub const ABC: &str = "a\nb\nc\n";

/// Lines with mixed terminators. CRLF counts as two terminators when
/// computing tail offsets.
pub const MIXED_TERMINATORS: &str = "one\r\ntwo\rthree\nfour\n";

/// A temporary directory of log files, removed on drop.
pub struct LogTree {
    dir: tempfile::TempDir,
}

impl LogTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// A glob pattern rooted in this tree.
    pub fn pattern(&self, rel: &str) -> String {
        self.path(rel).to_string_lossy().into_owned()
    }

    /// Create (or overwrite) `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    pub fn append(&self, rel: &str, content: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(self.path(rel))
            .expect("open for append");
        f.write_all(content.as_bytes()).expect("append");
        f.flush().expect("flush");
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path(rel)).expect("remove fixture");
    }
}

/// `count` numbered lines, each terminated by LF.
pub fn numbered_lines(count: usize) -> String {
    (0..count).map(|i| format!("line {i:05}\n")).collect()
}
