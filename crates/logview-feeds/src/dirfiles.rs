//! File backend — glob-discovered files on disk.
//!
//! Entries come from the [`Indexer`] catalog; ids resolve against the
//! snapshot current at request time. Tails are served straight from the
//! file starting at the tail offset; watches hand the same offset to the
//! streaming watcher.

use crate::watcher::{follow_file, SessionGauge, WatchOptions};
use crate::{BackendError, LineStream, LogBackend, LogQuery, TailOutput};
use async_trait::async_trait;
use futures::StreamExt;
use logview_core::tail::{offset_for_last_lines, TailError};
use logview_core::{Indexer, Listing};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub struct DirFiles {
    indexer: Arc<Indexer>,
    options: WatchOptions,
    sessions: SessionGauge,
}

impl DirFiles {
    pub fn new(indexer: Arc<Indexer>, options: WatchOptions) -> Self {
        Self {
            indexer,
            options,
            sessions: SessionGauge::default(),
        }
    }

    /// Watch sessions currently holding a file open.
    pub fn sessions(&self) -> &SessionGauge {
        &self.sessions
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, BackendError> {
        debug!(id, "resolving file");
        self.indexer
            .current()
            .get(id)
            .map(|f| f.path.clone())
            .ok_or(BackendError::NotFound)
    }
}

/// Where a read for `lines` trailing lines should start. Sources too short
/// to scan are read whole.
pub fn start_offset<R: Read + Seek>(
    src: &mut R,
    lines: Option<u64>,
    buffer_size: usize,
) -> std::io::Result<u64> {
    let Some(lines) = lines else {
        return Ok(0);
    };
    match offset_for_last_lines(src, lines, buffer_size) {
        Ok(offset) => Ok(offset),
        Err(TailError::TooShort) => Ok(0),
        Err(TailError::Io(err)) => Err(err),
    }
}

/// Open `path` positioned at the start of its last `lines` lines. The
/// handle and the offset always describe the same file, even if the path
/// is replaced afterwards.
pub fn open_at(
    path: &Path,
    lines: Option<u64>,
    buffer_size: usize,
) -> std::io::Result<(std::fs::File, u64)> {
    let mut file = std::fs::File::open(path)?;
    let offset = start_offset(&mut file, lines, buffer_size)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok((file, offset))
}

/// Content type guessed from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("xml") => "text/xml; charset=utf-8",
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[async_trait]
impl LogBackend for DirFiles {
    async fn list(&self) -> Result<Listing, BackendError> {
        let indexer = Arc::clone(&self.indexer);
        Ok(tokio::task::spawn_blocking(move || indexer.listing()).await?)
    }

    async fn tail(&self, query: &LogQuery) -> Result<TailOutput, BackendError> {
        let path = self.resolve(&query.id)?;
        let lines = query.line_limit();
        let buffer_size = self.options.buffer_size;

        let content_type = content_type_for(&path).to_string();
        let (file, _) =
            tokio::task::spawn_blocking(move || open_at(&path, lines, buffer_size)).await??;

        let body = ReaderStream::with_capacity(tokio::fs::File::from_std(file), buffer_size);
        Ok(TailOutput {
            content_type,
            body: body.boxed(),
        })
    }

    async fn watch(
        &self,
        query: &LogQuery,
        cancel: CancellationToken,
    ) -> Result<LineStream, BackendError> {
        let path = self.resolve(&query.id)?;
        let lines = query.line_limit();
        let buffer_size = self.options.buffer_size;

        let (file, offset) = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || open_at(&path, lines, buffer_size)).await??
        };

        Ok(follow_file(
            tokio::fs::File::from_std(file),
            &path,
            offset,
            cancel,
            &self.options,
            &self.sessions,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
