//! logview-feeds — log source backends for logview.
//!
//! Each backend turns one kind of log source into the same three
//! operations: list addressable entries, tail historical content, and watch
//! new lines until cancelled. The HTTP layer only ever sees [`LogBackend`].

pub mod dirfiles;
pub mod docker;
pub mod journald;
pub mod lines;
pub mod watcher;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use logview_core::Listing;
use tokio_util::sync::CancellationToken;

/// Lines returned when a request does not say how many it wants.
pub const DEFAULT_TAIL_LINES: i64 = 1000;

/// Errors a backend reports for a single request. None of them affect
/// other sessions or the catalog.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Io(std::io::Error),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound,
            _ => BackendError::Io(err),
        }
    }
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(err: tokio::task::JoinError) -> Self {
        BackendError::Io(std::io::Error::other(err))
    }
}

/// Parameters shared by `tail` and `watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Opaque entry id, as returned by `list`.
    pub id: String,
    /// Number of trailing lines; `<= 0` means the whole history.
    pub lines: i64,
    /// Stop at entries newer than this (journal only).
    pub until: Option<DateTime<Utc>>,
}

impl LogQuery {
    pub fn new(id: impl Into<String>, lines: i64) -> Self {
        Self {
            id: id.into(),
            lines,
            until: None,
        }
    }

    /// Trailing line count, or `None` for the whole history.
    pub fn line_limit(&self) -> Option<u64> {
        u64::try_from(self.lines).ok().filter(|&n| n > 0)
    }
}

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Live lines, one item per line, terminator stripped. Ends quietly when
/// the session is cancelled or the source is exhausted.
pub type LineStream = BoxStream<'static, String>;

/// Bounded historical content.
pub struct TailOutput {
    pub content_type: String,
    pub body: ByteStream,
}

/// Trait implemented by each log source.
///
/// `watch` must not hold its handle beyond cancellation of `cancel` or the
/// returned stream being dropped.
#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn list(&self) -> Result<Listing, BackendError>;

    async fn tail(&self, query: &LogQuery) -> Result<TailOutput, BackendError>;

    async fn watch(
        &self,
        query: &LogQuery,
        cancel: CancellationToken,
    ) -> Result<LineStream, BackendError>;
}
