//! Streaming watcher — follow a growing file and emit each completed line.
//!
//! A session opens the file at a start offset, drains what is there, then
//! sleeps until either `notify` reports a change or the poll tick fires.
//! Every line is pushed into a channel of capacity one, so a slow consumer
//! slows the session down; nothing is queued or dropped. The session ends,
//! releasing its file handle, when the cancellation token fires or the
//! consumer goes away.

use crate::lines::LineDecoder;
use crate::LineStream;
use futures::StreamExt;
use logview_core::tail::DEFAULT_BUFFER_SIZE;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fallback poll interval when no filesystem event arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub buffer_size: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Session gauge
// ---------------------------------------------------------------------------

/// Counts sessions currently holding a handle.
#[derive(Debug, Clone, Default)]
pub struct SessionGauge(Arc<AtomicUsize>);

impl SessionGauge {
    pub fn active(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn enter(&self) -> SessionGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        SessionGuard(Arc::clone(&self.0))
    }
}

/// Decrements the gauge when the session's task finishes.
#[derive(Debug)]
pub struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

/// Open `path` at `offset` and follow it until `cancel` fires.
///
/// The file is opened before returning, so a missing file is reported to
/// the caller rather than ending the stream silently.
pub async fn watch_file(
    path: &Path,
    offset: u64,
    cancel: CancellationToken,
    options: &WatchOptions,
    gauge: &SessionGauge,
) -> std::io::Result<LineStream> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(follow_file(file, path, offset, cancel, options, gauge))
}

/// Follow an already opened `file`, positioned at `offset`, until `cancel`
/// fires. `path` is only watched for change notifications.
pub fn follow_file(
    file: tokio::fs::File,
    path: &Path,
    offset: u64,
    cancel: CancellationToken,
    options: &WatchOptions,
    gauge: &SessionGauge,
) -> LineStream {
    let (tx, rx) = mpsc::channel(1);
    let session = gauge.enter();
    let path = path.to_path_buf();
    let options = options.clone();

    tokio::spawn(async move {
        let _session = session;
        debug!(path = %path.display(), offset, "watch session started");
        if let Err(err) = follow(file, &path, offset, &cancel, &options, tx).await {
            warn!(%err, path = %path.display(), "watch session failed");
        }
        debug!(path = %path.display(), "watch session closed");
    });

    ReceiverStream::new(rx).boxed()
}

async fn follow(
    mut file: tokio::fs::File,
    path: &Path,
    mut offset: u64,
    cancel: &CancellationToken,
    options: &WatchOptions,
    tx: mpsc::Sender<String>,
) -> std::io::Result<()> {
    // Holding a sender keeps `wake_rx` open even when notify is unavailable.
    let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
    let _fs_watcher = match fs_watcher(path, wake_tx.clone()) {
        Ok(w) => Some(w),
        Err(err) => {
            debug!(%err, path = %path.display(), "notify unavailable, polling only");
            None
        }
    };

    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut decoder = LineDecoder::default();
    let mut buf = vec![0u8; options.buffer_size.max(1)];

    loop {
        loop {
            if cancel.is_cancelled() || tx.is_closed() {
                return Ok(());
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            offset += n as u64;
            for line in decoder.push(&buf[..n]) {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    sent = tx.send(line) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }

        if file.metadata().await?.len() < offset {
            debug!(path = %path.display(), offset, "file truncated, rewinding");
            file.seek(SeekFrom::Start(0)).await?;
            offset = 0;
            decoder.reset();
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = tx.closed() => return Ok(()),
            _ = wake_rx.recv() => {}
            _ = ticker.tick() => {}
        }
    }
}

fn fs_watcher(path: &Path, wake: mpsc::Sender<()>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = wake.try_send(());
        }
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
