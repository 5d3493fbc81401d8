//! Server settings assembled by the binary from its command line.

use logview_core::tail::DEFAULT_BUFFER_SIZE;
use logview_core::SourceConfig;
use logview_feeds::docker::DockerOptions;
use logview_feeds::journald::JournaldOptions;
use logview_feeds::watcher::DEFAULT_POLL_INTERVAL;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8514";

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// `host:port`, or `:port` for all interfaces.
    pub listen: String,
    /// Route prefix, empty or starting with `/`.
    pub prefix: String,
    /// Scan buffer for tail offsets and file reads.
    pub buffer_size: usize,
    /// Minimum time between catalog walks and unit discoveries.
    pub refresh_interval: Duration,
    /// Watch poll fallback when no filesystem event arrives.
    pub poll_interval: Duration,
    /// File sources; `None` disables the `dirfiles` backend.
    pub sources: Option<SourceConfig>,
    /// `None` disables the `docker` backend.
    pub docker: Option<DockerOptions>,
    /// `None` disables the `systemd` backend.
    pub journald: Option<JournaldOptions>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            prefix: String::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            refresh_interval: logview_core::indexer::DEFAULT_REFRESH_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sources: None,
            docker: None,
            journald: None,
        }
    }
}

/// `"logs/"` → `"/logs"`, `""` and `"/"` → `""`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// `":8514"` → `"0.0.0.0:8514"`; anything else is passed through.
pub fn normalize_listen(listen: &str) -> String {
    match listen.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => listen.to_string(),
    }
}
