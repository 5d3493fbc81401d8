//! Indexer — turns glob groups and label rules into an addressable catalog.
//!
//! Every refresh builds a fresh [`Snapshot`] off to the side and publishes it
//! with a single pointer swap, so readers always see one complete catalog
//! and never take a lock. Refreshes are throttled by a configurable interval
//! and collapse to one in-flight walk: the state lock is held only for the
//! "should I walk?" decision and for publication, never across the walk.

use crate::clock::{Clock, SystemClock};
use crate::config::{SourceConfig, SourceGroup};
use crate::types::{IndexedFile, Labels, ListEntry, Listing, StableId};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default minimum time between two filesystem walks.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable point-in-time catalog. Replaced, never mutated.
#[derive(Debug, Default)]
pub struct Snapshot {
    generated_at: Option<DateTime<Utc>>,
    files: Vec<IndexedFile>,
    by_id: HashMap<StableId, usize>,
}

impl Snapshot {
    /// When this snapshot was built; `None` for the initial empty catalog.
    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.generated_at
    }

    pub fn get(&self, id: &str) -> Option<&IndexedFile> {
        self.by_id
            .get(&StableId::from(id))
            .map(|&idx| &self.files[idx])
    }

    /// Files in walk order.
    pub fn files(&self) -> &[IndexedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn insert(&mut self, file: IndexedFile) {
        if let Some(&existing) = self.by_id.get(&file.id) {
            debug!(
                id = %file.id,
                path = %file.path.display(),
                kept = %self.files[existing].path.display(),
                "duplicate catalog id, keeping first"
            );
            return;
        }
        self.by_id.insert(file.id.clone(), self.files.len());
        self.files.push(file);
    }
}

/// Walk every group of `config` and build a snapshot.
///
/// Bad patterns and unreadable paths are logged and skipped; a group that
/// matches nothing simply contributes nothing.
pub fn build_snapshot(config: &SourceConfig, generated_at: DateTime<Utc>) -> Snapshot {
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let mut snapshot = Snapshot {
        generated_at: Some(generated_at),
        ..Snapshot::default()
    };

    for (group_idx, group) in config.files.iter().enumerate() {
        for (pattern_idx, pattern) in group.paths.iter().enumerate() {
            let paths = match glob::glob_with(pattern, options) {
                Ok(paths) => paths,
                Err(err) => {
                    warn!(%err, pattern = %pattern, group = group_idx, pattern_idx, "invalid glob pattern, skipping");
                    continue;
                }
            };

            let mut matched = 0usize;
            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(err) => {
                        warn!(%err, pattern = %pattern, group = group_idx, "unreadable path during glob walk");
                        continue;
                    }
                };
                if !path.is_file() {
                    continue;
                }
                matched += 1;
                snapshot.insert(index_file(group, path));
            }
            debug!(pattern = %pattern, group = group_idx, pattern_idx, matched, "expanded glob");
        }
    }
    snapshot
}

/// Derive name, labels and id for one matched path.
pub fn index_file(group: &SourceGroup, path: PathBuf) -> IndexedFile {
    let path_str = path.to_string_lossy().into_owned();

    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.clone());
    if let Some(rule) = group.name_rule() {
        let value = rule.evaluate(&path_str);
        if !value.is_empty() {
            name = value;
        }
    }

    let labels: Labels = group
        .label_keys()
        .map(|key| (key.clone(), group.labels[key].evaluate(&path_str)))
        .collect();
    let id = StableId::compute(&name, &path_str, labels.keys(), &labels);

    IndexedFile {
        id,
        name,
        path,
        labels,
    }
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RefreshState {
    last: Option<DateTime<Utc>>,
    in_flight: bool,
}

/// Clears the in-flight flag on every exit path, including a panicking walk.
struct InFlight<'a>(&'a Mutex<RefreshState>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight = false;
    }
}

pub struct Indexer {
    config: SourceConfig,
    keys: Vec<String>,
    current: ArcSwap<Snapshot>,
    state: Mutex<RefreshState>,
    clock: Arc<dyn Clock>,
    interval: chrono::Duration,
    walks: AtomicU64,
}

impl Indexer {
    pub fn new(config: SourceConfig) -> Self {
        Self::with_clock(config, DEFAULT_REFRESH_INTERVAL, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SourceConfig, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let keys = config.display_keys();
        Self {
            config,
            keys,
            current: ArcSwap::from_pointee(Snapshot::default()),
            state: Mutex::new(RefreshState::default()),
            clock,
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX),
            walks: AtomicU64::new(0),
        }
    }

    /// The published snapshot. Lock-free.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Walk the filesystem and publish a new snapshot, unless the last walk
    /// finished less than the refresh interval ago or another walk is in
    /// flight; either way the current snapshot is returned.
    pub fn refresh(&self) -> Arc<Snapshot> {
        {
            let mut state = self.state.lock();
            if state.in_flight {
                debug!("catalog refresh already in flight");
                return self.current();
            }
            if let Some(last) = state.last {
                if self.clock.now() - last < self.interval {
                    return self.current();
                }
            }
            state.in_flight = true;
        }
        let _in_flight = InFlight(&self.state);

        let snapshot = Arc::new(build_snapshot(&self.config, self.clock.now()));
        self.walks.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        self.current.store(Arc::clone(&snapshot));
        // Throttle from completion, so a slow walk is not repeated at once.
        state.last = Some(self.clock.now());
        info!(files = snapshot.len(), "catalog refreshed");
        snapshot
    }

    /// Number of filesystem walks performed so far.
    pub fn walks(&self) -> u64 {
        self.walks.load(Ordering::Relaxed)
    }

    /// Refresh (throttled) and render the client-facing listing.
    pub fn listing(&self) -> Listing {
        let snapshot = self.refresh();
        Listing {
            keys: self.keys.clone(),
            files: snapshot.files().iter().map(ListEntry::from).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
