//! Test builders — source configs, backends and routers.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use logview_core::config::{SourceConfig, SourceGroup};
use logview_core::label::{LabelRule, NAME_KEY};
use logview_core::Indexer;
use logview_feeds::dirfiles::DirFiles;
use logview_feeds::watcher::WatchOptions;
use logview_feeds::LogBackend;
use logview_server::{router, ActiveBackend};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// SourceConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`SourceConfig`].
///
/// ```rust
/// let config = SourceConfigBuilder::new()
///     .group(&["/var/log/*.log"])
///     .label("service", r"([a-z]+)\.log$")
///     .build();
/// ```
#[derive(Default)]
pub struct SourceConfigBuilder {
    keys: Vec<String>,
    groups: Vec<SourceGroup>,
}

impl SourceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Start a new group; following `label` calls apply to it.
    pub fn group(mut self, paths: &[&str]) -> Self {
        self.groups.push(SourceGroup {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            labels: BTreeMap::new(),
        });
        self
    }

    pub fn label(mut self, key: &str, pattern: &str) -> Self {
        let rule = LabelRule::new(pattern, None).expect("valid label pattern");
        self.current().labels.insert(key.to_string(), rule);
        self
    }

    pub fn label_template(mut self, key: &str, pattern: &str, replace: &str) -> Self {
        let rule = LabelRule::new(pattern, Some(replace.to_string())).expect("valid label pattern");
        self.current().labels.insert(key.to_string(), rule);
        self
    }

    pub fn name_rule(self, pattern: &str, replace: &str) -> Self {
        self.label_template(NAME_KEY, pattern, replace)
    }

    pub fn build(self) -> SourceConfig {
        SourceConfig {
            keys: self.keys,
            files: self.groups,
        }
    }

    fn current(&mut self) -> &mut SourceGroup {
        self.groups.last_mut().expect("call group() before label()")
    }
}

// ---------------------------------------------------------------------------
// Backends and routers
// ---------------------------------------------------------------------------

/// Watch options with a short poll so tests finish quickly.
pub fn fast_watch() -> WatchOptions {
    WatchOptions {
        poll_interval: Duration::from_millis(20),
        ..WatchOptions::default()
    }
}

/// A file backend over `config`, with its catalog already walked.
pub fn dirfiles(config: SourceConfig) -> Arc<DirFiles> {
    let indexer = Arc::new(Indexer::new(config));
    indexer.refresh();
    Arc::new(DirFiles::new(indexer, fast_watch()))
}

/// Router serving `backend` under `key`, no prefix.
pub fn app_with(key: &str, backend: Arc<dyn LogBackend>) -> Router {
    router(
        &[ActiveBackend {
            key: key.to_string(),
            backend,
        }],
        "",
    )
}

/// Issue a GET and collect the whole body.
pub async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
