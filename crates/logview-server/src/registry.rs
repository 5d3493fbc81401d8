//! Backend registry — `{key → constructor}` built once at startup.
//!
//! Registration order is preserved; it is the order routes are mounted and
//! the order `/api/v1/futures` reports. A constructor may decline to produce
//! a backend (`Ok(None)`), in which case its key is simply absent.

use crate::settings::ServerSettings;
use logview_core::Indexer;
use logview_feeds::dirfiles::DirFiles;
use logview_feeds::docker::Docker;
use logview_feeds::journald::Journald;
use logview_feeds::watcher::WatchOptions;
use logview_feeds::LogBackend;
use std::sync::Arc;
use tracing::{debug, error, info};

pub type Constructor = Box<dyn FnOnce() -> anyhow::Result<Option<Arc<dyn LogBackend>>> + Send>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("backend {0:?} is already registered")]
    Duplicate(String),
}

/// A constructed backend and the key it is served under.
#[derive(Clone)]
pub struct ActiveBackend {
    pub key: String,
    pub backend: Arc<dyn LogBackend>,
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<(String, Constructor)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, key: impl Into<String>, constructor: F) -> Result<(), RegistryError>
    where
        F: FnOnce() -> anyhow::Result<Option<Arc<dyn LogBackend>>> + Send + 'static,
    {
        let key = key.into();
        if self.entries.iter().any(|(k, _)| *k == key) {
            return Err(RegistryError::Duplicate(key));
        }
        self.entries.push((key, Box::new(constructor)));
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Run every constructor once. Keys whose constructor declines or
    /// fails are left out.
    pub fn instances(self) -> Vec<ActiveBackend> {
        let mut active = Vec::with_capacity(self.entries.len());
        for (key, constructor) in self.entries {
            match constructor() {
                Ok(Some(backend)) => {
                    info!(backend = %key, "backend enabled");
                    active.push(ActiveBackend { key, backend });
                }
                Ok(None) => debug!(backend = %key, "backend disabled"),
                Err(err) => error!(backend = %key, error = %format!("{err:#}"), "backend failed to start"),
            }
        }
        active
    }
}

/// The three built-in backends: `dirfiles`, `docker`, `systemd`.
pub fn builtin(settings: &ServerSettings) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();

    let sources = settings.sources.clone();
    let watch = WatchOptions {
        poll_interval: settings.poll_interval,
        buffer_size: settings.buffer_size,
    };
    let refresh_interval = settings.refresh_interval;
    registry.register("dirfiles", move || {
        let Some(sources) = sources else {
            return Ok(None);
        };
        let indexer = Arc::new(Indexer::with_clock(
            sources,
            refresh_interval,
            Arc::new(logview_core::clock::SystemClock),
        ));
        initial_refresh(Arc::clone(&indexer));
        Ok(Some(Arc::new(DirFiles::new(indexer, watch)) as Arc<dyn LogBackend>))
    })?;

    let docker = settings.docker.clone();
    registry.register("docker", move || {
        Ok(docker.map(|options| Arc::new(Docker::new(options)) as Arc<dyn LogBackend>))
    })?;

    let journald = settings.journald.clone();
    registry.register("systemd", move || {
        Ok(journald.map(|options| Arc::new(Journald::new(options)) as Arc<dyn LogBackend>))
    })?;

    Ok(registry)
}

/// Walk the sources once in the background so the first listing is warm.
fn initial_refresh(indexer: Arc<Indexer>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || {
                let snapshot = indexer.refresh();
                info!(files = snapshot.len(), "initial catalog ready");
            });
        }
        Err(_) => {
            indexer.refresh();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
