//! Journal backend — systemd units read through `journalctl`.
//!
//! Units are discovered with `systemctl list-units -o json` and cached for
//! the refresh interval. Tail and watch spawn `journalctl -o json`, one
//! child per request, parse one entry per line and hand them on as
//! [`JournalMessage`]s. The child is killed as soon as the request's
//! reader goes away.

use crate::{BackendError, ByteStream, LineStream, LogBackend, LogQuery, TailOutput};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream, Stream, StreamExt};
use logview_core::{Labels, ListEntry, Listing};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_UNIT_STATE: &str = "running,exited,failed,dead";

/// Pseudo-unit for kernel messages.
pub const KERNEL_UNIT: &str = "dmesg";

const UNIT_KEYS: [&str; 3] = ["active", "sub", "description"];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// An external program plus arguments placed before the generated ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub path: PathBuf,
    pub leading_args: Vec<String>,
}

impl Program {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            leading_args: Vec::new(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[derive(Debug, Clone)]
pub struct JournaldOptions {
    /// Comma-separated `--state` filter for unit discovery; empty lists all.
    pub unit_state: String,
    /// Minimum time between two unit discoveries.
    pub refresh_interval: Duration,
    pub systemctl: Program,
    pub journalctl: Program,
}

impl Default for JournaldOptions {
    fn default() -> Self {
        Self {
            unit_state: DEFAULT_UNIT_STATE.to_string(),
            refresh_interval: logview_core::indexer::DEFAULT_REFRESH_INTERVAL,
            systemctl: Program::new("systemctl"),
            journalctl: Program::new("journalctl"),
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// One row of `systemctl list-units -o json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Unit {
    pub unit: String,
    #[serde(default)]
    pub load: String,
    #[serde(default)]
    pub active: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub description: String,
}

impl From<&Unit> for ListEntry {
    fn from(u: &Unit) -> Self {
        let labels: Labels = [
            ("active", u.active.as_str()),
            ("sub", u.sub.as_str()),
            ("description", u.description.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        ListEntry {
            id: u.unit.clone(),
            name: u.unit.clone(),
            labels,
        }
    }
}

fn kernel_entry() -> ListEntry {
    let mut labels = Labels::new();
    labels.insert("description".to_string(), "Kernel messages".to_string());
    ListEntry {
        id: KERNEL_UNIT.to_string(),
        name: KERNEL_UNIT.to_string(),
        labels,
    }
}

/// Arguments for unit discovery.
pub fn list_units_args(unit_state: &str) -> Vec<String> {
    let mut args: Vec<String> = ["list-units", "-o", "json", "--all", "--no-pager"]
        .into_iter()
        .map(String::from)
        .collect();
    if !unit_state.trim().is_empty() {
        args.push(format!("--state={}", unit_state.trim()));
    }
    args
}

/// Decode `systemctl` output, sorted by unit name.
pub fn parse_units(json: &[u8]) -> Result<Vec<Unit>, serde_json::Error> {
    let mut units: Vec<Unit> = serde_json::from_slice(json)?;
    units.sort_by(|a, b| a.unit.cmp(&b.unit));
    Ok(units)
}

#[derive(Default)]
struct UnitCache {
    units: Arc<Vec<Unit>>,
    fetched_at: Option<Instant>,
}

// ---------------------------------------------------------------------------
// Journal entries
// ---------------------------------------------------------------------------

/// A journal entry as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalMessage {
    /// Wall-clock time in milliseconds since the epoch.
    pub ts: f64,
    /// Monotonic time in seconds since boot.
    pub monotonic: f64,
    pub hostname: String,
    pub process: String,
    pub pid: String,
    pub message: String,
    pub priority: String,
    #[serde(skip)]
    realtime_micros: u64,
}

impl JournalMessage {
    /// Parse one line of `journalctl -o json` output.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        let entry: serde_json::Map<String, Value> = serde_json::from_str(line)?;
        let micros = |key: &str| field(&entry, key).parse::<u64>().unwrap_or(0);
        let realtime_micros = micros("__REALTIME_TIMESTAMP");

        Ok(Self {
            ts: realtime_micros as f64 / 1_000.0,
            monotonic: micros("__MONOTONIC_TIMESTAMP") as f64 / 1_000_000.0,
            hostname: field(&entry, "_HOSTNAME"),
            process: field(&entry, "_COMM"),
            pid: field(&entry, "_PID"),
            message: field(&entry, "MESSAGE"),
            priority: field(&entry, "PRIORITY"),
            realtime_micros,
        })
    }

    pub fn realtime_micros(&self) -> u64 {
        self.realtime_micros
    }
}

/// journalctl writes non-UTF-8 field values as byte arrays.
fn field(entry: &serde_json::Map<String, Value>, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// What a request id selects in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalTarget {
    Kernel,
    Unit(String),
}

/// Arguments for reading `target`.
pub fn journal_args(target: &JournalTarget, query: &LogQuery, follow: bool) -> Vec<String> {
    let mut args: Vec<String> = ["-o", "json", "--no-pager"]
        .into_iter()
        .map(String::from)
        .collect();
    match target {
        JournalTarget::Kernel => args.push("--dmesg".to_string()),
        JournalTarget::Unit(unit) => args.push(format!("--unit={unit}")),
    }
    match query.line_limit() {
        Some(n) => args.push(format!("--lines={n}")),
        None => args.push("--lines=all".to_string()),
    }
    if follow {
        args.push("--follow".to_string());
    } else if let Some(until) = query.until {
        // Whole seconds, rounded up; the exact bound is applied per entry.
        let secs = until.timestamp() + i64::from(until.timestamp_subsec_micros() > 0);
        args.push(format!("--until=@{secs}"));
    }
    args
}

pub struct Journald {
    options: JournaldOptions,
    cache: Mutex<UnitCache>,
}

impl Journald {
    pub fn new(options: JournaldOptions) -> Self {
        Self {
            options,
            cache: Mutex::new(UnitCache::default()),
        }
    }

    /// Known units, rediscovered at most once per refresh interval.
    pub async fn units(&self) -> Result<Arc<Vec<Unit>>, BackendError> {
        let mut cache = self.cache.lock().await;
        if let Some(at) = cache.fetched_at {
            if at.elapsed() < self.options.refresh_interval {
                return Ok(Arc::clone(&cache.units));
            }
        }

        let output = self
            .options
            .systemctl
            .command(&list_units_args(&self.options.unit_state))
            .output()
            .await
            .map_err(|err| BackendError::Upstream(format!("failed to run systemctl: {err}")))?;
        if !output.status.success() {
            return Err(BackendError::Upstream(format!(
                "systemctl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let units = parse_units(&output.stdout)
            .map_err(|err| BackendError::Upstream(format!("bad unit list: {err}")))?;
        info!(units = units.len(), "discovered systemd units");

        cache.units = Arc::new(units);
        cache.fetched_at = Some(Instant::now());
        Ok(Arc::clone(&cache.units))
    }

    async fn resolve(&self, id: &str) -> Result<JournalTarget, BackendError> {
        if id == KERNEL_UNIT || id == "kernel" {
            return Ok(JournalTarget::Kernel);
        }
        let units = self.units().await?;
        if units.iter().any(|u| u.unit == id) {
            Ok(JournalTarget::Unit(id.to_string()))
        } else {
            debug!(id, "unknown unit");
            Err(BackendError::NotFound)
        }
    }

    /// Spawn `journalctl` and stream its entries until it exits, an entry
    /// past `until_micros` arrives, `cancel` fires, or the reader goes away.
    /// A read failure or a non-zero exit is sent as the final item.
    fn read_journal(
        &self,
        args: Vec<String>,
        until_micros: Option<u64>,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<io::Result<JournalMessage>>, BackendError> {
        let mut child = self
            .options
            .journalctl
            .command(&args)
            .spawn()
            .map_err(|err| BackendError::Upstream(format!("failed to start journalctl: {err}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Upstream("journalctl stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(1);

        // Drained alongside stdout so a chatty child cannot fill the pipe.
        let stderr = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).trim().to_string()
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let failure = loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    _ = tx.closed() => break None,
                    line = lines.next_line() => line,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break exit_failure(&mut child, stderr).await,
                    Err(err) => {
                        warn!(%err, "journal read failed");
                        break Some(err);
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let message = match JournalMessage::from_json(&line) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!(%err, "skipping malformed journal entry");
                        continue;
                    }
                };
                if until_micros.is_some_and(|until| message.realtime_micros > until) {
                    break None;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    sent = tx.send(Ok(message)) => {
                        if sent.is_err() {
                            break None;
                        }
                    }
                }
            };
            if let Some(err) = failure {
                let _ = tx.send(Err(err)).await;
            }
            debug!("journal reader closed");
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// Wait for a child whose stdout is exhausted; a non-zero exit becomes an
/// error carrying its stderr.
async fn exit_failure(child: &mut Child, stderr: JoinHandle<String>) -> Option<io::Error> {
    let status = match child.wait().await {
        Ok(status) => status,
        Err(err) => return Some(err),
    };
    if status.success() {
        return None;
    }
    let stderr = stderr.await.unwrap_or_default();
    warn!(%status, %stderr, "journalctl failed");
    Some(io::Error::other(format!("journalctl exited with {status}: {stderr}")))
}

fn until_micros(query: &LogQuery) -> Option<u64> {
    query
        .until
        .and_then(|t| u64::try_from(t.timestamp_micros()).ok())
}

/// Frame `messages` as one JSON array. An error item aborts the body.
fn json_array<S>(messages: S) -> ByteStream
where
    S: Stream<Item = io::Result<JournalMessage>> + Send + 'static,
{
    let entries = messages.enumerate().map(|(i, message)| -> io::Result<Bytes> {
        let message = message?;
        let mut buf = if i == 0 { Vec::new() } else { b",".to_vec() };
        serde_json::to_writer(&mut buf, &message)?;
        Ok(Bytes::from(buf))
    });
    stream::once(async { Ok(Bytes::from_static(b"[")) })
        .chain(entries)
        .chain(stream::once(async { Ok(Bytes::from_static(b"]")) }))
        .boxed()
}

#[async_trait]
impl LogBackend for Journald {
    async fn list(&self) -> Result<Listing, BackendError> {
        let units = self.units().await?;
        let mut files: Vec<ListEntry> = units.iter().map(ListEntry::from).collect();
        files.push(kernel_entry());
        Ok(Listing {
            keys: UNIT_KEYS.iter().map(|k| k.to_string()).collect(),
            files,
        })
    }

    async fn tail(&self, query: &LogQuery) -> Result<TailOutput, BackendError> {
        let target = self.resolve(&query.id).await?;
        let mut messages = self.read_journal(
            journal_args(&target, query, false),
            until_micros(query),
            CancellationToken::new(),
        )?;
        // A journalctl that fails before its first entry is reported before
        // the response starts.
        let first = match messages.next().await {
            Some(Err(err)) => return Err(BackendError::Upstream(err.to_string())),
            first => first,
        };
        Ok(TailOutput {
            content_type: "application/json".to_string(),
            body: json_array(stream::iter(first).chain(messages)),
        })
    }

    async fn watch(
        &self,
        query: &LogQuery,
        cancel: CancellationToken,
    ) -> Result<LineStream, BackendError> {
        let target = self.resolve(&query.id).await?;
        let messages =
            self.read_journal(journal_args(&target, query, true), until_micros(query), cancel)?;
        Ok(messages
            .take_while(|message| {
                if let Err(err) = message {
                    warn!(%err, "journal watch ended");
                }
                future::ready(message.is_ok())
            })
            .filter_map(|message| async move {
                message.ok().and_then(|m| serde_json::to_string(&m).ok())
            })
            .boxed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
