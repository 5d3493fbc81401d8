//! Docker backend — container logs through the Docker Engine API.
//!
//! Every request opens its own HTTP/1.1 connection to the engine (unix
//! socket in production, TCP in tests), so a restarted daemon never leaves
//! a stale client behind. Log bodies use the engine's multiplexed stream
//! format unless the container runs with a TTY:
//!
//! ```text
//! [stream_type, 0, 0, 0, size_be_u32][payload; size]
//! ```

use crate::lines::LineDecoder;
use crate::{BackendError, ByteStream, LineStream, LogBackend, LogQuery, TailOutput};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::{stream, StreamExt};
use http_body_util::{BodyExt, BodyStream, Empty};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use logview_core::{Labels, ListEntry, Listing};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

const RAW_STREAM: &str = "application/vnd.docker.raw-stream";
const HEADER_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Endpoint and client
// ---------------------------------------------------------------------------

/// Where the Docker Engine API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl DockerEndpoint {
    /// Parse `unix:///path`, `tcp://host:port`, `http://host:port`, or a
    /// bare socket path.
    pub fn parse(value: &str) -> Self {
        if let Some(addr) = value
            .strip_prefix("tcp://")
            .or_else(|| value.strip_prefix("http://"))
        {
            return Self::Tcp(addr.trim_end_matches('/').to_string());
        }
        Self::Unix(PathBuf::from(value.strip_prefix("unix://").unwrap_or(value)))
    }
}

impl Default for DockerEndpoint {
    fn default() -> Self {
        Self::Unix(PathBuf::from(DEFAULT_SOCKET))
    }
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: DockerEndpoint,
}

impl DockerClient {
    pub fn new(endpoint: DockerEndpoint) -> Self {
        Self { endpoint }
    }

    /// `GET path_and_query`, mapping engine 404s to [`BackendError::NotFound`].
    pub async fn get(&self, path_and_query: &str) -> Result<Response<Incoming>, BackendError> {
        let request = Request::builder()
            .uri(path_and_query)
            .header(hyper::header::HOST, "docker")
            .body(Empty::<Bytes>::new())
            .map_err(|err| BackendError::BadRequest(err.to_string()))?;

        let response = match &self.endpoint {
            DockerEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await.map_err(unreachable)?;
                send(stream, request).await?
            }
            DockerEndpoint::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr).await.map_err(unreachable)?;
                send(stream, request).await?
            }
        };

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound),
            status => {
                let body = response
                    .into_body()
                    .collect()
                    .await
                    .map(|b| String::from_utf8_lossy(&b.to_bytes()).into_owned())
                    .unwrap_or_default();
                Err(BackendError::Upstream(format!("docker returned {status}: {}", body.trim())))
            }
        }
    }
}

async fn send<S>(stream: S, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>, BackendError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(upstream)?;
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            debug!(%err, "docker connection closed");
        }
    });
    sender.send_request(request).await.map_err(upstream)
}

fn unreachable(err: std::io::Error) -> BackendError {
    BackendError::Upstream(format!("docker engine unreachable: {err}"))
}

fn upstream(err: hyper::Error) -> BackendError {
    BackendError::Upstream(err.to_string())
}

// ---------------------------------------------------------------------------
// Multiplexed stream decoding
// ---------------------------------------------------------------------------

/// Reassembles multiplexed frames from arbitrarily split chunks and yields
/// their payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while self.buf.len() >= HEADER_LEN {
            let size = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
            if self.buf.len() < HEADER_LEN + size {
                break;
            }
            self.buf.advance(HEADER_LEN);
            payloads.push(self.buf.split_to(size).freeze());
        }
        payloads
    }
}

fn body_bytes(body: Incoming) -> ByteStream {
    BodyStream::new(body)
        .filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(err) => Some(Err(std::io::Error::other(err))),
            }
        })
        .boxed()
}

/// Log payload bytes from a logs response, demultiplexed unless the
/// engine says the stream is raw.
fn log_bytes(response: Response<Incoming>) -> ByteStream {
    let raw = response
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(RAW_STREAM));
    let body = body_bytes(response.into_body());
    if raw {
        return body;
    }

    body.scan(FrameDecoder::default(), |decoder, chunk| {
        futures::future::ready(Some(chunk.map(|c| decoder.push(&c))))
    })
    .flat_map(|payloads| match payloads {
        Ok(payloads) => stream::iter(payloads.into_iter().map(Ok)).left_stream(),
        Err(err) => stream::once(futures::future::ready(Err(err))).right_stream(),
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
}

impl From<ContainerSummary> for ListEntry {
    fn from(c: ContainerSummary) -> Self {
        let name = c
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| c.id.chars().take(12).collect());
        let labels: Labels = [("image".to_string(), c.image), ("state".to_string(), c.state)]
            .into_iter()
            .collect();
        ListEntry {
            id: c.id,
            name,
            labels,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DockerOptions {
    pub endpoint: DockerEndpoint,
    /// List stopped containers too.
    pub all_containers: bool,
}

pub struct Docker {
    client: DockerClient,
    all_containers: bool,
}

/// Container ids and names: alphanumerics plus `_.-`, not starting with a
/// separator.
fn valid_container_ref(id: &str) -> bool {
    id.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl Docker {
    pub fn new(options: DockerOptions) -> Self {
        Self {
            client: DockerClient::new(options.endpoint),
            all_containers: options.all_containers,
        }
    }

    fn logs_path(query: &LogQuery, follow: bool) -> Result<String, BackendError> {
        if !valid_container_ref(&query.id) {
            return Err(BackendError::NotFound);
        }
        let tail = query
            .line_limit()
            .map_or_else(|| "all".to_string(), |n| n.to_string());
        let mut path = format!("/containers/{}/logs?stdout=1&stderr=1&tail={tail}", query.id);
        if follow {
            path.push_str("&follow=1");
        }
        Ok(path)
    }
}

#[async_trait]
impl LogBackend for Docker {
    async fn list(&self) -> Result<Listing, BackendError> {
        let response = self
            .client
            .get(&format!("/containers/json?all={}", self.all_containers))
            .await?;
        let body = response.into_body().collect().await.map_err(upstream)?.to_bytes();
        let containers: Vec<ContainerSummary> = serde_json::from_slice(&body)
            .map_err(|err| BackendError::Upstream(format!("bad container list: {err}")))?;
        Ok(Listing {
            keys: vec!["image".to_string(), "state".to_string()],
            files: containers.into_iter().map(ListEntry::from).collect(),
        })
    }

    async fn tail(&self, query: &LogQuery) -> Result<TailOutput, BackendError> {
        let response = self.client.get(&Self::logs_path(query, false)?).await?;
        Ok(TailOutput {
            content_type: "text/plain; charset=utf-8".to_string(),
            body: log_bytes(response),
        })
    }

    async fn watch(
        &self,
        query: &LogQuery,
        cancel: CancellationToken,
    ) -> Result<LineStream, BackendError> {
        let response = self.client.get(&Self::logs_path(query, true)?).await?;
        let mut bytes = log_bytes(response);
        let (tx, rx) = mpsc::channel(1);
        let id = query.id.clone();

        tokio::spawn(async move {
            let mut decoder = LineDecoder::default();
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    chunk = bytes.next() => chunk,
                };
                let chunk = match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(err)) => {
                        warn!(%err, id = %id, "docker log stream failed");
                        break;
                    }
                    None => break,
                };
                for line in decoder.push(&chunk) {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        sent = tx.send(line) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            debug!(id = %id, "docker watch closed");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
