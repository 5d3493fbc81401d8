//! Fake Docker Engine API server for integration tests.
//!
//! Spins up a minimal `axum` HTTP server on a random TCP port bound to
//! 127.0.0.1. Serves:
//! - `GET /containers/json` — configured containers, honouring `all`
//! - `GET /containers/{id}/logs` — buffered lines as multiplexed frames,
//!   then live lines when `follow=1`
//!
//! In production the engine is reached over a unix socket; the backend
//! accepts a `tcp://` endpoint so it can be pointed at this server.
//!
//! # Example
//!
//! ```rust,no_run
//! let api = FakeDockerApi::start().await.unwrap();
//! api.add_container("abc123", "myapp_api_1", "running").await;
//! api.push_log("abc123", 1, "hello").await;
//! let endpoint = api.endpoint();
//! ```

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use logview_feeds::docker::DockerEndpoint;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};

#[derive(Default)]
struct Container {
    summary: serde_json::Value,
    running: bool,
    /// `(stream, line)` pairs returned by every logs request.
    lines: Vec<(u8, String)>,
    tty: bool,
    live: Option<broadcast::Sender<(u8, String)>>,
}

/// State shared between the router and test code.
#[derive(Default)]
struct ApiState {
    containers: Vec<(String, Container)>,
    /// Path and query of every logs request, in arrival order.
    log_requests: Vec<String>,
}

impl ApiState {
    fn container(&mut self, id: &str) -> Option<&mut Container> {
        self.containers
            .iter_mut()
            .find(|(cid, c)| cid == id || c.summary["Names"][0] == format!("/{id}"))
            .map(|(_, c)| c)
    }
}

/// Handle to the running fake Docker API server.
pub struct FakeDockerApi {
    addr: SocketAddr,
    state: Arc<Mutex<ApiState>>,
}

impl FakeDockerApi {
    /// Start on a random port. Returns once the server is listening.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ApiState::default()));

        let app = Router::new()
            .route("/containers/json", get(list_containers))
            .route("/containers/{id}/logs", get(container_logs))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, state })
    }

    pub fn endpoint(&self) -> DockerEndpoint {
        DockerEndpoint::parse(&format!("tcp://{}", self.addr))
    }

    /// Register a container; `state` other than `"running"` hides it unless
    /// `all=true` is requested.
    pub async fn add_container(&self, id: &str, name: &str, state: &str) {
        let (live, _) = broadcast::channel(64);
        self.state.lock().await.containers.push((
            id.to_string(),
            Container {
                summary: serde_json::json!({
                    "Id": id,
                    "Names": [format!("/{name}")],
                    "Image": format!("{name}:latest"),
                    "State": state,
                    "Labels": {}
                }),
                running: state == "running",
                live: Some(live),
                ..Container::default()
            },
        ));
    }

    /// Serve this container's logs as a raw (TTY) stream.
    pub async fn set_tty(&self, id: &str) {
        if let Some(c) = self.state.lock().await.container(id) {
            c.tty = true;
        }
    }

    /// Buffer a line on `stream` (1 = stdout, 2 = stderr).
    pub async fn push_log(&self, id: &str, stream: u8, line: &str) {
        if let Some(c) = self.state.lock().await.container(id) {
            c.lines.push((stream, line.to_string()));
        }
    }

    /// Send a line to every follower currently attached to `id`.
    pub async fn push_live(&self, id: &str, stream: u8, line: &str) {
        if let Some(c) = self.state.lock().await.container(id) {
            if let Some(live) = &c.live {
                let _ = live.send((stream, line.to_string()));
            }
        }
    }

    /// Followers currently attached to `id`.
    pub async fn followers(&self, id: &str) -> usize {
        self.state
            .lock()
            .await
            .container(id)
            .and_then(|c| c.live.as_ref().map(|l| l.receiver_count()))
            .unwrap_or(0)
    }

    pub async fn log_requests(&self) -> Vec<String> {
        self.state.lock().await.log_requests.clone()
    }
}

/// Encode one multiplexed frame.
pub fn frame(stream: u8, payload: &[u8]) -> Bytes {
    let mut out = vec![stream, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Bytes::from(out)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

async fn list_containers(
    State(state): State<Arc<Mutex<ApiState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let all = params.get("all").is_some_and(|v| v == "true" || v == "1");
    let state = state.lock().await;
    let containers: Vec<serde_json::Value> = state
        .containers
        .iter()
        .filter(|(_, c)| all || c.running)
        .map(|(_, c)| c.summary.clone())
        .collect();
    axum::Json(containers)
}

async fn container_logs(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<Mutex<ApiState>>>,
    uri: axum::http::Uri,
) -> Response {
    let mut state = state.lock().await;
    state.log_requests.push(uri.to_string());
    let Some(container) = state.container(&id) else {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({ "message": format!("No such container: {id}") })),
        )
            .into_response();
    };

    let tty = container.tty;
    let encode = move |stream: u8, line: &str| {
        let payload = format!("{line}\n");
        if tty {
            Bytes::from(payload)
        } else {
            frame(stream, payload.as_bytes())
        }
    };

    let tail = params
        .get("tail")
        .and_then(|t| t.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let skip = container.lines.len().saturating_sub(tail);
    let buffered: Vec<Result<Bytes, Infallible>> = container.lines[skip..]
        .iter()
        .map(|(stream, line)| Ok(encode(*stream, line)))
        .collect();

    let follow = params.get("follow").is_some_and(|v| v == "1" || v == "true");
    let live = match (&container.live, follow) {
        (Some(live), true) => Some(live.subscribe()),
        _ => None,
    };
    drop(state);

    let content_type = if tty {
        "application/vnd.docker.raw-stream"
    } else {
        "application/vnd.docker.multiplexed-stream"
    };
    let head = futures::stream::iter(buffered);
    let body = match live {
        Some(rx) => {
            let tail = futures::stream::unfold(rx, move |mut rx| async move {
                loop {
                    match rx.recv().await {
                        Ok((stream, line)) => return Some((Ok(encode(stream, &line)), rx)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });
            Body::from_stream(futures::StreamExt::chain(head, tail))
        }
        None => Body::from_stream(head),
    };

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}
