//! Route table: `<prefix>/api/v1/<key>/{list,tail,watch}` per active backend
//! plus `<prefix>/api/v1/futures`.

use crate::error::ApiError;
use crate::registry::ActiveBackend;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use logview_core::Listing;
use logview_feeds::{LogBackend, LogQuery, DEFAULT_TAIL_LINES};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const API_BASE: &str = "/api/v1";

#[derive(Clone)]
struct BackendState {
    key: Arc<str>,
    backend: Arc<dyn LogBackend>,
}

/// Query string shared by `tail` and `watch`.
#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    pub h: Option<String>,
    pub tail: Option<String>,
    /// Milliseconds since the epoch.
    pub until: Option<String>,
}

impl LogParams {
    /// `h` is required; an absent or unparsable `tail` means the default.
    pub fn into_query(self) -> Result<LogQuery, ApiError> {
        let id = self.h.ok_or_else(|| ApiError::MissingFields(vec!["h"]))?;
        let lines = self
            .tail
            .and_then(|t| t.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_TAIL_LINES);
        let until = self
            .until
            .and_then(|u| u.trim().parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        Ok(LogQuery { id, lines, until })
    }
}

/// Build the router for `backends`, mounted under `prefix` (already
/// normalised: empty or starting with `/`).
pub fn router(backends: &[ActiveBackend], prefix: &str) -> Router {
    let mut api = Router::new();
    for active in backends {
        let state = BackendState {
            key: Arc::from(active.key.as_str()),
            backend: Arc::clone(&active.backend),
        };
        let routes = Router::new()
            .route("/list", get(list))
            .route("/tail", get(tail))
            .route("/watch", get(watch))
            .with_state(state);
        api = api.nest(&format!("/{}", active.key), routes);
    }

    let keys = Json(backends.iter().map(|b| b.key.clone()).collect::<Vec<_>>());
    api = api.route("/futures", get(move || std::future::ready(keys.clone())));

    let root = Router::new().nest(API_BASE, api);
    if prefix.is_empty() {
        root
    } else {
        Router::new().nest(prefix, root)
    }
}

async fn list(State(state): State<BackendState>) -> Result<Json<Listing>, ApiError> {
    debug!(backend = %state.key, "list");
    Ok(Json(state.backend.list().await?))
}

async fn tail(
    State(state): State<BackendState>,
    Query(params): Query<LogParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    debug!(backend = %state.key, id = %query.id, lines = query.lines, "tail");
    let output = state.backend.tail(&query).await?;
    Ok((
        [(header::CONTENT_TYPE, output.content_type)],
        Body::from_stream(output.body),
    )
        .into_response())
}

/// One `data:` frame per line until the client goes away. Dropping the
/// response body cancels the session.
async fn watch(
    State(state): State<BackendState>,
    Query(params): Query<LogParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    debug!(backend = %state.key, id = %query.id, lines = query.lines, "watch");

    let cancel = CancellationToken::new();
    let lines = state.backend.watch(&query, cancel.clone()).await?;
    let guard = cancel.drop_guard();
    let events = lines.map(move |line| {
        let _session = &guard;
        Ok::<_, Infallible>(Event::default().data(line))
    });
    Ok(Sse::new(events).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
