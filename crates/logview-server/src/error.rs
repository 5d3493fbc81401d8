//! HTTP error mapping.
//!
//! Bodies are plain text, `"<code> <reason>\n"`, except for missing query
//! fields, which name the fields.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use logview_feeds::BackendError;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing query fields: [{}]", quoted(.0))]
    MissingFields(Vec<&'static str>),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn quoted(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| format!("{f:?}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields(_) => StatusCode::BAD_REQUEST,
            Self::Backend(BackendError::NotFound) => StatusCode::NOT_FOUND,
            Self::Backend(BackendError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            Self::Backend(BackendError::Io(_) | BackendError::Upstream(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// `"404 Not Found\n"`.
pub fn status_line(status: StatusCode) -> String {
    format!("{} {}\n", status.as_u16(), status.canonical_reason().unwrap_or(""))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::MissingFields(_) => format!("{self}\n"),
            _ => status_line(status),
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        (
            status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            body,
        )
            .into_response()
    }
}
