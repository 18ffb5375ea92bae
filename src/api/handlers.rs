//! Shared API state, health check and error mapping

use crate::error::TrackerError;
use crate::store::models::Task;
use crate::store::TrackerStore;
use crate::tracker::TrackerManager;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub store: Arc<dyn TrackerStore>,
    pub tracker: Arc<TrackerManager>,
}

/// Shared tracker state
pub type TrackerState = Arc<ServerState>;

impl ServerState {
    pub fn new(tracker: Arc<TrackerManager>) -> Self {
        Self {
            store: tracker.store().clone(),
            tracker,
        }
    }
}

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServicesHealth,
}

#[derive(Serialize)]
pub struct ServicesHealth {
    pub database: String,
}

/// Health check handler. 200 when the database answers, 503 otherwise.
pub async fn health(State(state): State<TrackerState>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = state.store.health_check().await.unwrap_or(false);

    let (http_status, status, database) = if db_ok {
        (StatusCode::OK, "ok", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServicesHealth {
                database: database.to_string(),
            },
        }),
    )
}

// ============================================================================
// Version tags
// ============================================================================

/// `ETag` value for a task: its lock version, quoted
pub fn etag_for(task: &Task) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{}\"", task.lock_version))
        .unwrap_or_else(|_| HeaderValue::from_static("\"0\""))
}

/// Headers carried by every single-task response
pub fn task_headers(task: &Task) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ETAG, etag_for(task));
    headers
}

/// Read a lock version from `If-Match`. Accepts `"3"`, `W/"3"` and `3`;
/// `*` or an absent header means no precondition.
pub fn lock_version_from_if_match(headers: &HeaderMap) -> Result<Option<i64>, AppError> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| AppError::BadRequest("invalid If-Match header".into()))?
        .trim();
    if raw == "*" {
        return Ok(None);
    }
    let tag = raw.strip_prefix("W/").unwrap_or(raw).trim_matches('"');
    tag.parse()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("invalid If-Match header '{raw}'")))
}

// ============================================================================
// Error handling
// ============================================================================

/// API error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    Conflict(String),
    /// Version conflict that echoes the stored entity
    StaleTask { message: String, current: Box<Task> },
}

impl AppError {
    /// Keep the current row on version conflicts instead of dropping it
    pub fn with_current(err: TrackerError) -> Self {
        let message = err.to_string();
        match err {
            TrackerError::VersionConflict { current } => AppError::StaleTask { message, current },
            other => other.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            AppError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "error": msg }),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({ "error": msg })),
            AppError::StaleTask { message, current } => (
                StatusCode::CONFLICT,
                serde_json::json!({ "error": message, "current": current }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::NotFound(msg) => AppError::NotFound(msg),
            TrackerError::Unprocessable(msg) => AppError::Unprocessable(msg),
            TrackerError::BadRequest(msg) => AppError::BadRequest(msg),
            TrackerError::Conflict(msg) => AppError::Conflict(msg),
            err @ TrackerError::VersionConflict { .. } => AppError::Conflict(err.to_string()),
            err => {
                tracing::error!(error = %err, "Request failed");
                AppError::Internal(anyhow::Error::new(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_match_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(lock_version_from_if_match(&headers).unwrap(), None);

        headers.insert(header::IF_MATCH, HeaderValue::from_static("\"4\""));
        assert_eq!(lock_version_from_if_match(&headers).unwrap(), Some(4));

        headers.insert(header::IF_MATCH, HeaderValue::from_static("W/\"7\""));
        assert_eq!(lock_version_from_if_match(&headers).unwrap(), Some(7));

        headers.insert(header::IF_MATCH, HeaderValue::from_static("*"));
        assert_eq!(lock_version_from_if_match(&headers).unwrap(), None);

        headers.insert(header::IF_MATCH, HeaderValue::from_static("\"abc\""));
        assert!(matches!(
            lock_version_from_if_match(&headers),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_tracker_error_mapping() {
        let err: AppError = TrackerError::not_found("Task").into();
        assert!(matches!(err, AppError::NotFound(msg) if msg == "Task not found"));

        let err: AppError = TrackerError::Unprocessable("id or external_id required".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err: AppError = TrackerError::Corrupt("bad".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
