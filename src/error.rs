//! Domain error type shared by the store, the tracker services and the API layer.

use crate::store::models::Task;
use thiserror::Error;

/// Errors raised while resolving, reading or mutating tracker entities.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A referenced project, milestone, phase, parent task or task does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request does not carry enough information to resolve identity,
    /// or carries a value the entity cannot hold.
    #[error("{0}")]
    Unprocessable(String),

    /// The request is well-formed but violates a relationship rule.
    #[error("{0}")]
    BadRequest(String),

    /// Uniqueness race that could not be resolved, or a cross-entity reassignment.
    #[error("{0}")]
    Conflict(String),

    /// The caller's lock token is stale. Carries the row as currently stored.
    #[error("Task has been modified by another update")]
    VersionConflict { current: Box<Task> },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl TrackerError {
    /// `"<Entity> not found"`
    pub fn not_found(entity: &str) -> Self {
        TrackerError::NotFound(format!("{entity} not found"))
    }

    /// Short classification used in per-item batch results.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::NotFound(_) => "not_found",
            TrackerError::Unprocessable(_) => "unprocessable",
            TrackerError::BadRequest(_) => "bad_request",
            TrackerError::Conflict(_) => "conflict",
            TrackerError::VersionConflict { .. } => "version_conflict",
            TrackerError::Database(_) | TrackerError::Corrupt(_) => "internal",
        }
    }

    /// HTTP status code equivalent, as a plain integer.
    pub fn status_code(&self) -> u16 {
        match self {
            TrackerError::NotFound(_) => 404,
            TrackerError::Unprocessable(_) => 422,
            TrackerError::BadRequest(_) => 400,
            TrackerError::Conflict(_) | TrackerError::VersionConflict { .. } => 409,
            TrackerError::Database(_) | TrackerError::Corrupt(_) => 500,
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = TrackerError::not_found("Milestone");
        assert_eq!(err.to_string(), "Milestone not found");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TrackerError::Unprocessable("x".into()).status_code(), 422);
        assert_eq!(TrackerError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(TrackerError::Conflict("x".into()).status_code(), 409);
        assert_eq!(TrackerError::Corrupt("x".into()).status_code(), 500);
    }
}
