//! Repository context snapshot handlers

use super::handlers::{AppError, TrackerState};
use super::query::{clamp_limit, ContextLatestQuery, ContextListQuery};
use crate::store::models::ContextSnapshot;
use crate::tracker::models::CreateContextSnapshotRequest;
use axum::{
    extract::{Query, State},
    Json,
};

const CONTEXT_LIST_DEFAULT_LIMIT: usize = 20;
const CONTEXT_LIST_MAX_LIMIT: usize = 100;

/// Record a snapshot; responds with the new snapshot id
pub async fn upsert_context(
    State(state): State<TrackerState>,
    Json(req): Json<CreateContextSnapshotRequest>,
) -> Result<Json<i64>, AppError> {
    Ok(Json(state.store.record_snapshot(&req).await?))
}

pub async fn latest_context(
    State(state): State<TrackerState>,
    Query(query): Query<ContextLatestQuery>,
) -> Result<Json<ContextSnapshot>, AppError> {
    let branch = query.branch.as_deref().filter(|b| !b.is_empty());
    let snapshot = state
        .store
        .latest_snapshot(&query.repo_id, branch)
        .await?
        .ok_or(AppError::NotFound("No context found".into()))?;
    Ok(Json(snapshot))
}

pub async fn list_context(
    State(state): State<TrackerState>,
    Query(query): Query<ContextListQuery>,
) -> Result<Json<Vec<ContextSnapshot>>, AppError> {
    let limit = clamp_limit(query.limit, CONTEXT_LIST_DEFAULT_LIMIT, CONTEXT_LIST_MAX_LIMIT);
    Ok(Json(state.store.list_snapshots(&query.repo_id, limit).await?))
}

pub async fn list_context_repos(
    State(state): State<TrackerState>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.store.list_context_repos().await?))
}
