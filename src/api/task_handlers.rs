//! Task handlers: idempotent create, upsert, lookups and optimistic-locked updates

use super::handlers::{lock_version_from_if_match, task_headers, AppError, TrackerState};
use super::query::{
    clamp_limit, ProjectScopeQuery, ResolveTaskQuery, TaskListQuery, TASK_LIST_DEFAULT_LIMIT,
    TASK_LIST_MAX_LIMIT,
};
use crate::store::models::*;
use crate::tracker::identity::{ProjectRef, TaskRef};
use crate::tracker::models::*;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Task body returned by create, echoing the milestone slug the caller used
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub results: Vec<BatchStatusResult>,
}

/// 201 for a new row, 200 for a replay; both carry `Location` and `ETag`
fn write_response_parts(write: &TaskWrite) -> (StatusCode, HeaderMap) {
    let mut headers = task_headers(&write.task);
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/tasks/{}", write.task.id)) {
        headers.insert(header::LOCATION, location);
    }
    let status = if write.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, headers)
}

/// Create a task; replays return the existing row with 200
pub async fn create_task(
    State(state): State<TrackerState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, HeaderMap, Json<TaskResponse>), AppError> {
    let write = state.tracker.create_task(&req).await?;
    let (status, headers) = write_response_parts(&write);
    let milestone_slug = req
        .milestone_slug
        .filter(|slug| !slug.trim().is_empty());
    Ok((
        status,
        headers,
        Json(TaskResponse {
            task: write.task,
            milestone_slug,
        }),
    ))
}

/// Natural-key upsert
pub async fn upsert_task(
    State(state): State<TrackerState>,
    Json(req): Json<UpsertTaskRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Task>), AppError> {
    let write = state.store.upsert_task(&req).await?;
    let (status, headers) = write_response_parts(&write);
    Ok((status, headers, Json(write.task)))
}

/// List tasks, oldest first
pub async fn list_tasks(
    State(state): State<TrackerState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let project_id = match (query.project_id, query.project_slug.as_deref()) {
        (Some(id), _) => Some(id),
        (None, Some(slug)) if !slug.trim().is_empty() => Some(
            state
                .store
                .resolve_project(&ProjectRef::Slug(slug.to_string()))
                .await?
                .id,
        ),
        _ => None,
    };

    let filter = TaskFilter {
        external_id: query.external_id.filter(|e| !e.is_empty()),
        project_id,
        milestone_id: query.milestone_id,
        created_after: query.created_after,
        limit: clamp_limit(query.limit, TASK_LIST_DEFAULT_LIMIT, TASK_LIST_MAX_LIMIT),
        offset: query.offset.unwrap_or(0),
    };
    Ok(Json(state.store.list_tasks(&filter).await?))
}

/// Resolve a task by external id or by project / milestone / task slug
pub async fn resolve_task(
    State(state): State<TrackerState>,
    Query(query): Query<ResolveTaskQuery>,
) -> Result<(HeaderMap, Json<Task>), AppError> {
    let req = ResolveTaskRequest {
        external_id: query.external_id,
        project_id: query.project_id,
        project_slug: query.project_slug,
        milestone_id: query.milestone_id,
        milestone_slug: query.milestone_slug,
        task_slug: query.task_slug,
    };
    let task = state.store.resolve_task(&req).await?;
    Ok((task_headers(&task), Json(task)))
}

/// Get a task by ID
pub async fn get_task(
    State(state): State<TrackerState>,
    Path(task_id): Path<Uuid>,
) -> Result<(HeaderMap, Json<Task>), AppError> {
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or(AppError::NotFound("Task not found".into()))?;
    Ok((task_headers(&task), Json(task)))
}

/// Partial update. The lock token comes from the body, else from `If-Match`.
pub async fn update_task(
    State(state): State<TrackerState>,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    Json(mut req): Json<UpdateTaskRequest>,
) -> Result<(HeaderMap, Json<Task>), AppError> {
    if req.lock_version.is_none() {
        req.lock_version = lock_version_from_if_match(&headers)?;
    }
    let task = state.store.update_task(task_id, &req).await?;
    Ok((task_headers(&task), Json(task)))
}

/// Delete a task and its subtasks
pub async fn delete_task(
    State(state): State<TrackerState>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_task(task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    state: &TrackerState,
    task: TaskRef,
    headers: &HeaderMap,
    req: StatusUpdateRequest,
) -> Result<(HeaderMap, Json<Task>), AppError> {
    let lock_version = match req.lock_version {
        Some(version) => Some(version),
        None => lock_version_from_if_match(headers)?,
    };
    let task = state
        .store
        .update_task_status(&task, req.status, lock_version)
        .await
        .map_err(AppError::with_current)?;
    Ok((task_headers(&task), Json(task)))
}

/// Status transition by ID. A stale token gets 409 with the current task.
pub async fn update_task_status(
    State(state): State<TrackerState>,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<(HeaderMap, Json<Task>), AppError> {
    set_status(&state, TaskRef::Id(task_id), &headers, req).await
}

/// Status transition by external id, optionally scoped with `?project_id=`
pub async fn update_task_status_by_external(
    State(state): State<TrackerState>,
    Path(external_id): Path<String>,
    Query(scope): Query<ProjectScopeQuery>,
    headers: HeaderMap,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<(HeaderMap, Json<Task>), AppError> {
    let task = TaskRef::from_parts(None, Some(&external_id), scope.project_id)?;
    set_status(&state, task, &headers, req).await
}

/// Independent status changes; always 200 with one result per item
pub async fn batch_update_status(
    State(state): State<TrackerState>,
    Json(req): Json<BatchStatusRequest>,
) -> Result<Json<BatchStatusResponse>, AppError> {
    let results = state.store.batch_update_status(&req.items).await?;
    let failed = results.iter().filter(|r| !r.ok).count();
    tracing::debug!(items = results.len(), failed, "Batch status update");
    Ok(Json(BatchStatusResponse { results }))
}

/// Attachments stored for a task
pub async fn list_task_attachments(
    State(state): State<TrackerState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<Attachment>>, AppError> {
    if state.store.get_task(task_id).await?.is_none() {
        return Err(AppError::NotFound("Task not found".into()));
    }
    Ok(Json(state.store.list_attachments(task_id).await?))
}
