//! Persona, bug and event log handlers

use super::handlers::{AppError, TrackerState};
use super::query::{clamp_limit, BugListQuery, EventListQuery};
use crate::store::models::*;
use crate::tracker::models::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

const EVENT_LIST_DEFAULT_LIMIT: usize = 50;
const EVENT_LIST_MAX_LIMIT: usize = 1000;

// ============================================================================
// Personas
// ============================================================================

pub async fn create_persona(
    State(state): State<TrackerState>,
    Json(req): Json<CreatePersonaRequest>,
) -> Result<(StatusCode, Json<Persona>), AppError> {
    let persona = state.store.create_persona(&req).await?;
    Ok((StatusCode::CREATED, Json(persona)))
}

pub async fn list_personas(
    State(state): State<TrackerState>,
) -> Result<Json<Vec<Persona>>, AppError> {
    Ok(Json(state.store.list_personas().await?))
}

pub async fn list_project_personas(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ProjectPersona>>, AppError> {
    Ok(Json(state.store.list_project_personas(project_id).await?))
}

/// Replace the project's persona assignments
pub async fn replace_project_personas(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ReplaceProjectPersonasRequest>,
) -> Result<Json<Vec<ProjectPersona>>, AppError> {
    let personas = state
        .store
        .replace_project_personas(project_id, &req.personas)
        .await?;
    Ok(Json(personas))
}

pub async fn get_project_persona(
    State(state): State<TrackerState>,
    Path((project_id, persona_key)): Path<(Uuid, String)>,
) -> Result<Json<ProjectPersona>, AppError> {
    Ok(Json(
        state
            .store
            .get_project_persona(project_id, &persona_key)
            .await?,
    ))
}

// ============================================================================
// Bugs
// ============================================================================

pub async fn list_bugs(
    State(state): State<TrackerState>,
    Query(query): Query<BugListQuery>,
) -> Result<Json<Vec<Bug>>, AppError> {
    Ok(Json(state.store.list_bugs(query.project_id, query.task_id).await?))
}

pub async fn create_bug(
    State(state): State<TrackerState>,
    Json(req): Json<CreateBugRequest>,
) -> Result<(StatusCode, Json<Bug>), AppError> {
    let bug = state.store.create_bug(&req).await?;
    Ok((StatusCode::CREATED, Json(bug)))
}

pub async fn update_bug(
    State(state): State<TrackerState>,
    Path(bug_id): Path<Uuid>,
    Json(req): Json<UpdateBugRequest>,
) -> Result<Json<Bug>, AppError> {
    Ok(Json(state.store.update_bug(bug_id, &req).await?))
}

pub async fn delete_bug(
    State(state): State<TrackerState>,
    Path(bug_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_bug(bug_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Event log
// ============================================================================

/// A project's events, newest first
pub async fn list_events(
    State(state): State<TrackerState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<EventLog>>, AppError> {
    let filter = EventFilter {
        project_id: query.project_id,
        milestone_id: query.milestone_id,
        task_id: query.task_id,
        limit: clamp_limit(query.limit, EVENT_LIST_DEFAULT_LIMIT, EVENT_LIST_MAX_LIMIT),
    };
    Ok(Json(state.store.list_events(&filter).await?))
}

pub async fn create_event(
    State(state): State<TrackerState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventLog>), AppError> {
    let event = state.store.create_event(&req).await?;
    Ok((StatusCode::CREATED, Json(event)))
}
