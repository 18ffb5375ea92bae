//! Project, milestone and phase handlers, plus the project roll-up reads

use super::handlers::{AppError, TrackerState};
use super::query::{
    clamp_limit, MilestoneListQuery, MilestoneLookupQuery, PhaseListQuery, ProjectListQuery,
};
use crate::store::models::*;
use crate::tracker::models::*;
use crate::tracker::status::{ProjectNextActions, ProjectStatusReport, ProjectStatusSummary};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

const MILESTONE_LOOKUP_DEFAULT_LIMIT: usize = 10;
const MILESTONE_LOOKUP_MAX_LIMIT: usize = 1000;

// ============================================================================
// Projects
// ============================================================================

/// Create a project
pub async fn create_project(
    State(state): State<TrackerState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = state.store.create_project(&req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// List projects, optionally the children of `parent_id`
pub async fn list_projects(
    State(state): State<TrackerState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.store.list_projects(query.parent_id).await?))
}

/// Get a project by ID
pub async fn get_project(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or(AppError::NotFound("Project not found".into()))?;
    Ok(Json(project))
}

/// Partial update of a project
pub async fn update_project(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(state.store.update_project(project_id, &req).await?))
}

/// Delete a project and everything under it
pub async fn delete_project(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_project(project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Effort roll-up for a project, rounded to two decimals
pub async fn get_project_status(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectStatusReport>, AppError> {
    let report = state.tracker.project_status(project_id).await?;
    Ok(Json(report.rounded()))
}

/// Ranked next actions for a project
pub async fn get_next_actions(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectNextActions>, AppError> {
    Ok(Json(state.tracker.next_actions(project_id).await?))
}

/// Narrative summary of a project
pub async fn get_status_summary(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectStatusSummary>, AppError> {
    Ok(Json(state.tracker.status_summary(project_id).await?))
}

// ============================================================================
// Milestones
// ============================================================================

/// Compact milestone entry returned by the project lookup endpoint
#[derive(Debug, Serialize)]
pub struct MilestoneRef {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub url: String,
}

impl From<&Milestone> for MilestoneRef {
    fn from(m: &Milestone) -> Self {
        Self {
            id: m.id,
            slug: m.effective_slug(),
            name: m.name.clone(),
            start_date: m.start_date,
            due_date: m.due_date,
            url: format!("/v1/milestones/{}", m.id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MilestoneLookupResponse {
    pub ok: bool,
    pub milestones: Vec<MilestoneRef>,
}

/// Find a project's milestones by slug or name fragment
pub async fn find_project_milestones(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<MilestoneLookupQuery>,
) -> Result<Json<MilestoneLookupResponse>, AppError> {
    let limit = clamp_limit(
        query.limit,
        MILESTONE_LOOKUP_DEFAULT_LIMIT,
        MILESTONE_LOOKUP_MAX_LIMIT,
    );
    let milestones = state
        .tracker
        .find_milestones(
            project_id,
            query.slug.as_deref().filter(|s| !s.is_empty()),
            query.name.as_deref().filter(|s| !s.is_empty()),
            limit,
        )
        .await?;
    Ok(Json(MilestoneLookupResponse {
        ok: true,
        milestones: milestones.iter().map(MilestoneRef::from).collect(),
    }))
}

/// Create or update a milestone by slug within a project
pub async fn upsert_project_milestone(
    State(state): State<TrackerState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpsertMilestoneRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Milestone>), AppError> {
    let (milestone, created) = state.store.upsert_milestone(project_id, &req).await?;
    let mut headers = HeaderMap::new();
    let status = if created {
        if let Ok(location) = HeaderValue::from_str(&format!("/v1/milestones/{}", milestone.id)) {
            headers.insert(header::LOCATION, location);
        }
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, headers, Json(milestone)))
}

/// Create a milestone
pub async fn create_milestone(
    State(state): State<TrackerState>,
    Json(req): Json<CreateMilestoneRequest>,
) -> Result<(StatusCode, Json<Milestone>), AppError> {
    let milestone = state.store.create_milestone(&req).await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

/// List milestones, optionally for one project
pub async fn list_milestones(
    State(state): State<TrackerState>,
    Query(query): Query<MilestoneListQuery>,
) -> Result<Json<Vec<Milestone>>, AppError> {
    Ok(Json(state.store.list_milestones(query.project_id).await?))
}

/// Get a milestone by ID
pub async fn get_milestone(
    State(state): State<TrackerState>,
    Path(milestone_id): Path<Uuid>,
) -> Result<Json<Milestone>, AppError> {
    let milestone = state
        .store
        .get_milestone(milestone_id)
        .await?
        .ok_or(AppError::NotFound("Milestone not found".into()))?;
    Ok(Json(milestone))
}

/// Partial update of a milestone
pub async fn update_milestone(
    State(state): State<TrackerState>,
    Path(milestone_id): Path<Uuid>,
    Json(req): Json<UpdateMilestoneRequest>,
) -> Result<Json<Milestone>, AppError> {
    Ok(Json(state.store.update_milestone(milestone_id, &req).await?))
}

/// Delete a milestone and its tasks
pub async fn delete_milestone(
    State(state): State<TrackerState>,
    Path(milestone_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_milestone(milestone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Phases
// ============================================================================

pub async fn create_phase(
    State(state): State<TrackerState>,
    Json(req): Json<CreatePhaseRequest>,
) -> Result<(StatusCode, Json<Phase>), AppError> {
    let phase = state.store.create_phase(&req).await?;
    Ok((StatusCode::CREATED, Json(phase)))
}

pub async fn list_phases(
    State(state): State<TrackerState>,
    Query(query): Query<PhaseListQuery>,
) -> Result<Json<Vec<Phase>>, AppError> {
    Ok(Json(state.store.list_phases(query.milestone_id).await?))
}

pub async fn get_phase(
    State(state): State<TrackerState>,
    Path(phase_id): Path<Uuid>,
) -> Result<Json<Phase>, AppError> {
    let phase = state
        .store
        .get_phase(phase_id)
        .await?
        .ok_or(AppError::NotFound("Phase not found".into()))?;
    Ok(Json(phase))
}

pub async fn delete_phase(
    State(state): State<TrackerState>,
    Path(phase_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_phase(phase_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::test_router;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn create_project(app: &Router, body: Value) -> String {
        let (status, project) = call(app, Method::POST, "/v1/projects", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        project["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_milestone_upsert_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir).await;
        let project_id = create_project(&app, json!({ "name": "Apollo" })).await;
        let uri = format!("/v1/projects/{project_id}/milestones:upsert");

        let (status, created) =
            call(&app, Method::POST, &uri, Some(json!({ "slug": "beta" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["slug"], "beta");

        let (status, updated) = call(
            &app,
            Method::POST,
            &uri,
            Some(json!({ "slug": "beta", "name": "Beta release", "due_date": "2026-12-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], created["id"]);
        assert_eq!(updated["name"], "Beta release");
        assert_eq!(updated["due_date"], "2026-12-01");

        let (status, _) = call(&app, Method::POST, &uri, Some(json!({ "name": "No slug" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_project_cycle_patch_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir).await;
        let root = create_project(&app, json!({ "name": "Root" })).await;
        let child = create_project(&app, json!({ "name": "Child", "parent_id": root })).await;

        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/v1/projects/{root}"),
            Some(json!({ "parent_id": child })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, project) = call(&app, Method::GET, &format!("/v1/projects/{root}"), None).await;
        assert_eq!(project["parent_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_delete_routes_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(&dir).await;
        let project_id = create_project(&app, json!({ "name": "Apollo" })).await;
        let (_, milestone) = call(
            &app,
            Method::POST,
            "/v1/milestones",
            Some(json!({ "project_id": project_id, "name": "Launch" })),
        )
        .await;
        let milestone_id = milestone["id"].as_str().unwrap().to_string();
        let (_, phase) = call(
            &app,
            Method::POST,
            "/v1/phases",
            Some(json!({ "milestone_id": milestone_id, "name": "Build" })),
        )
        .await;
        let phase_id = phase["id"].as_str().unwrap().to_string();
        let (status, task) = call(
            &app,
            Method::POST,
            "/v1/tasks",
            Some(json!({
                "milestone_id": milestone_id,
                "phase_id": phase_id,
                "external_id": "T-1",
                "title": "Ship"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let task_uri = format!("/v1/tasks/{}", task["id"].as_str().unwrap());

        let phase_uri = format!("/v1/phases/{phase_id}");
        let (status, _) = call(&app, Method::DELETE, &phase_uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, task) = call(&app, Method::GET, &task_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["phase_id"], Value::Null);

        let (status, _) =
            call(&app, Method::DELETE, &format!("/v1/projects/{project_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let milestone_uri = format!("/v1/milestones/{milestone_id}");
        let (status, _) = call(&app, Method::GET, &milestone_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::GET, &task_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
