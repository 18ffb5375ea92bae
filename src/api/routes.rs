//! API route definitions

use super::context_handlers;
use super::handlers::{self, TrackerState};
use super::project_handlers;
use super::record_handlers;
use super::task_handlers;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: TrackerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Projects
        // ====================================================================
        .route(
            "/v1/projects",
            get(project_handlers::list_projects).post(project_handlers::create_project),
        )
        .route(
            "/v1/projects/{project_id}",
            get(project_handlers::get_project)
                .patch(project_handlers::update_project)
                .delete(project_handlers::delete_project),
        )
        .route(
            "/v1/projects/{project_id}/status",
            get(project_handlers::get_project_status),
        )
        .route(
            "/v1/projects/{project_id}/status/summary",
            get(project_handlers::get_status_summary),
        )
        .route(
            "/v1/projects/{project_id}/next-action",
            get(project_handlers::get_next_actions),
        )
        .route(
            "/v1/projects/{project_id}/milestones",
            get(project_handlers::find_project_milestones),
        )
        .route(
            "/v1/projects/{project_id}/milestones:upsert",
            post(project_handlers::upsert_project_milestone),
        )
        // ====================================================================
        // Milestones & phases
        // ====================================================================
        .route(
            "/v1/milestones",
            get(project_handlers::list_milestones).post(project_handlers::create_milestone),
        )
        .route(
            "/v1/milestones/{milestone_id}",
            get(project_handlers::get_milestone)
                .patch(project_handlers::update_milestone)
                .delete(project_handlers::delete_milestone),
        )
        .route(
            "/v1/phases",
            get(project_handlers::list_phases).post(project_handlers::create_phase),
        )
        .route(
            "/v1/phases/{phase_id}",
            get(project_handlers::get_phase).delete(project_handlers::delete_phase),
        )
        // ====================================================================
        // Tasks
        // ====================================================================
        .route(
            "/v1/tasks",
            get(task_handlers::list_tasks).post(task_handlers::create_task),
        )
        .route("/v1/tasks:upsert", post(task_handlers::upsert_task))
        .route("/v1/tasks/resolve", get(task_handlers::resolve_task))
        .route(
            "/v1/tasks/status:batch",
            post(task_handlers::batch_update_status),
        )
        .route(
            "/v1/tasks/by-external/{external_id}/status",
            patch(task_handlers::update_task_status_by_external),
        )
        .route(
            "/v1/tasks/{task_id}",
            get(task_handlers::get_task)
                .patch(task_handlers::update_task)
                .delete(task_handlers::delete_task),
        )
        .route(
            "/v1/tasks/{task_id}/status",
            patch(task_handlers::update_task_status),
        )
        .route(
            "/v1/tasks/{task_id}/attachments",
            get(task_handlers::list_task_attachments),
        )
        // ====================================================================
        // Personas
        // ====================================================================
        .route(
            "/v1/personas",
            get(record_handlers::list_personas).post(record_handlers::create_persona),
        )
        .route(
            "/v1/personas/projects/{project_id}",
            get(record_handlers::list_project_personas)
                .put(record_handlers::replace_project_personas),
        )
        .route(
            "/v1/personas/projects/{project_id}/{persona_key}",
            get(record_handlers::get_project_persona),
        )
        // ====================================================================
        // Bugs & events
        // ====================================================================
        .route(
            "/v1/bugs",
            get(record_handlers::list_bugs).post(record_handlers::create_bug),
        )
        .route(
            "/v1/bugs/{bug_id}",
            patch(record_handlers::update_bug).delete(record_handlers::delete_bug),
        )
        .route(
            "/v1/events",
            get(record_handlers::list_events).post(record_handlers::create_event),
        )
        // ====================================================================
        // Repository context
        // ====================================================================
        .route("/context/upsert", post(context_handlers::upsert_context))
        .route("/context/latest", get(context_handlers::latest_context))
        .route("/context/list", get(context_handlers::list_context))
        .route("/context/repos", get(context_handlers::list_context_repos))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
