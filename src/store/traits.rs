//! TrackerStore trait definition
//!
//! Abstract interface over tracker persistence. It mirrors the public async
//! methods of `SqliteStore` so handlers and the manager depend only on this.

use crate::error::TrackerResult;
use crate::store::models::*;
use crate::tracker::identity::{ProjectRef, TaskRef};
use crate::tracker::models::*;
use async_trait::async_trait;
use uuid::Uuid;

/// Abstract interface for all tracker persistence operations.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Check the backing database answers
    async fn health_check(&self) -> TrackerResult<bool>;

    // ========================================================================
    // Project operations
    // ========================================================================

    /// Create a project; the parent, if any, must exist
    async fn create_project(&self, req: &CreateProjectRequest) -> TrackerResult<Project>;

    /// Get a project by ID
    async fn get_project(&self, id: Uuid) -> TrackerResult<Option<Project>>;

    /// Resolve a project by ID or slug
    async fn resolve_project(&self, project: &ProjectRef) -> TrackerResult<Project>;

    /// List projects, optionally only the children of `parent_id`
    async fn list_projects(&self, parent_id: Option<Uuid>) -> TrackerResult<Vec<Project>>;

    /// Partial update; rejects a parent that would create a cycle
    async fn update_project(&self, id: Uuid, req: &UpdateProjectRequest)
        -> TrackerResult<Project>;

    /// Delete a project and everything beneath it
    async fn delete_project(&self, id: Uuid) -> TrackerResult<()>;

    // ========================================================================
    // Milestone and phase operations
    // ========================================================================

    /// Create a milestone in an existing project
    async fn create_milestone(&self, req: &CreateMilestoneRequest) -> TrackerResult<Milestone>;

    /// Get a milestone by ID
    async fn get_milestone(&self, id: Uuid) -> TrackerResult<Option<Milestone>>;

    /// List milestones, optionally for one project
    async fn list_milestones(&self, project_id: Option<Uuid>) -> TrackerResult<Vec<Milestone>>;

    /// Partial update of a milestone
    async fn update_milestone(
        &self,
        id: Uuid,
        req: &UpdateMilestoneRequest,
    ) -> TrackerResult<Milestone>;

    /// Delete a milestone and its tasks
    async fn delete_milestone(&self, id: Uuid) -> TrackerResult<()>;

    /// Create or update the milestone with `req.slug` in the project.
    /// Returns the milestone and whether it was created.
    async fn upsert_milestone(
        &self,
        project_id: Uuid,
        req: &UpsertMilestoneRequest,
    ) -> TrackerResult<(Milestone, bool)>;

    /// Create a phase in an existing milestone
    async fn create_phase(&self, req: &CreatePhaseRequest) -> TrackerResult<Phase>;

    /// Get a phase by ID
    async fn get_phase(&self, id: Uuid) -> TrackerResult<Option<Phase>>;

    /// List phases, optionally for one milestone
    async fn list_phases(&self, milestone_id: Option<Uuid>) -> TrackerResult<Vec<Phase>>;

    /// Delete a phase; member tasks keep existing without a phase
    async fn delete_phase(&self, id: Uuid) -> TrackerResult<()>;

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Idempotent create keyed by `(project, external_id)`
    async fn create_task(&self, req: &CreateTaskRequest) -> TrackerResult<TaskWrite>;

    /// Natural-key upsert
    async fn upsert_task(&self, req: &UpsertTaskRequest) -> TrackerResult<TaskWrite>;

    /// Get a task by ID
    async fn get_task(&self, id: Uuid) -> TrackerResult<Option<Task>>;

    /// List tasks matching the filter, oldest first
    async fn list_tasks(&self, filter: &TaskFilter) -> TrackerResult<Vec<Task>>;

    /// All tasks under a project's milestones
    async fn list_project_tasks(&self, project_id: Uuid) -> TrackerResult<Vec<Task>>;

    /// Look a task up by external id or by slug path
    async fn resolve_task(&self, req: &ResolveTaskRequest) -> TrackerResult<Task>;

    /// Partial update with optional optimistic lock
    async fn update_task(&self, id: Uuid, req: &UpdateTaskRequest) -> TrackerResult<Task>;

    /// Change a task's status with optional optimistic lock
    async fn update_task_status(
        &self,
        task: &TaskRef,
        status: TaskStatus,
        lock_version: Option<i64>,
    ) -> TrackerResult<Task>;

    /// Apply independent status changes, one result per item in input order
    async fn batch_update_status(
        &self,
        items: &[BatchStatusItem],
    ) -> TrackerResult<Vec<BatchStatusResult>>;

    /// Delete a task and its subtasks
    async fn delete_task(&self, id: Uuid) -> TrackerResult<()>;

    /// Record a stored attachment for a task
    async fn add_attachment(
        &self,
        task_id: Uuid,
        name: &str,
        path: &str,
        size_bytes: i64,
    ) -> TrackerResult<Attachment>;

    /// List a task's attachments
    async fn list_attachments(&self, task_id: Uuid) -> TrackerResult<Vec<Attachment>>;

    // ========================================================================
    // Persona operations
    // ========================================================================

    /// Register a persona; the key must be new
    async fn create_persona(&self, req: &CreatePersonaRequest) -> TrackerResult<Persona>;

    /// List personas by name
    async fn list_personas(&self) -> TrackerResult<Vec<Persona>>;

    /// Personas assigned to a project
    async fn list_project_personas(&self, project_id: Uuid) -> TrackerResult<Vec<ProjectPersona>>;

    /// One persona assignment of a project
    async fn get_project_persona(
        &self,
        project_id: Uuid,
        persona_key: &str,
    ) -> TrackerResult<ProjectPersona>;

    /// Replace a project's persona assignments
    async fn replace_project_personas(
        &self,
        project_id: Uuid,
        assignments: &[PersonaAssignment],
    ) -> TrackerResult<Vec<ProjectPersona>>;

    // ========================================================================
    // Bug and event operations
    // ========================================================================

    /// List bugs, newest first
    async fn list_bugs(
        &self,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
    ) -> TrackerResult<Vec<Bug>>;

    /// File a bug against a project
    async fn create_bug(&self, req: &CreateBugRequest) -> TrackerResult<Bug>;

    /// Partial update of a bug
    async fn update_bug(&self, id: Uuid, req: &UpdateBugRequest) -> TrackerResult<Bug>;

    /// Delete a bug
    async fn delete_bug(&self, id: Uuid) -> TrackerResult<()>;

    /// List a project's events, newest first
    async fn list_events(&self, filter: &EventFilter) -> TrackerResult<Vec<EventLog>>;

    /// Append an event to a project's log
    async fn create_event(&self, req: &CreateEventRequest) -> TrackerResult<EventLog>;

    // ========================================================================
    // Context snapshot operations
    // ========================================================================

    /// Record a snapshot and make it the repository's latest; returns its id
    async fn record_snapshot(&self, req: &CreateContextSnapshotRequest) -> TrackerResult<i64>;

    /// Newest snapshot of a repository, optionally on a branch
    async fn latest_snapshot(
        &self,
        repo_id: &str,
        branch: Option<&str>,
    ) -> TrackerResult<Option<ContextSnapshot>>;

    /// Snapshots of a repository, newest first
    async fn list_snapshots(&self, repo_id: &str, limit: usize)
        -> TrackerResult<Vec<ContextSnapshot>>;

    /// Repositories with at least one snapshot
    async fn list_context_repos(&self) -> TrackerResult<Vec<String>>;
}
