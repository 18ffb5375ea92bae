//! `TrackerStore` implementation for `SqliteStore`.
//!
//! Every method simply delegates to the corresponding inherent method on `SqliteStore`.

use async_trait::async_trait;
use uuid::Uuid;

use super::models::*;
use super::sqlite::SqliteStore;
use super::traits::TrackerStore;
use crate::error::TrackerResult;
use crate::tracker::identity::{ProjectRef, TaskRef};
use crate::tracker::models::*;

#[async_trait]
impl TrackerStore for SqliteStore {
    async fn health_check(&self) -> TrackerResult<bool> {
        self.health_check().await
    }

    // ========================================================================
    // Project operations
    // ========================================================================

    async fn create_project(&self, req: &CreateProjectRequest) -> TrackerResult<Project> {
        self.create_project(req).await
    }

    async fn get_project(&self, id: Uuid) -> TrackerResult<Option<Project>> {
        self.get_project(id).await
    }

    async fn resolve_project(&self, project: &ProjectRef) -> TrackerResult<Project> {
        self.resolve_project(project).await
    }

    async fn list_projects(&self, parent_id: Option<Uuid>) -> TrackerResult<Vec<Project>> {
        self.list_projects(parent_id).await
    }

    async fn update_project(
        &self,
        id: Uuid,
        req: &UpdateProjectRequest,
    ) -> TrackerResult<Project> {
        self.update_project(id, req).await
    }

    async fn delete_project(&self, id: Uuid) -> TrackerResult<()> {
        self.delete_project(id).await
    }

    // ========================================================================
    // Milestone and phase operations
    // ========================================================================

    async fn create_milestone(&self, req: &CreateMilestoneRequest) -> TrackerResult<Milestone> {
        self.create_milestone(req).await
    }

    async fn get_milestone(&self, id: Uuid) -> TrackerResult<Option<Milestone>> {
        self.get_milestone(id).await
    }

    async fn list_milestones(&self, project_id: Option<Uuid>) -> TrackerResult<Vec<Milestone>> {
        self.list_milestones(project_id).await
    }

    async fn update_milestone(
        &self,
        id: Uuid,
        req: &UpdateMilestoneRequest,
    ) -> TrackerResult<Milestone> {
        self.update_milestone(id, req).await
    }

    async fn delete_milestone(&self, id: Uuid) -> TrackerResult<()> {
        self.delete_milestone(id).await
    }

    async fn upsert_milestone(
        &self,
        project_id: Uuid,
        req: &UpsertMilestoneRequest,
    ) -> TrackerResult<(Milestone, bool)> {
        self.upsert_milestone(project_id, req).await
    }

    async fn create_phase(&self, req: &CreatePhaseRequest) -> TrackerResult<Phase> {
        self.create_phase(req).await
    }

    async fn get_phase(&self, id: Uuid) -> TrackerResult<Option<Phase>> {
        self.get_phase(id).await
    }

    async fn list_phases(&self, milestone_id: Option<Uuid>) -> TrackerResult<Vec<Phase>> {
        self.list_phases(milestone_id).await
    }

    async fn delete_phase(&self, id: Uuid) -> TrackerResult<()> {
        self.delete_phase(id).await
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    async fn create_task(&self, req: &CreateTaskRequest) -> TrackerResult<TaskWrite> {
        self.create_task(req).await
    }

    async fn upsert_task(&self, req: &UpsertTaskRequest) -> TrackerResult<TaskWrite> {
        self.upsert_task(req).await
    }

    async fn get_task(&self, id: Uuid) -> TrackerResult<Option<Task>> {
        self.get_task(id).await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TrackerResult<Vec<Task>> {
        self.list_tasks(filter).await
    }

    async fn list_project_tasks(&self, project_id: Uuid) -> TrackerResult<Vec<Task>> {
        self.list_project_tasks(project_id).await
    }

    async fn resolve_task(&self, req: &ResolveTaskRequest) -> TrackerResult<Task> {
        self.resolve_task(req).await
    }

    async fn update_task(&self, id: Uuid, req: &UpdateTaskRequest) -> TrackerResult<Task> {
        self.update_task(id, req).await
    }

    async fn update_task_status(
        &self,
        task: &TaskRef,
        status: TaskStatus,
        lock_version: Option<i64>,
    ) -> TrackerResult<Task> {
        self.update_task_status(task, status, lock_version).await
    }

    async fn batch_update_status(
        &self,
        items: &[BatchStatusItem],
    ) -> TrackerResult<Vec<BatchStatusResult>> {
        self.batch_update_status(items).await
    }

    async fn delete_task(&self, id: Uuid) -> TrackerResult<()> {
        self.delete_task(id).await
    }

    async fn add_attachment(
        &self,
        task_id: Uuid,
        name: &str,
        path: &str,
        size_bytes: i64,
    ) -> TrackerResult<Attachment> {
        self.add_attachment(task_id, name, path, size_bytes).await
    }

    async fn list_attachments(&self, task_id: Uuid) -> TrackerResult<Vec<Attachment>> {
        self.list_attachments(task_id).await
    }

    // ========================================================================
    // Persona operations
    // ========================================================================

    async fn create_persona(&self, req: &CreatePersonaRequest) -> TrackerResult<Persona> {
        self.create_persona(req).await
    }

    async fn list_personas(&self) -> TrackerResult<Vec<Persona>> {
        self.list_personas().await
    }

    async fn list_project_personas(&self, project_id: Uuid) -> TrackerResult<Vec<ProjectPersona>> {
        self.list_project_personas(project_id).await
    }

    async fn get_project_persona(
        &self,
        project_id: Uuid,
        persona_key: &str,
    ) -> TrackerResult<ProjectPersona> {
        self.get_project_persona(project_id, persona_key).await
    }

    async fn replace_project_personas(
        &self,
        project_id: Uuid,
        assignments: &[PersonaAssignment],
    ) -> TrackerResult<Vec<ProjectPersona>> {
        self.replace_project_personas(project_id, assignments).await
    }

    // ========================================================================
    // Bug and event operations
    // ========================================================================

    async fn list_bugs(
        &self,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
    ) -> TrackerResult<Vec<Bug>> {
        self.list_bugs(project_id, task_id).await
    }

    async fn create_bug(&self, req: &CreateBugRequest) -> TrackerResult<Bug> {
        self.create_bug(req).await
    }

    async fn update_bug(&self, id: Uuid, req: &UpdateBugRequest) -> TrackerResult<Bug> {
        self.update_bug(id, req).await
    }

    async fn delete_bug(&self, id: Uuid) -> TrackerResult<()> {
        self.delete_bug(id).await
    }

    async fn list_events(&self, filter: &EventFilter) -> TrackerResult<Vec<EventLog>> {
        self.list_events(filter).await
    }

    async fn create_event(&self, req: &CreateEventRequest) -> TrackerResult<EventLog> {
        self.create_event(req).await
    }

    // ========================================================================
    // Context snapshot operations
    // ========================================================================

    async fn record_snapshot(&self, req: &CreateContextSnapshotRequest) -> TrackerResult<i64> {
        self.record_snapshot(req).await
    }

    async fn latest_snapshot(
        &self,
        repo_id: &str,
        branch: Option<&str>,
    ) -> TrackerResult<Option<ContextSnapshot>> {
        self.latest_snapshot(repo_id, branch).await
    }

    async fn list_snapshots(
        &self,
        repo_id: &str,
        limit: usize,
    ) -> TrackerResult<Vec<ContextSnapshot>> {
        self.list_snapshots(repo_id, limit).await
    }

    async fn list_context_repos(&self) -> TrackerResult<Vec<String>> {
        self.list_context_repos().await
    }
}
