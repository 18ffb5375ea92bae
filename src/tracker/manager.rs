//! Tracker operations that span the store and attachment storage

use super::identity::slug_matches;
use super::models::*;
use super::status::{self, ProjectNextActions, ProjectStatusReport, ProjectStatusSummary};
use crate::attachments::{decode_payload, is_safe_name, BlobStore};
use crate::error::{TrackerError, TrackerResult};
use crate::store::models::*;
use crate::store::TrackerStore;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Manager for tracker operations
pub struct TrackerManager {
    store: Arc<dyn TrackerStore>,
    blobs: Arc<dyn BlobStore>,
    next_action_limit: usize,
}

impl TrackerManager {
    /// Create a new tracker manager
    pub fn new(
        store: Arc<dyn TrackerStore>,
        blobs: Arc<dyn BlobStore>,
        next_action_limit: usize,
    ) -> Self {
        Self {
            store,
            blobs,
            next_action_limit: next_action_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn TrackerStore> {
        &self.store
    }

    // ========================================================================
    // Task creation
    // ========================================================================

    /// Create a task (or replay an existing one) and store inline attachments
    /// for newly created tasks. Attachment failures never fail the request.
    pub async fn create_task(&self, req: &CreateTaskRequest) -> TrackerResult<TaskWrite> {
        let write = self.store.create_task(req).await?;
        if write.created {
            for upload in &req.attachments {
                self.store_attachment(write.task.id, upload).await;
            }
        }
        Ok(write)
    }

    async fn store_attachment(&self, task_id: Uuid, upload: &AttachmentUpload) -> Option<Attachment> {
        if !is_safe_name(&upload.name) {
            tracing::warn!(%task_id, name = %upload.name, "Skipping attachment with unsafe name");
            return None;
        }
        let Some(bytes) = decode_payload(&upload.content_base64) else {
            tracing::warn!(%task_id, name = %upload.name, "Skipping undecodable attachment");
            return None;
        };

        let path = match self.blobs.put(task_id, &upload.name, &bytes).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(%task_id, name = %upload.name, error = %e, "Failed to write attachment");
                return None;
            }
        };
        match self
            .store
            .add_attachment(task_id, &upload.name, &path, bytes.len() as i64)
            .await
        {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                tracing::warn!(%task_id, name = %upload.name, error = %e, "Failed to record attachment");
                None
            }
        }
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    async fn load_project(&self, project_id: Uuid) -> TrackerResult<(Project, Vec<Milestone>, Vec<Task>)> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Project"))?;
        let milestones = self.store.list_milestones(Some(project_id)).await?;
        let tasks = self.store.list_project_tasks(project_id).await?;
        Ok((project, milestones, tasks))
    }

    /// Effort roll-up for the project and each of its milestones
    pub async fn project_status(&self, project_id: Uuid) -> TrackerResult<ProjectStatusReport> {
        let (project, milestones, tasks) = self.load_project(project_id).await?;
        Ok(status::compute_project_status(&project, &milestones, &tasks))
    }

    /// Top open tasks by priority
    pub async fn next_actions(&self, project_id: Uuid) -> TrackerResult<ProjectNextActions> {
        let (project, _, tasks) = self.load_project(project_id).await?;
        Ok(ProjectNextActions {
            project_id: project.id,
            suggestions: status::select_next_actions(&tasks, self.next_action_limit),
        })
    }

    /// One-line narrative of the project's progress
    pub async fn status_summary(&self, project_id: Uuid) -> TrackerResult<ProjectStatusSummary> {
        let (project, milestones, tasks) = self.load_project(project_id).await?;
        Ok(status::generate_summary(
            &project,
            &milestones,
            &tasks,
            self.next_action_limit,
            Utc::now(),
        ))
    }

    // ========================================================================
    // Milestone lookup
    // ========================================================================

    /// Milestones of a project filtered by exact slug, else by name substring
    /// (case-insensitive), oldest first, at most `limit`.
    pub async fn find_milestones(
        &self,
        project_id: Uuid,
        slug: Option<&str>,
        name: Option<&str>,
        limit: usize,
    ) -> TrackerResult<Vec<Milestone>> {
        if self.store.get_project(project_id).await?.is_none() {
            return Err(TrackerError::not_found("Project"));
        }
        let milestones = self.store.list_milestones(Some(project_id)).await?;
        let name = name.map(str::to_lowercase);

        Ok(milestones
            .into_iter()
            .filter(|m| match (slug, &name) {
                (Some(slug), _) => slug_matches(&m.effective_slug(), slug),
                (None, Some(name)) => m.name.to_lowercase().contains(name.as_str()),
                (None, None) => true,
            })
            .take(limit.max(1))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{seed_milestone, test_manager};
    use base64::Engine;

    #[tokio::test]
    async fn test_create_task_stores_valid_attachments_only() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir).await;
        let milestone = seed_milestone(manager.store(), "Launch").await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"trace");

        let req = CreateTaskRequest {
            milestone_id: Some(milestone.id),
            title: "Investigate".into(),
            attachments: vec![
                AttachmentUpload {
                    name: "trace.log".into(),
                    content_base64: encoded.clone(),
                },
                AttachmentUpload {
                    name: "broken.bin".into(),
                    content_base64: "***".into(),
                },
                AttachmentUpload {
                    name: "../escape".into(),
                    content_base64: encoded,
                },
            ],
            ..Default::default()
        };
        let write = manager.create_task(&req).await.unwrap();
        assert!(write.created);

        let attachments = manager.store().list_attachments(write.task.id).await.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "trace.log");
        assert_eq!(attachments[0].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_find_milestones_filters() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir).await;
        let milestone = seed_milestone(manager.store(), "Beta Launch").await;

        let by_slug = manager
            .find_milestones(milestone.project_id, Some("BETA-launch"), None, 10)
            .await
            .unwrap();
        assert_eq!(by_slug.len(), 1);

        let by_name = manager
            .find_milestones(milestone.project_id, None, Some("launch"), 10)
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let none = manager
            .find_milestones(milestone.project_id, None, Some("gamma"), 10)
            .await
            .unwrap();
        assert!(none.is_empty());

        let missing = manager.find_milestones(Uuid::new_v4(), None, None, 10).await;
        assert!(matches!(missing, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_of_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir).await;
        let milestone = seed_milestone(manager.store(), "Empty").await;

        let report = manager.project_status(milestone.project_id).await.unwrap();
        assert_eq!(report.effort.total_estimate, 0.0);
        assert_eq!(report.effort.percent_complete, 0.0);
        assert_eq!(report.milestones.len(), 1);

        let actions = manager.next_actions(milestone.project_id).await.unwrap();
        assert!(actions.suggestions.is_empty());
    }
}
