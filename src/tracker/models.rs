//! Request and result types for tracker operations

use crate::error::{TrackerError, TrackerResult};
use crate::store::models::*;
use chrono::{DateTime, NaiveDate, Utc};
use crate::tracker::identity::TaskRef;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
///
/// Use together with `#[serde(default)]`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn require_present<T: Copy>(field: &str, value: Option<Option<T>>) -> TrackerResult<Option<T>> {
    match value {
        Some(None) => Err(TrackerError::Unprocessable(format!(
            "{field} cannot be null"
        ))),
        Some(Some(v)) => Ok(Some(v)),
        None => Ok(None),
    }
}

fn check_effort(field: &str, value: Option<f64>) -> TrackerResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(TrackerError::Unprocessable(format!(
            "{field} must be a non-negative number"
        ))),
        _ => Ok(()),
    }
}

// ============================================================================
// Projects, milestones, phases
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub goal: Option<String>,
    pub direction: Option<String>,
    pub repository_path: Option<String>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub goal: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub direction: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub repository_path: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMilestoneRequest {
    pub project_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<MilestoneStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMilestoneRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub slug: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    pub status: Option<MilestoneStatus>,
}

/// Create-or-update a milestone addressed by slug within a project
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertMilestoneRequest {
    pub slug: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePhaseRequest {
    pub milestone_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub estimated_effort: Option<f64>,
    pub remaining_effort: Option<f64>,
    pub priority_score: Option<f64>,
    pub status: Option<MilestoneStatus>,
}

// ============================================================================
// Tasks
// ============================================================================

/// Options honoured only when a task is created
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskCreateOptions {
    /// Materialize a milestone addressed by slug when none matches
    pub create_milestone_if_missing: bool,
    pub initial_status: Option<TaskStatus>,
}

/// An attachment supplied inline with a create request
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentUpload {
    pub name: String,
    pub content_base64: String,
}

/// Create a task, resolving its milestone, project and parent from any supported reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskRequest {
    pub milestone_id: Option<Uuid>,
    pub milestone_slug: Option<String>,
    pub project_id: Option<Uuid>,
    pub project_slug: Option<String>,
    pub phase_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub parent_task_external_id: Option<String>,
    pub external_id: Option<String>,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub assignee_persona: Option<String>,
    pub persona_required: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub effort_estimate: Option<f64>,
    pub effort_spent: Option<f64>,
    pub priority_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub severity: Option<TaskSeverity>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub options: TaskCreateOptions,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> TrackerResult<()> {
        if self.title.trim().is_empty() {
            return Err(TrackerError::Unprocessable("title must not be empty".into()));
        }
        check_effort("effort_estimate", self.effort_estimate)?;
        check_effort("effort_spent", self.effort_spent)
    }

    /// Explicit status wins over `options.initial_status`
    pub fn initial_status(&self) -> TaskStatus {
        self.status
            .or(self.options.initial_status)
            .unwrap_or_default()
    }
}

/// Editable task fields shared by PATCH and natural-key upsert.
///
/// Absent fields are left untouched; an explicit `null` clears a nullable
/// field and is rejected for fields that cannot be null.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TaskChanges {
    #[serde(default, deserialize_with = "double_option")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub owner: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_persona: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub persona_required: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub acceptance_criteria: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phase_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_task_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub effort_estimate: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub effort_spent: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub priority_score: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub risk_level: Option<Option<RiskLevel>>,
    #[serde(default, deserialize_with = "double_option")]
    pub severity: Option<Option<TaskSeverity>>,
}

impl TaskChanges {
    /// Reject nulls on non-nullable fields and out-of-range values.
    pub fn validate(&self) -> TrackerResult<()> {
        match &self.title {
            Some(None) => {
                return Err(TrackerError::Unprocessable("title cannot be null".into()))
            }
            Some(Some(title)) if title.trim().is_empty() => {
                return Err(TrackerError::Unprocessable("title must not be empty".into()))
            }
            _ => {}
        }
        check_effort("effort_estimate", require_present("effort_estimate", self.effort_estimate)?)?;
        check_effort("effort_spent", require_present("effort_spent", self.effort_spent)?)?;
        require_present("priority_score", self.priority_score)?;
        require_present("risk_level", self.risk_level)?;
        require_present("severity", self.severity)?;
        Ok(())
    }

    /// Apply the present fields to `task`. Returns true if any value changed.
    ///
    /// Relationship fields (`phase_id`, `parent_task_id`) are applied here too;
    /// the caller is responsible for validating them against the store first.
    pub fn apply(&self, task: &mut Task) -> bool {
        let mut changed = false;

        fn set<T: PartialEq>(slot: &mut T, value: T, changed: &mut bool) {
            if *slot != value {
                *slot = value;
                *changed = true;
            }
        }

        if let Some(Some(title)) = &self.title {
            set(&mut task.title, title.clone(), &mut changed);
        }
        if let Some(value) = &self.description {
            set(&mut task.description, value.clone(), &mut changed);
        }
        if let Some(value) = &self.owner {
            set(&mut task.owner, value.clone(), &mut changed);
        }
        if let Some(value) = &self.assignee_persona {
            set(&mut task.assignee_persona, value.clone(), &mut changed);
        }
        if let Some(value) = &self.persona_required {
            set(&mut task.persona_required, value.clone(), &mut changed);
        }
        if let Some(value) = &self.acceptance_criteria {
            set(&mut task.acceptance_criteria, value.clone(), &mut changed);
        }
        if let Some(value) = self.phase_id {
            set(&mut task.phase_id, value, &mut changed);
        }
        if let Some(value) = self.parent_task_id {
            set(&mut task.parent_task_id, value, &mut changed);
        }
        if let Some(Some(value)) = self.effort_estimate {
            set(&mut task.effort_estimate, value, &mut changed);
        }
        if let Some(Some(value)) = self.effort_spent {
            set(&mut task.effort_spent, value, &mut changed);
        }
        if let Some(Some(value)) = self.priority_score {
            set(&mut task.priority_score, value, &mut changed);
        }
        if let Some(Some(value)) = self.risk_level {
            set(&mut task.risk_level, value, &mut changed);
        }
        if let Some(Some(value)) = self.severity {
            set(&mut task.severity, value, &mut changed);
        }

        changed
    }
}

/// Partial update of a task guarded by an optional lock token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub lock_version: Option<i64>,
    /// Reassigns the task; its project follows the new milestone
    pub milestone_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub slug: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    #[serde(flatten)]
    pub changes: TaskChanges,
}

/// Natural-key upsert: match by external id, then by (milestone, slug), else create.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertTaskRequest {
    pub external_id: Option<String>,
    pub project_id: Option<Uuid>,
    pub project_slug: Option<String>,
    pub milestone_id: Option<Uuid>,
    pub milestone_slug: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub options: TaskCreateOptions,
    #[serde(flatten)]
    pub changes: TaskChanges,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TaskStatus,
    pub lock_version: Option<i64>,
}

/// One entry of a batch status update. Fields stay raw JSON until
/// [`BatchStatusItem::task_ref`] and friends parse them, so a malformed entry
/// fails alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchStatusItem {
    pub id: Option<Value>,
    pub external_id: Option<Value>,
    pub project_id: Option<Value>,
    pub status: Option<Value>,
    pub lock_version: Option<Value>,
}

fn batch_text<'a>(field: &str, value: &'a Option<Value>) -> TrackerResult<Option<&'a str>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim()).filter(|s| !s.is_empty())),
        Some(other) => Err(TrackerError::Unprocessable(format!(
            "{field} must be a string, got {other}"
        ))),
    }
}

fn batch_uuid(field: &str, value: &Option<Value>) -> TrackerResult<Option<Uuid>> {
    batch_text(field, value)?
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| TrackerError::Unprocessable(format!("invalid {field} '{raw}'")))
        })
        .transpose()
}

impl BatchStatusItem {
    pub fn task_ref(&self) -> TrackerResult<TaskRef> {
        let id = batch_uuid("task id", &self.id)?;
        let external_id = batch_text("external_id", &self.external_id)?;
        let project_id = batch_uuid("project_id", &self.project_id)?;
        TaskRef::from_parts(id, external_id, project_id)
    }

    pub fn status(&self) -> TrackerResult<TaskStatus> {
        batch_text("status", &self.status)?
            .ok_or_else(|| TrackerError::Unprocessable("status required".into()))?
            .parse()
            .map_err(TrackerError::Unprocessable)
    }

    pub fn lock_version(&self) -> TrackerResult<Option<i64>> {
        match &self.lock_version {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) if n.as_i64().is_some() => Ok(n.as_i64()),
            Some(other) => Err(TrackerError::Unprocessable(format!(
                "lock_version must be an integer, got {other}"
            ))),
        }
    }

    /// Task id echoed in a failed result, when the item carried a valid one
    pub fn reported_id(&self) -> Option<Uuid> {
        batch_uuid("task id", &self.id).ok().flatten()
    }

    pub fn reported_external_id(&self) -> Option<String> {
        batch_text("external_id", &self.external_id)
            .ok()
            .flatten()
            .map(String::from)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchStatusRequest {
    pub items: Vec<BatchStatusItem>,
}

/// Outcome of one batch item; `status` is the HTTP-equivalent code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchStatusResult {
    pub ok: bool,
    pub id: Option<Uuid>,
    pub external_id: Option<String>,
    pub status: u16,
    pub lock_version: Option<i64>,
    pub task_status: Option<TaskStatus>,
    pub error: Option<String>,
}

/// Lookup by external id, or by (project, milestone slug, task slug)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveTaskRequest {
    pub external_id: Option<String>,
    pub project_id: Option<Uuid>,
    pub project_slug: Option<String>,
    pub milestone_id: Option<Uuid>,
    pub milestone_slug: Option<String>,
    pub task_slug: Option<String>,
}

/// Filters for listing tasks (project slug already resolved)
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub external_id: Option<String>,
    pub project_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// A task returned from a write, flagged with whether the write created it
#[derive(Debug, Clone)]
pub struct TaskWrite {
    pub task: Task,
    pub created: bool,
}

// ============================================================================
// Personas, bugs, events, context
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePersonaRequest {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub maximum_active_tasks: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaAssignment {
    pub persona_key: String,
    pub limit_per_agent: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceProjectPersonasRequest {
    pub personas: Vec<PersonaAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBugRequest {
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBugRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub severity: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub task_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub category: Option<String>,
    pub summary: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContextSnapshotRequest {
    pub repo_id: String,
    pub branch: Option<String>,
    pub workflow_id: Option<String>,
    pub snapshot_path: String,
    pub summary_path: String,
    pub files_ndjson_path: Option<String>,
    pub totals_files: i64,
    pub totals_bytes: i64,
    pub totals_lines: i64,
    pub components_json: Option<serde_json::Value>,
    pub hotspots_json: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            milestone_id: Uuid::new_v4(),
            phase_id: None,
            parent_task_id: None,
            external_id: None,
            slug: None,
            title: "Write docs".into(),
            description: Some("first draft".into()),
            owner: None,
            assignee_persona: None,
            persona_required: None,
            acceptance_criteria: None,
            effort_estimate: 4.0,
            effort_spent: 0.0,
            priority_score: 1.0,
            risk_level: RiskLevel::Low,
            severity: TaskSeverity::Minor,
            status: TaskStatus::NotStarted,
            lock_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_changes_absent_vs_null() {
        let changes: TaskChanges = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(changes.description, Some(None));
        assert_eq!(changes.owner, None);

        let mut task = sample_task();
        assert!(changes.apply(&mut task));
        assert_eq!(task.description, None);
        assert_eq!(task.title, "Write docs");
    }

    #[test]
    fn test_changes_apply_reports_no_change_for_equal_values() {
        let changes: TaskChanges =
            serde_json::from_str(r#"{"title": "Write docs", "effort_estimate": 4}"#).unwrap();
        let mut task = sample_task();
        assert!(!changes.apply(&mut task));
    }

    #[test]
    fn test_changes_validate_rejects_null_on_required_fields() {
        let changes: TaskChanges = serde_json::from_str(r#"{"effort_estimate": null}"#).unwrap();
        assert!(matches!(
            changes.validate(),
            Err(TrackerError::Unprocessable(msg)) if msg == "effort_estimate cannot be null"
        ));

        let changes: TaskChanges = serde_json::from_str(r#"{"title": null}"#).unwrap();
        assert!(changes.validate().is_err());

        let changes: TaskChanges = serde_json::from_str(r#"{"effort_spent": -1}"#).unwrap();
        assert!(changes.validate().is_err());
    }

    #[test]
    fn test_update_request_flattens_changes() {
        let req: UpdateTaskRequest = serde_json::from_str(
            r#"{"lock_version": 3, "status": "blocked", "risk_level": "high", "phase_id": null}"#,
        )
        .unwrap();
        assert_eq!(req.lock_version, Some(3));
        assert_eq!(req.status, Some(TaskStatus::Blocked));
        assert_eq!(req.changes.risk_level, Some(Some(RiskLevel::High)));
        assert_eq!(req.changes.phase_id, Some(None));
        assert_eq!(req.slug, None);
    }

    #[test]
    fn test_create_request_initial_status() {
        let req: CreateTaskRequest = serde_json::from_str(
            r#"{"title": "t", "options": {"initial_status": "in_progress"}}"#,
        )
        .unwrap();
        assert_eq!(req.initial_status(), TaskStatus::InProgress);
        assert!(!req.options.create_milestone_if_missing);

        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "t", "status": "blocked"}"#).unwrap();
        assert_eq!(req.initial_status(), TaskStatus::Blocked);
    }

    #[test]
    fn test_create_request_validation() {
        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "  ", "milestone_id": null}"#).unwrap();
        assert!(req.validate().is_err());

        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "ok", "effort_estimate": -2}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_batch_item_tolerates_bad_values() {
        let req: BatchStatusRequest = serde_json::from_str(
            r#"{"items": [{"id": "not-a-uuid", "status": "done"}, {"external_id": "E-1"}]}"#,
        )
        .unwrap();
        assert_eq!(req.items.len(), 2);
        assert_eq!(req.items[0].id.as_ref().and_then(|v| v.as_str()), Some("not-a-uuid"));
        assert_eq!(req.items[1].status, None);
    }
}
