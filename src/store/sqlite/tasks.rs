//! Tasks: idempotent creation, natural-key upsert, optimistic-locked updates

use super::projects::{
    ensure_milestone_in_project, fetch_milestone, fetch_phase, find_milestone_by_slug,
    resolve_milestone_ref, resolve_project_ref,
};
use super::{decode_dt, decode_enum, encode_dt, is_unique_violation, now, parse_opt_uuid, parse_uuid};
use super::SqliteStore;
use crate::error::{TrackerError, TrackerResult};
use crate::store::models::*;
use crate::tracker::identity::{MilestoneRef, ProjectRef, TaskRef};
use crate::tracker::models::*;
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, project_id, milestone_id, phase_id, parent_task_id, external_id, \
     slug, title, description, owner, assignee_persona, persona_required, acceptance_criteria, \
     effort_estimate, effort_spent, priority_score, risk_level, severity, status, lock_version, \
     created_at, updated_at";

const ATTACHMENT_COLUMNS: &str = "id, task_id, name, path, size_bytes, created_at";

fn task_from_row(row: &SqliteRow) -> TrackerResult<Task> {
    Ok(Task {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        project_id: parse_uuid(row.try_get::<&str, _>("project_id")?)?,
        milestone_id: parse_uuid(row.try_get::<&str, _>("milestone_id")?)?,
        phase_id: parse_opt_uuid(row.try_get("phase_id")?)?,
        parent_task_id: parse_opt_uuid(row.try_get("parent_task_id")?)?,
        external_id: row.try_get("external_id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        owner: row.try_get("owner")?,
        assignee_persona: row.try_get("assignee_persona")?,
        persona_required: row.try_get("persona_required")?,
        acceptance_criteria: row.try_get("acceptance_criteria")?,
        effort_estimate: row.try_get("effort_estimate")?,
        effort_spent: row.try_get("effort_spent")?,
        priority_score: row.try_get("priority_score")?,
        risk_level: decode_enum(row.try_get::<&str, _>("risk_level")?)?,
        severity: decode_enum(row.try_get::<&str, _>("severity")?)?,
        status: decode_enum(row.try_get::<&str, _>("status")?)?,
        lock_version: row.try_get("lock_version")?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
        updated_at: decode_dt(row.try_get::<&str, _>("updated_at")?)?,
    })
}

fn attachment_from_row(row: &SqliteRow) -> TrackerResult<Attachment> {
    Ok(Attachment {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        task_id: parse_uuid(row.try_get::<&str, _>("task_id")?)?,
        name: row.try_get("name")?,
        path: row.try_get("path")?,
        size_bytes: row.try_get("size_bytes")?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Lookups
// ============================================================================

pub(crate) async fn fetch_task(conn: &mut SqliteConnection, id: Uuid) -> TrackerResult<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(task_from_row).transpose()
}

/// The locking read for idempotent creation: inside a write transaction no
/// other writer can insert the same key until this one finishes.
async fn find_task_by_external(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    external_id: &str,
) -> TrackerResult<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? AND external_id = ?");
    let row = sqlx::query(&sql)
        .bind(project_id.to_string())
        .bind(external_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(task_from_row).transpose()
}

async fn find_task_by_slug(
    conn: &mut SqliteConnection,
    milestone_id: Uuid,
    slug: &str,
) -> TrackerResult<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE milestone_id = ? AND slug = ?");
    let row = sqlx::query(&sql)
        .bind(milestone_id.to_string())
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(task_from_row).transpose()
}

/// Resolve a task reference. An external id without a project is searched
/// across all projects and must match exactly one task.
async fn resolve_task_ref(conn: &mut SqliteConnection, task: &TaskRef) -> TrackerResult<Task> {
    match task {
        TaskRef::Id(id) => fetch_task(conn, *id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Task")),
        TaskRef::External {
            external_id,
            project_id: Some(project_id),
        } => find_task_by_external(conn, *project_id, external_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Task")),
        TaskRef::External {
            external_id,
            project_id: None,
        } => {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE external_id = ? ORDER BY created_at LIMIT 2"
            );
            let rows = sqlx::query(&sql)
                .bind(external_id)
                .fetch_all(&mut *conn)
                .await?;
            match rows.as_slice() {
                [] => Err(TrackerError::not_found("Task")),
                [row] => task_from_row(row),
                _ => Err(TrackerError::Unprocessable(format!(
                    "external_id '{external_id}' matches tasks in several projects; supply project_id"
                ))),
            }
        }
    }
}

async fn ensure_phase_exists(conn: &mut SqliteConnection, phase_id: Uuid) -> TrackerResult<()> {
    match fetch_phase(conn, phase_id).await? {
        Some(_) => Ok(()),
        None => Err(TrackerError::not_found("Phase")),
    }
}

/// The parent must exist in the same project and must not be the task itself
/// or one of its descendants.
async fn ensure_valid_parent(
    conn: &mut SqliteConnection,
    task_id: Option<Uuid>,
    parent_id: Uuid,
    project_id: Uuid,
) -> TrackerResult<()> {
    let parent = fetch_task(conn, parent_id)
        .await?
        .ok_or_else(|| TrackerError::not_found("Parent task"))?;
    if parent.project_id != project_id {
        return Err(TrackerError::Unprocessable(
            "Parent task belongs to a different project".into(),
        ));
    }

    let Some(task_id) = task_id else {
        return Ok(());
    };
    let mut cursor = Some(parent.id);
    while let Some(id) = cursor {
        if id == task_id {
            return Err(TrackerError::Unprocessable(
                "Parent assignment would create a cycle".into(),
            ));
        }
        cursor = fetch_task(conn, id).await?.and_then(|t| t.parent_task_id);
    }
    Ok(())
}

// ============================================================================
// Writes
// ============================================================================

async fn insert_task(conn: &mut SqliteConnection, task: &Task) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO tasks ({TASK_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    sqlx::query(&sql)
        .bind(task.id.to_string())
        .bind(task.project_id.to_string())
        .bind(task.milestone_id.to_string())
        .bind(task.phase_id.map(|id| id.to_string()))
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(task.external_id.as_deref())
        .bind(task.slug.as_deref())
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.owner.as_deref())
        .bind(task.assignee_persona.as_deref())
        .bind(task.persona_required.as_deref())
        .bind(task.acceptance_criteria.as_deref())
        .bind(task.effort_estimate)
        .bind(task.effort_spent)
        .bind(task.priority_score)
        .bind(task.risk_level.as_str())
        .bind(task.severity.as_str())
        .bind(task.status.as_str())
        .bind(task.lock_version)
        .bind(encode_dt(task.created_at))
        .bind(encode_dt(task.updated_at))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Compare-and-swap write: persists `task` only if the stored row still
/// carries `expected_version`. `task.lock_version` must already be bumped.
async fn write_task(
    conn: &mut SqliteConnection,
    task: &Task,
    expected_version: i64,
) -> TrackerResult<()> {
    let result = sqlx::query(
        "UPDATE tasks SET project_id = ?, milestone_id = ?, phase_id = ?, parent_task_id = ?, \
         external_id = ?, slug = ?, title = ?, description = ?, owner = ?, assignee_persona = ?, \
         persona_required = ?, acceptance_criteria = ?, effort_estimate = ?, effort_spent = ?, \
         priority_score = ?, risk_level = ?, severity = ?, status = ?, lock_version = ?, \
         updated_at = ? WHERE id = ? AND lock_version = ?",
    )
    .bind(task.project_id.to_string())
    .bind(task.milestone_id.to_string())
    .bind(task.phase_id.map(|id| id.to_string()))
    .bind(task.parent_task_id.map(|id| id.to_string()))
    .bind(task.external_id.as_deref())
    .bind(task.slug.as_deref())
    .bind(&task.title)
    .bind(task.description.as_deref())
    .bind(task.owner.as_deref())
    .bind(task.assignee_persona.as_deref())
    .bind(task.persona_required.as_deref())
    .bind(task.acceptance_criteria.as_deref())
    .bind(task.effort_estimate)
    .bind(task.effort_spent)
    .bind(task.priority_score)
    .bind(task.risk_level.as_str())
    .bind(task.severity.as_str())
    .bind(task.status.as_str())
    .bind(task.lock_version)
    .bind(encode_dt(task.updated_at))
    .bind(task.id.to_string())
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            TrackerError::Conflict(
                "Task external_id or slug already used in the target scope".into(),
            )
        } else {
            e.into()
        }
    })?;

    if result.rows_affected() == 0 {
        let current = fetch_task(conn, task.id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Task"))?;
        return Err(TrackerError::VersionConflict {
            current: Box::new(current),
        });
    }
    Ok(())
}

/// Reject a stale caller token without touching the row.
fn check_version(current: &Task, expected: Option<i64>) -> TrackerResult<()> {
    match expected {
        Some(expected) if expected != current.lock_version => Err(TrackerError::VersionConflict {
            current: Box::new(current.clone()),
        }),
        _ => Ok(()),
    }
}

/// Persist a mutated copy of `current`, bumping its version by exactly one.
async fn commit_mutation(
    conn: &mut SqliteConnection,
    current: &Task,
    mut updated: Task,
) -> TrackerResult<Task> {
    updated.lock_version = current.lock_version + 1;
    updated.updated_at = now();
    write_task(conn, &updated, current.lock_version).await?;
    Ok(updated)
}

/// Carry every descendant of `parent` into its milestone. Subtask phases
/// belonged to the old milestone and are cleared.
async fn move_subtasks(conn: &mut SqliteConnection, parent: &Task) -> TrackerResult<u64> {
    let result = sqlx::query(
        "WITH RECURSIVE subtree(id) AS ( \
             SELECT id FROM tasks WHERE parent_task_id = ? \
             UNION SELECT t.id FROM tasks t JOIN subtree s ON t.parent_task_id = s.id \
         ) \
         UPDATE tasks SET project_id = ?, milestone_id = ?, phase_id = NULL, \
             lock_version = lock_version + 1, updated_at = ? \
         WHERE id IN (SELECT id FROM subtree)",
    )
    .bind(parent.id.to_string())
    .bind(parent.project_id.to_string())
    .bind(parent.milestone_id.to_string())
    .bind(encode_dt(parent.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            TrackerError::Conflict(
                "A subtask collides with an existing task in the target project".into(),
            )
        } else {
            e.into()
        }
    })?;
    Ok(result.rows_affected())
}

async fn set_status(
    conn: &mut SqliteConnection,
    task: &TaskRef,
    status: TaskStatus,
    lock_version: Option<i64>,
) -> TrackerResult<Task> {
    let current = resolve_task_ref(conn, task).await?;
    check_version(&current, lock_version)?;
    let mut updated = current.clone();
    updated.status = status;
    commit_mutation(conn, &current, updated).await
}

/// Validate and apply one batch entry inside its own savepoint.
async fn apply_batch_item(
    conn: &mut SqliteConnection,
    item: &BatchStatusItem,
) -> TrackerResult<Task> {
    let task = item.task_ref()?;
    let status = item.status()?;
    let lock_version = item.lock_version()?;
    set_status(conn, &task, status, lock_version).await
}

/// Build a new task row from an upsert payload that matched nothing.
fn task_from_upsert(
    req: &UpsertTaskRequest,
    milestone: &Milestone,
    external_id: Option<&str>,
) -> TrackerResult<Task> {
    let title = match &req.changes.title {
        Some(Some(title)) => title.clone(),
        _ => {
            return Err(TrackerError::Unprocessable(
                "title required to create a task".into(),
            ))
        }
    };
    let c = &req.changes;
    let now = now();
    Ok(Task {
        id: Uuid::new_v4(),
        project_id: milestone.project_id,
        milestone_id: milestone.id,
        phase_id: c.phase_id.flatten(),
        parent_task_id: c.parent_task_id.flatten(),
        external_id: external_id.map(String::from),
        slug: non_empty(req.slug.as_deref()).map(String::from),
        title,
        description: c.description.clone().flatten(),
        owner: c.owner.clone().flatten(),
        assignee_persona: c.assignee_persona.clone().flatten(),
        persona_required: c.persona_required.clone().flatten(),
        acceptance_criteria: c.acceptance_criteria.clone().flatten(),
        effort_estimate: c.effort_estimate.flatten().unwrap_or(0.0),
        effort_spent: c.effort_spent.flatten().unwrap_or(0.0),
        priority_score: c.priority_score.flatten().unwrap_or(0.0),
        risk_level: c.risk_level.flatten().unwrap_or_default(),
        severity: c.severity.flatten().unwrap_or_default(),
        status: req.options.initial_status.unwrap_or_default(),
        lock_version: 1,
        created_at: now,
        updated_at: now,
    })
}

impl SqliteStore {
    /// After losing an insert race, return the winner's row if the natural
    /// key now resolves, otherwise surface a conflict. A slug match only
    /// counts when the winner carries the same external id.
    async fn recover_lost_insert(&self, attempted: &Task) -> TrackerResult<TaskWrite> {
        let mut conn = self.pool().acquire().await?;
        let mut winner = match attempted.external_id.as_deref() {
            Some(external_id) => {
                find_task_by_external(&mut conn, attempted.project_id, external_id).await?
            }
            None => None,
        };
        if winner.is_none() {
            if let Some(slug) = attempted.slug.as_deref() {
                winner = find_task_by_slug(&mut conn, attempted.milestone_id, slug)
                    .await?
                    .filter(|task| task.external_id == attempted.external_id);
            }
        }
        match winner {
            Some(task) => {
                tracing::warn!(
                    task_id = %task.id,
                    external_id = ?task.external_id,
                    "Lost task insert race, returning existing row"
                );
                Ok(TaskWrite {
                    task,
                    created: false,
                })
            }
            None => Err(TrackerError::Conflict("Conflict creating task".into())),
        }
    }

    /// Create a task, or return the existing one if `(project, external_id)`
    /// is already taken. Milestone auto-creation commits with the task.
    pub async fn create_task(&self, req: &CreateTaskRequest) -> TrackerResult<TaskWrite> {
        req.validate()?;
        let project_ref = ProjectRef::from_parts(req.project_id, req.project_slug.as_deref());
        let milestone_ref = MilestoneRef::from_parts(
            req.milestone_id,
            req.milestone_slug.as_deref(),
            project_ref.clone(),
        )?;

        let mut tx = self.begin_write().await?;
        let (milestone, milestone_created) = resolve_milestone_ref(
            &mut tx,
            &milestone_ref,
            req.options.create_milestone_if_missing,
        )
        .await?;
        if let MilestoneRef::Id(_) = milestone_ref {
            ensure_milestone_in_project(&mut tx, &milestone, project_ref.as_ref()).await?;
        }
        let project_id = milestone.project_id;

        let external_id = non_empty(req.external_id.as_deref());
        if let Some(external_id) = external_id {
            if let Some(existing) = find_task_by_external(&mut tx, project_id, external_id).await? {
                tx.rollback().await?;
                tracing::debug!(
                    task_id = %existing.id,
                    external_id,
                    "Idempotent create replay"
                );
                return Ok(TaskWrite {
                    task: existing,
                    created: false,
                });
            }
        }

        if let Some(phase_id) = req.phase_id {
            ensure_phase_exists(&mut tx, phase_id).await?;
        }
        let parent_task_id = match (req.parent_task_id, non_empty(req.parent_task_external_id.as_deref())) {
            (Some(id), _) => Some(id),
            (None, Some(parent_external)) => Some(
                find_task_by_external(&mut tx, project_id, parent_external)
                    .await?
                    .ok_or_else(|| TrackerError::not_found("Parent task"))?
                    .id,
            ),
            (None, None) => None,
        };
        if let Some(parent_id) = parent_task_id {
            ensure_valid_parent(&mut tx, None, parent_id, project_id).await?;
        }

        let now = now();
        let task = Task {
            id: Uuid::new_v4(),
            project_id,
            milestone_id: milestone.id,
            phase_id: req.phase_id,
            parent_task_id,
            external_id: external_id.map(String::from),
            slug: non_empty(req.slug.as_deref()).map(String::from),
            title: req.title.trim().to_string(),
            description: req.description.clone(),
            owner: req.owner.clone(),
            assignee_persona: req.assignee_persona.clone(),
            persona_required: req.persona_required.clone(),
            acceptance_criteria: req.acceptance_criteria.clone(),
            effort_estimate: req.effort_estimate.unwrap_or(0.0),
            effort_spent: req.effort_spent.unwrap_or(0.0),
            priority_score: req.priority_score.unwrap_or(0.0),
            risk_level: req.risk_level.unwrap_or_default(),
            severity: req.severity.unwrap_or_default(),
            status: req.initial_status(),
            lock_version: 1,
            created_at: now,
            updated_at: now,
        };

        match insert_task(&mut tx, &task).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return self.recover_lost_insert(&task).await;
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        tracing::info!(
            task_id = %task.id,
            milestone_id = %milestone.id,
            milestone_created,
            "Created task"
        );
        Ok(TaskWrite {
            task,
            created: true,
        })
    }

    /// Natural-key upsert: external id first, then `(milestone, slug)`, else create.
    pub async fn upsert_task(&self, req: &UpsertTaskRequest) -> TrackerResult<TaskWrite> {
        req.changes.validate()?;
        let project_ref = ProjectRef::from_parts(req.project_id, req.project_slug.as_deref());
        let milestone_ref = MilestoneRef::from_parts(
            req.milestone_id,
            req.milestone_slug.as_deref(),
            project_ref.clone(),
        )?;
        let external_id = non_empty(req.external_id.as_deref());
        let slug = non_empty(req.slug.as_deref());

        let mut tx = self.begin_write().await?;

        let (project_id, milestone) = match &milestone_ref {
            MilestoneRef::Id(id) => {
                let milestone = fetch_milestone(&mut tx, *id)
                    .await?
                    .ok_or_else(|| TrackerError::not_found("Milestone"))?;
                ensure_milestone_in_project(&mut tx, &milestone, project_ref.as_ref()).await?;
                (milestone.project_id, Some(milestone))
            }
            MilestoneRef::Slug { project, slug } => {
                let project = resolve_project_ref(&mut tx, project).await?;
                let milestone = find_milestone_by_slug(&mut tx, project.id, slug).await?;
                (project.id, milestone)
            }
        };

        // 1. external id within the project
        if let Some(external_id) = external_id {
            if let Some(existing) = find_task_by_external(&mut tx, project_id, external_id).await? {
                if milestone.as_ref().map(|m| m.id) != Some(existing.milestone_id) {
                    return Err(TrackerError::Conflict(format!(
                        "Task '{external_id}' belongs to a different milestone"
                    )));
                }
                let mut updated = existing.clone();
                let slug_changed = match slug {
                    Some(slug) if existing.slug.as_deref() != Some(slug) => {
                        updated.slug = Some(slug.to_string());
                        true
                    }
                    _ => false,
                };
                let task =
                    Self::apply_upsert_changes(&mut tx, &existing, updated, req, slug_changed)
                        .await?;
                tx.commit().await?;
                return Ok(TaskWrite {
                    task,
                    created: false,
                });
            }
        }

        let (milestone, _) = match milestone {
            Some(milestone) => (milestone, false),
            None => {
                resolve_milestone_ref(
                    &mut tx,
                    &milestone_ref,
                    req.options.create_milestone_if_missing,
                )
                .await?
            }
        };

        // 2. slug within the milestone
        if let Some(slug) = slug {
            if let Some(existing) = find_task_by_slug(&mut tx, milestone.id, slug).await? {
                let mut updated = existing.clone();
                let mut bound = false;
                if let Some(external_id) = external_id {
                    match existing.external_id.as_deref() {
                        Some(current) if current != external_id => {
                            return Err(TrackerError::Conflict(format!(
                                "Task slug '{slug}' is bound to external_id '{current}'"
                            )));
                        }
                        Some(_) => {}
                        None => {
                            updated.external_id = Some(external_id.to_string());
                            bound = true;
                        }
                    }
                }
                let task =
                    Self::apply_upsert_changes(&mut tx, &existing, updated, req, bound).await?;
                tx.commit().await?;
                return Ok(TaskWrite {
                    task,
                    created: false,
                });
            }
        }

        // 3. create
        let task = task_from_upsert(req, &milestone, external_id)?;
        if let Some(phase_id) = task.phase_id {
            ensure_phase_exists(&mut tx, phase_id).await?;
        }
        if let Some(parent_id) = task.parent_task_id {
            ensure_valid_parent(&mut tx, None, parent_id, task.project_id).await?;
        }

        match insert_task(&mut tx, &task).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return self.recover_lost_insert(&task).await;
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        tracing::info!(task_id = %task.id, milestone_id = %milestone.id, "Created task via upsert");
        Ok(TaskWrite {
            task,
            created: true,
        })
    }

    /// Apply the upsert's field changes on top of `updated`. Writes (and bumps
    /// the version) only when something actually changed.
    async fn apply_upsert_changes(
        conn: &mut SqliteConnection,
        existing: &Task,
        mut updated: Task,
        req: &UpsertTaskRequest,
        already_changed: bool,
    ) -> TrackerResult<Task> {
        if let Some(Some(phase_id)) = req.changes.phase_id {
            ensure_phase_exists(conn, phase_id).await?;
        }
        if let Some(Some(parent_id)) = req.changes.parent_task_id {
            ensure_valid_parent(conn, Some(existing.id), parent_id, existing.project_id).await?;
        }

        let changed = req.changes.apply(&mut updated) || already_changed;
        if !changed {
            return Ok(updated);
        }
        let task = commit_mutation(conn, existing, updated).await?;
        tracing::debug!(task_id = %task.id, lock_version = task.lock_version, "Upsert updated task");
        Ok(task)
    }

    pub async fn get_task(&self, id: Uuid) -> TrackerResult<Option<Task>> {
        let mut conn = self.pool().acquire().await?;
        fetch_task(&mut conn, id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> TrackerResult<Vec<Task>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));
        if let Some(external_id) = &filter.external_id {
            query.push(" AND external_id = ").push_bind(external_id.clone());
        }
        if let Some(project_id) = filter.project_id {
            query.push(" AND project_id = ").push_bind(project_id.to_string());
        }
        if let Some(milestone_id) = filter.milestone_id {
            query.push(" AND milestone_id = ").push_bind(milestone_id.to_string());
        }
        if let Some(created_after) = filter.created_after {
            query.push(" AND created_at > ").push_bind(encode_dt(created_after));
        }
        query
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        let rows = query.build().fetch_all(self.pool()).await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Every task under the project's milestones, oldest first
    pub async fn list_project_tasks(&self, project_id: Uuid) -> TrackerResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE milestone_id IN (SELECT id FROM milestones WHERE project_id = ?) \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(project_id.to_string())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn resolve_task(&self, req: &ResolveTaskRequest) -> TrackerResult<Task> {
        let mut conn = self.pool().acquire().await?;
        let project_ref = ProjectRef::from_parts(req.project_id, req.project_slug.as_deref());

        if let Some(external_id) = non_empty(req.external_id.as_deref()) {
            let project_id = match &project_ref {
                Some(project) => Some(resolve_project_ref(&mut conn, project).await?.id),
                None => None,
            };
            let task = TaskRef::External {
                external_id: external_id.to_string(),
                project_id,
            };
            return resolve_task_ref(&mut conn, &task).await;
        }

        let task_slug = non_empty(req.task_slug.as_deref()).ok_or_else(|| {
            TrackerError::Unprocessable("external_id or task_slug required".into())
        })?;
        let milestone_ref = MilestoneRef::from_parts(
            req.milestone_id,
            req.milestone_slug.as_deref(),
            project_ref,
        )?;
        let (milestone, _) = resolve_milestone_ref(&mut conn, &milestone_ref, false).await?;
        find_task_by_slug(&mut conn, milestone.id, task_slug)
            .await?
            .ok_or_else(|| TrackerError::not_found("Task"))
    }

    /// PATCH semantics: present fields only, optional lock token, version +1.
    pub async fn update_task(&self, id: Uuid, req: &UpdateTaskRequest) -> TrackerResult<Task> {
        req.changes.validate()?;
        let mut tx = self.begin_write().await?;
        let current = fetch_task(&mut tx, id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Task"))?;
        check_version(&current, req.lock_version)?;

        let mut updated = current.clone();
        if let Some(milestone_id) = req.milestone_id {
            if milestone_id != current.milestone_id {
                let milestone = fetch_milestone(&mut tx, milestone_id)
                    .await?
                    .ok_or_else(|| TrackerError::not_found("Milestone"))?;
                updated.milestone_id = milestone.id;
                updated.project_id = milestone.project_id;
            }
        }
        if let Some(slug) = &req.slug {
            updated.slug = slug.clone();
        }
        if let Some(status) = req.status {
            updated.status = status;
        }
        req.changes.apply(&mut updated);

        if updated.phase_id != current.phase_id {
            if let Some(phase_id) = updated.phase_id {
                ensure_phase_exists(&mut tx, phase_id).await?;
            }
        }
        let parent_or_project_moved = updated.parent_task_id != current.parent_task_id
            || updated.project_id != current.project_id;
        if let (Some(parent_id), true) = (updated.parent_task_id, parent_or_project_moved) {
            ensure_valid_parent(&mut tx, Some(id), parent_id, updated.project_id).await?;
        }

        let task = commit_mutation(&mut tx, &current, updated).await?;
        if task.project_id != current.project_id {
            let moved = move_subtasks(&mut tx, &task).await?;
            if moved > 0 {
                tracing::debug!(task_id = %id, moved, "Moved subtasks with their parent");
            }
        }
        tx.commit().await?;
        tracing::debug!(task_id = %id, lock_version = task.lock_version, "Patched task");
        Ok(task)
    }

    /// Status transition guarded by an optional lock token.
    pub async fn update_task_status(
        &self,
        task: &TaskRef,
        status: TaskStatus,
        lock_version: Option<i64>,
    ) -> TrackerResult<Task> {
        let mut tx = self.begin_write().await?;
        let task = set_status(&mut tx, task, status, lock_version).await?;
        tx.commit().await?;
        tracing::debug!(task_id = %task.id, status = %task.status, "Task status updated");
        Ok(task)
    }

    /// Apply each item in its own savepoint; one transaction commits them all.
    pub async fn batch_update_status(
        &self,
        items: &[BatchStatusItem],
    ) -> TrackerResult<Vec<BatchStatusResult>> {
        let mut tx = self.begin_write().await?;
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match apply_batch_item(&mut savepoint, item).await {
                Ok(task) => {
                    savepoint.commit().await?;
                    results.push(BatchStatusResult {
                        ok: true,
                        id: Some(task.id),
                        external_id: task.external_id.clone(),
                        status: 200,
                        lock_version: Some(task.lock_version),
                        task_status: Some(task.status),
                        error: None,
                    });
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    let (lock_version, id) = match &err {
                        TrackerError::VersionConflict { current } => {
                            (Some(current.lock_version), Some(current.id))
                        }
                        _ => (None, item.reported_id()),
                    };
                    tracing::debug!(error = %err, kind = err.kind(), "Batch item rejected");
                    results.push(BatchStatusResult {
                        ok: false,
                        id,
                        external_id: item.reported_external_id(),
                        status: err.status_code(),
                        lock_version,
                        task_status: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(results)
    }

    pub async fn delete_task(&self, id: Uuid) -> TrackerResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrackerError::not_found("Task"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------------

    pub async fn add_attachment(
        &self,
        task_id: Uuid,
        name: &str,
        path: &str,
        size_bytes: i64,
    ) -> TrackerResult<Attachment> {
        let attachment = Attachment {
            id: Uuid::new_v4(),
            task_id,
            name: name.to_string(),
            path: path.to_string(),
            size_bytes,
            created_at: now(),
        };
        let sql = format!("INSERT INTO attachments ({ATTACHMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(attachment.id.to_string())
            .bind(task_id.to_string())
            .bind(&attachment.name)
            .bind(&attachment.path)
            .bind(size_bytes)
            .bind(encode_dt(attachment.created_at))
            .execute(self.pool())
            .await?;
        Ok(attachment)
    }

    pub async fn list_attachments(&self, task_id: Uuid) -> TrackerResult<Vec<Attachment>> {
        let sql = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE task_id = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(task_id.to_string())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(attachment_from_row).collect()
    }
}
