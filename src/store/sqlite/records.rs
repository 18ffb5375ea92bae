//! Personas, bugs, the event log and repository context snapshots

use super::projects::{fetch_milestone, fetch_project};
use super::tasks::fetch_task;
use super::{
    decode_dt, decode_json, encode_dt, encode_json, is_unique_violation, now, parse_opt_uuid,
    parse_uuid, SqliteStore,
};
use crate::error::{TrackerError, TrackerResult};
use crate::store::models::*;
use crate::tracker::models::*;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::HashSet;
use uuid::Uuid;

const PERSONA_COLUMNS: &str = "key, name, description, maximum_active_tasks, created_at, updated_at";
const BUG_COLUMNS: &str =
    "id, project_id, task_id, title, description, severity, status, created_at, updated_at";
const EVENT_COLUMNS: &str =
    "id, project_id, milestone_id, task_id, category, summary, details, created_at";
const SNAPSHOT_COLUMNS: &str = "id, repo_id, branch, workflow_id, snapshot_path, summary_path, \
     files_ndjson_path, totals_files, totals_bytes, totals_lines, components_json, hotspots_json, \
     created_at";

fn persona_from_row(row: &SqliteRow) -> TrackerResult<Persona> {
    Ok(Persona {
        key: row.try_get("key")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        maximum_active_tasks: row.try_get("maximum_active_tasks")?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
        updated_at: decode_dt(row.try_get::<&str, _>("updated_at")?)?,
    })
}

fn bug_from_row(row: &SqliteRow) -> TrackerResult<Bug> {
    Ok(Bug {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        project_id: parse_uuid(row.try_get::<&str, _>("project_id")?)?,
        task_id: parse_opt_uuid(row.try_get("task_id")?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        severity: row.try_get("severity")?,
        status: row.try_get("status")?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
        updated_at: decode_dt(row.try_get::<&str, _>("updated_at")?)?,
    })
}

fn event_from_row(row: &SqliteRow) -> TrackerResult<EventLog> {
    Ok(EventLog {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        project_id: parse_uuid(row.try_get::<&str, _>("project_id")?)?,
        milestone_id: parse_opt_uuid(row.try_get("milestone_id")?)?,
        task_id: parse_opt_uuid(row.try_get("task_id")?)?,
        category: row.try_get("category")?,
        summary: row.try_get("summary")?,
        details: row.try_get("details")?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> TrackerResult<ContextSnapshot> {
    Ok(ContextSnapshot {
        id: row.try_get("id")?,
        repo_id: row.try_get("repo_id")?,
        branch: row.try_get("branch")?,
        workflow_id: row.try_get("workflow_id")?,
        snapshot_path: row.try_get("snapshot_path")?,
        summary_path: row.try_get("summary_path")?,
        files_ndjson_path: row.try_get("files_ndjson_path")?,
        totals_files: row.try_get("totals_files")?,
        totals_bytes: row.try_get("totals_bytes")?,
        totals_lines: row.try_get("totals_lines")?,
        components_json: decode_json(row.try_get("components_json")?)?,
        hotspots_json: decode_json(row.try_get("hotspots_json")?)?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
    })
}

async fn ensure_project(conn: &mut SqliteConnection, project_id: Uuid) -> TrackerResult<()> {
    match fetch_project(conn, project_id).await? {
        Some(_) => Ok(()),
        None => Err(TrackerError::BadRequest("Project not found".into())),
    }
}

/// A referenced task must exist and live in `project_id`
async fn ensure_task_in_project(
    conn: &mut SqliteConnection,
    task_id: Uuid,
    project_id: Uuid,
) -> TrackerResult<Task> {
    let task = fetch_task(conn, task_id)
        .await?
        .ok_or_else(|| TrackerError::BadRequest("Task not found".into()))?;
    if task.project_id != project_id {
        return Err(TrackerError::BadRequest(
            "Task does not belong to project".into(),
        ));
    }
    Ok(task)
}

impl SqliteStore {
    // ========================================================================
    // Personas
    // ========================================================================

    pub async fn create_persona(&self, req: &CreatePersonaRequest) -> TrackerResult<Persona> {
        let key = req.key.trim();
        if key.is_empty() || req.name.trim().is_empty() {
            return Err(TrackerError::Unprocessable(
                "persona key and name are required".into(),
            ));
        }
        let now = now();
        let persona = Persona {
            key: key.to_string(),
            name: req.name.trim().to_string(),
            description: req.description.clone(),
            maximum_active_tasks: req.maximum_active_tasks,
            created_at: now,
            updated_at: now,
        };
        let sql = format!("INSERT INTO personas ({PERSONA_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(&persona.key)
            .bind(&persona.name)
            .bind(persona.description.as_deref())
            .bind(persona.maximum_active_tasks)
            .bind(encode_dt(now))
            .bind(encode_dt(now))
            .execute(self.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TrackerError::Conflict(format!("Persona '{}' already exists", persona.key))
                } else {
                    e.into()
                }
            })?;
        Ok(persona)
    }

    pub async fn list_personas(&self) -> TrackerResult<Vec<Persona>> {
        let sql = format!("SELECT {PERSONA_COLUMNS} FROM personas ORDER BY name, key");
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(persona_from_row).collect()
    }

    pub async fn list_project_personas(&self, project_id: Uuid) -> TrackerResult<Vec<ProjectPersona>> {
        let mut conn = self.pool().acquire().await?;
        Self::project_personas(&mut conn, project_id, None).await
    }

    pub async fn get_project_persona(
        &self,
        project_id: Uuid,
        persona_key: &str,
    ) -> TrackerResult<ProjectPersona> {
        let mut conn = self.pool().acquire().await?;
        Self::project_personas(&mut conn, project_id, Some(persona_key))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                TrackerError::NotFound(format!(
                    "Persona '{persona_key}' not assigned to project"
                ))
            })
    }

    async fn project_personas(
        conn: &mut SqliteConnection,
        project_id: Uuid,
        persona_key: Option<&str>,
    ) -> TrackerResult<Vec<ProjectPersona>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT pp.project_id, pp.limit_per_agent, p.key, p.name, p.description, \
             p.maximum_active_tasks, p.created_at, p.updated_at \
             FROM project_personas pp JOIN personas p ON p.key = pp.persona_key \
             WHERE pp.project_id = ",
        );
        query.push_bind(project_id.to_string());
        if let Some(key) = persona_key {
            query.push(" AND pp.persona_key = ").push_bind(key.to_string());
        }
        query.push(" ORDER BY p.name, p.key");

        let rows = query.build().fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| {
                let persona = persona_from_row(row)?;
                Ok(ProjectPersona {
                    project_id: parse_uuid(row.try_get::<&str, _>("project_id")?)?,
                    persona_key: persona.key.clone(),
                    limit_per_agent: row.try_get("limit_per_agent")?,
                    persona,
                })
            })
            .collect()
    }

    /// Replace the project's persona assignments with exactly `assignments`
    pub async fn replace_project_personas(
        &self,
        project_id: Uuid,
        assignments: &[PersonaAssignment],
    ) -> TrackerResult<Vec<ProjectPersona>> {
        let mut tx = self.begin_write().await?;
        if fetch_project(&mut tx, project_id).await?.is_none() {
            return Err(TrackerError::not_found("Project"));
        }

        let mut seen = HashSet::new();
        for item in assignments {
            if !seen.insert(item.persona_key.as_str()) {
                return Err(TrackerError::BadRequest(
                    "Duplicate persona key in payload".into(),
                ));
            }
            let exists: Option<String> =
                sqlx::query_scalar("SELECT key FROM personas WHERE key = ?")
                    .bind(&item.persona_key)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_none() {
                return Err(TrackerError::BadRequest(format!(
                    "Persona '{}' not found",
                    item.persona_key
                )));
            }
        }

        sqlx::query("DELETE FROM project_personas WHERE project_id = ?")
            .bind(project_id.to_string())
            .execute(&mut *tx)
            .await?;
        let now = encode_dt(now());
        for item in assignments {
            sqlx::query(
                "INSERT INTO project_personas \
                 (project_id, persona_key, limit_per_agent, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(project_id.to_string())
            .bind(&item.persona_key)
            .bind(item.limit_per_agent)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        let personas = Self::project_personas(&mut tx, project_id, None).await?;
        tx.commit().await?;
        tracing::info!(%project_id, count = personas.len(), "Replaced project personas");
        Ok(personas)
    }

    // ========================================================================
    // Bugs
    // ========================================================================

    pub async fn list_bugs(
        &self,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
    ) -> TrackerResult<Vec<Bug>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {BUG_COLUMNS} FROM bugs WHERE 1 = 1"));
        if let Some(project_id) = project_id {
            query.push(" AND project_id = ").push_bind(project_id.to_string());
        }
        if let Some(task_id) = task_id {
            query.push(" AND task_id = ").push_bind(task_id.to_string());
        }
        query.push(" ORDER BY created_at DESC, id");
        let rows = query.build().fetch_all(self.pool()).await?;
        rows.iter().map(bug_from_row).collect()
    }

    pub async fn create_bug(&self, req: &CreateBugRequest) -> TrackerResult<Bug> {
        let mut tx = self.begin_write().await?;
        ensure_project(&mut tx, req.project_id).await?;
        if let Some(task_id) = req.task_id {
            ensure_task_in_project(&mut tx, task_id, req.project_id).await?;
        }

        let now = now();
        let bug = Bug {
            id: Uuid::new_v4(),
            project_id: req.project_id,
            task_id: req.task_id,
            title: req.title.clone(),
            description: req.description.clone(),
            severity: req.severity.clone().unwrap_or_else(|| "S3".into()),
            status: req.status.clone().unwrap_or_else(|| "open".into()),
            created_at: now,
            updated_at: now,
        };
        Self::write_bug(&mut tx, &bug, true).await?;
        tx.commit().await?;
        Ok(bug)
    }

    pub async fn update_bug(&self, id: Uuid, req: &UpdateBugRequest) -> TrackerResult<Bug> {
        let mut tx = self.begin_write().await?;
        let sql = format!("SELECT {BUG_COLUMNS} FROM bugs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let mut bug = match row {
            Some(row) => bug_from_row(&row)?,
            None => return Err(TrackerError::not_found("Bug")),
        };

        if let Some(task_id) = req.task_id {
            if let Some(task_id) = task_id {
                ensure_task_in_project(&mut tx, task_id, bug.project_id).await?;
            }
            bug.task_id = task_id;
        }
        if let Some(title) = &req.title {
            bug.title = title.clone();
        }
        if let Some(description) = &req.description {
            bug.description = description.clone();
        }
        if let Some(severity) = &req.severity {
            bug.severity = severity.clone();
        }
        if let Some(status) = &req.status {
            bug.status = status.clone();
        }
        bug.updated_at = now();

        Self::write_bug(&mut tx, &bug, false).await?;
        tx.commit().await?;
        Ok(bug)
    }

    async fn write_bug(conn: &mut SqliteConnection, bug: &Bug, insert: bool) -> TrackerResult<()> {
        let sql = if insert {
            format!("INSERT INTO bugs ({BUG_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")
        } else {
            "UPDATE bugs SET project_id = ?, task_id = ?, title = ?, description = ?, \
             severity = ?, status = ?, created_at = ?, updated_at = ? WHERE id = ?"
                .to_string()
        };
        let mut query = sqlx::query(&sql);
        if insert {
            query = query.bind(bug.id.to_string());
        }
        query = query
            .bind(bug.project_id.to_string())
            .bind(bug.task_id.map(|id| id.to_string()))
            .bind(&bug.title)
            .bind(bug.description.as_deref())
            .bind(&bug.severity)
            .bind(&bug.status)
            .bind(encode_dt(bug.created_at))
            .bind(encode_dt(bug.updated_at));
        if !insert {
            query = query.bind(bug.id.to_string());
        }
        query.execute(&mut *conn).await?;
        Ok(())
    }

    pub async fn delete_bug(&self, id: Uuid) -> TrackerResult<()> {
        let result = sqlx::query("DELETE FROM bugs WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrackerError::not_found("Bug"));
        }
        Ok(())
    }

    // ========================================================================
    // Event log
    // ========================================================================

    pub async fn list_events(&self, filter: &EventFilter) -> TrackerResult<Vec<EventLog>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM event_logs WHERE project_id = "
        ));
        query.push_bind(filter.project_id.to_string());
        if let Some(milestone_id) = filter.milestone_id {
            query.push(" AND milestone_id = ").push_bind(milestone_id.to_string());
        }
        if let Some(task_id) = filter.task_id {
            query.push(" AND task_id = ").push_bind(task_id.to_string());
        }
        query
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit.max(1) as i64);
        let rows = query.build().fetch_all(self.pool()).await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Append an event. A task without a milestone fills in the task's milestone.
    pub async fn create_event(&self, req: &CreateEventRequest) -> TrackerResult<EventLog> {
        let mut tx = self.begin_write().await?;
        ensure_project(&mut tx, req.project_id).await?;

        let milestone = match req.milestone_id {
            Some(milestone_id) => match fetch_milestone(&mut tx, milestone_id).await? {
                Some(m) if m.project_id == req.project_id => Some(m),
                _ => {
                    return Err(TrackerError::BadRequest(
                        "Milestone not found for project".into(),
                    ))
                }
            },
            None => None,
        };
        let task = match req.task_id {
            Some(task_id) => Some(ensure_task_in_project(&mut tx, task_id, req.project_id).await?),
            None => None,
        };

        let milestone_id = match (&task, &milestone) {
            (Some(task), None) => Some(task.milestone_id),
            (Some(task), Some(milestone)) if task.milestone_id != milestone.id => {
                return Err(TrackerError::BadRequest(
                    "Task does not belong to milestone".into(),
                ))
            }
            _ => req.milestone_id,
        };

        let event = EventLog {
            id: Uuid::new_v4(),
            project_id: req.project_id,
            milestone_id,
            task_id: req.task_id,
            category: req
                .category
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "note".into()),
            summary: req.summary.clone(),
            details: req.details.clone(),
            created_at: now(),
        };
        let sql = format!("INSERT INTO event_logs ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(event.id.to_string())
            .bind(event.project_id.to_string())
            .bind(event.milestone_id.map(|id| id.to_string()))
            .bind(event.task_id.map(|id| id.to_string()))
            .bind(&event.category)
            .bind(&event.summary)
            .bind(event.details.as_deref())
            .bind(encode_dt(event.created_at))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(event)
    }

    // ========================================================================
    // Context snapshots
    // ========================================================================

    /// Store a snapshot and point the repository's index at it, atomically
    pub async fn record_snapshot(&self, req: &CreateContextSnapshotRequest) -> TrackerResult<i64> {
        let mut tx = self.begin_write().await?;
        let created_at = encode_dt(now());
        let result = sqlx::query(
            "INSERT INTO context_snapshots (repo_id, branch, workflow_id, snapshot_path, \
             summary_path, files_ndjson_path, totals_files, totals_bytes, totals_lines, \
             components_json, hotspots_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&req.repo_id)
        .bind(req.branch.as_deref())
        .bind(req.workflow_id.as_deref())
        .bind(&req.snapshot_path)
        .bind(&req.summary_path)
        .bind(req.files_ndjson_path.as_deref())
        .bind(req.totals_files)
        .bind(req.totals_bytes)
        .bind(req.totals_lines)
        .bind(encode_json(&req.components_json)?)
        .bind(encode_json(&req.hotspots_json)?)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        let snapshot_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO context_index (repo_id, latest_snapshot_id, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (repo_id) DO UPDATE SET \
             latest_snapshot_id = excluded.latest_snapshot_id, updated_at = excluded.updated_at",
        )
        .bind(&req.repo_id)
        .bind(snapshot_id)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(repo_id = %req.repo_id, snapshot_id, "Recorded context snapshot");
        Ok(snapshot_id)
    }

    /// Newest snapshot for the repository, optionally restricted to a branch
    pub async fn latest_snapshot(
        &self,
        repo_id: &str,
        branch: Option<&str>,
    ) -> TrackerResult<Option<ContextSnapshot>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM context_snapshots WHERE repo_id = "
        ));
        query.push_bind(repo_id.to_string());
        if let Some(branch) = branch {
            query.push(" AND branch = ").push_bind(branch.to_string());
        }
        query.push(" ORDER BY created_at DESC, id DESC LIMIT 1");
        let row = query.build().fetch_optional(self.pool()).await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    pub async fn list_snapshots(
        &self,
        repo_id: &str,
        limit: usize,
    ) -> TrackerResult<Vec<ContextSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM context_snapshots WHERE repo_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(repo_id)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    pub async fn list_context_repos(&self) -> TrackerResult<Vec<String>> {
        let repos = sqlx::query_scalar("SELECT repo_id FROM context_index ORDER BY repo_id")
            .fetch_all(self.pool())
            .await?;
        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TrackerError;
    use crate::test_helpers::{seed_milestone, seed_project, test_store};
    use crate::tracker::models::*;
    use uuid::Uuid;

    fn persona(key: &str, name: &str) -> CreatePersonaRequest {
        CreatePersonaRequest {
            key: key.into(),
            name: name.into(),
            description: None,
            maximum_active_tasks: None,
        }
    }

    fn assignment(key: &str) -> PersonaAssignment {
        PersonaAssignment {
            persona_key: key.into(),
            limit_per_agent: Some(2),
        }
    }

    fn snapshot(repo_id: &str, branch: &str, path: &str) -> CreateContextSnapshotRequest {
        CreateContextSnapshotRequest {
            repo_id: repo_id.into(),
            branch: Some(branch.into()),
            workflow_id: None,
            snapshot_path: path.into(),
            summary_path: format!("{path}.summary"),
            files_ndjson_path: None,
            totals_files: 3,
            totals_bytes: 1024,
            totals_lines: 80,
            components_json: Some(serde_json::json!({"api": 2})),
            hotspots_json: None,
        }
    }

    #[tokio::test]
    async fn test_persona_assignments_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let project = seed_project(&store, "Apollo").await;
        store.create_persona(&persona("dev", "Developer")).await.unwrap();
        store.create_persona(&persona("qa", "Tester")).await.unwrap();

        let duplicate = store.create_persona(&persona("dev", "Again")).await;
        assert!(matches!(duplicate, Err(TrackerError::Conflict(_))));

        let assigned = store
            .replace_project_personas(project.id, &[assignment("dev"), assignment("qa")])
            .await
            .unwrap();
        assert_eq!(assigned.len(), 2);

        let replaced = store
            .replace_project_personas(project.id, &[assignment("qa")])
            .await
            .unwrap();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].persona.name, "Tester");

        let missing = store.get_project_persona(project.id, "dev").await;
        assert!(matches!(missing, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_persona_replacement_validates_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let project = seed_project(&store, "Apollo").await;
        store.create_persona(&persona("dev", "Developer")).await.unwrap();
        store
            .replace_project_personas(project.id, &[assignment("dev")])
            .await
            .unwrap();

        let twice = store
            .replace_project_personas(project.id, &[assignment("dev"), assignment("dev")])
            .await;
        assert!(matches!(twice, Err(TrackerError::BadRequest(_))));

        let unknown = store
            .replace_project_personas(project.id, &[assignment("ghost")])
            .await;
        assert!(matches!(unknown, Err(TrackerError::BadRequest(_))));

        // Rejected payloads leave the previous assignment intact
        let current = store.list_project_personas(project.id).await.unwrap();
        assert_eq!(current.len(), 1);

        let no_project = store
            .replace_project_personas(Uuid::new_v4(), &[assignment("dev")])
            .await;
        assert!(matches!(no_project, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bug_task_must_share_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let milestone = seed_milestone(&store, "Launch").await;
        let other = seed_project(&store, "Gemini").await;
        let task = store
            .create_task(&CreateTaskRequest {
                milestone_id: Some(milestone.id),
                title: "Crash on start".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .task;

        let bug = store
            .create_bug(&CreateBugRequest {
                project_id: milestone.project_id,
                task_id: Some(task.id),
                title: "Segfault".into(),
                description: None,
                severity: None,
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(bug.severity, "S3");
        assert_eq!(bug.status, "open");

        let mismatch = store
            .create_bug(&CreateBugRequest {
                project_id: other.id,
                task_id: Some(task.id),
                title: "Wrong project".into(),
                description: None,
                severity: None,
                status: None,
            })
            .await;
        assert!(matches!(mismatch, Err(TrackerError::BadRequest(_))));

        let closed = store
            .update_bug(
                bug.id,
                &UpdateBugRequest {
                    status: Some("closed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.status, "closed");
        assert_eq!(closed.title, "Segfault");
    }

    #[tokio::test]
    async fn test_event_inherits_task_milestone() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let milestone = seed_milestone(&store, "Launch").await;
        let task = store
            .create_task(&CreateTaskRequest {
                milestone_id: Some(milestone.id),
                title: "Deploy".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .task;

        let event = store
            .create_event(&CreateEventRequest {
                project_id: milestone.project_id,
                milestone_id: None,
                task_id: Some(task.id),
                category: None,
                summary: "Deployed to staging".into(),
                details: None,
            })
            .await
            .unwrap();
        assert_eq!(event.milestone_id, Some(milestone.id));
        assert_eq!(event.category, "note");

        let events = store
            .list_events(&EventFilter {
                project_id: milestone.project_id,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_snapshot_follows_branch() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let first = store
            .record_snapshot(&snapshot("repo-a", "main", "/snap/1"))
            .await
            .unwrap();
        let second = store
            .record_snapshot(&snapshot("repo-a", "feature", "/snap/2"))
            .await
            .unwrap();
        assert!(second > first);

        let latest = store.latest_snapshot("repo-a", None).await.unwrap().unwrap();
        assert_eq!(latest.id, second);
        let main = store
            .latest_snapshot("repo-a", Some("main"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(main.id, first);
        assert_eq!(main.components_json, Some(serde_json::json!({"api": 2})));

        assert!(store.latest_snapshot("repo-b", None).await.unwrap().is_none());
        assert_eq!(store.list_context_repos().await.unwrap(), vec!["repo-a"]);
        assert_eq!(store.list_snapshots("repo-a", 1).await.unwrap().len(), 1);
    }
}
