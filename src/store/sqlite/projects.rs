//! Projects, milestones and phases

use super::{
    decode_date, decode_dt, decode_enum, encode_date, encode_dt, is_unique_violation, now,
    parse_opt_uuid, parse_uuid, SqliteStore,
};
use crate::error::{TrackerError, TrackerResult};
use crate::store::models::*;
use crate::tracker::identity::{milestone_name_from_slug, slug_matches, slugify};
use crate::tracker::identity::{MilestoneRef, ProjectRef};
use crate::tracker::models::*;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

const PROJECT_COLUMNS: &str =
    "id, parent_id, name, goal, direction, repository_path, status, created_at, updated_at";

const MILESTONE_COLUMNS: &str =
    "id, project_id, slug, name, description, start_date, due_date, status, created_at, updated_at";

const PHASE_COLUMNS: &str = "id, milestone_id, name, description, estimated_effort, \
     remaining_effort, priority_score, status, created_at, updated_at";

fn project_from_row(row: &SqliteRow) -> TrackerResult<Project> {
    Ok(Project {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        parent_id: parse_opt_uuid(row.try_get("parent_id")?)?,
        name: row.try_get("name")?,
        goal: row.try_get("goal")?,
        direction: row.try_get("direction")?,
        repository_path: row.try_get("repository_path")?,
        status: decode_enum(row.try_get::<&str, _>("status")?)?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
        updated_at: decode_dt(row.try_get::<&str, _>("updated_at")?)?,
    })
}

fn milestone_from_row(row: &SqliteRow) -> TrackerResult<Milestone> {
    Ok(Milestone {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        project_id: parse_uuid(row.try_get::<&str, _>("project_id")?)?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        start_date: decode_date(row.try_get("start_date")?)?,
        due_date: decode_date(row.try_get("due_date")?)?,
        status: decode_enum(row.try_get::<&str, _>("status")?)?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
        updated_at: decode_dt(row.try_get::<&str, _>("updated_at")?)?,
    })
}

fn phase_from_row(row: &SqliteRow) -> TrackerResult<Phase> {
    Ok(Phase {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        milestone_id: parse_uuid(row.try_get::<&str, _>("milestone_id")?)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        estimated_effort: row.try_get("estimated_effort")?,
        remaining_effort: row.try_get("remaining_effort")?,
        priority_score: row.try_get("priority_score")?,
        status: decode_enum(row.try_get::<&str, _>("status")?)?,
        created_at: decode_dt(row.try_get::<&str, _>("created_at")?)?,
        updated_at: decode_dt(row.try_get::<&str, _>("updated_at")?)?,
    })
}

// ============================================================================
// Connection-level helpers (usable inside a transaction)
// ============================================================================

pub(crate) async fn fetch_project(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> TrackerResult<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(project_from_row).transpose()
}

/// Resolve a project by id, or by name-derived slug over all projects.
pub(crate) async fn resolve_project_ref(
    conn: &mut SqliteConnection,
    project: &ProjectRef,
) -> TrackerResult<Project> {
    match project {
        ProjectRef::Id(id) => fetch_project(conn, *id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Project")),
        ProjectRef::Slug(slug) => {
            let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id");
            let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
            let mut matches = Vec::new();
            for row in &rows {
                let project = project_from_row(row)?;
                if slug_matches(&slugify(&project.name), slug) {
                    matches.push(project);
                }
            }
            match matches.len() {
                0 => Err(TrackerError::NotFound("Project not found by slug".into())),
                1 => Ok(matches.remove(0)),
                _ => Err(TrackerError::Unprocessable(format!(
                    "project_slug '{slug}' matches several projects; supply project_id"
                ))),
            }
        }
    }
}

pub(crate) async fn fetch_milestone(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> TrackerResult<Option<Milestone>> {
    let sql = format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(milestone_from_row).transpose()
}

/// Find a milestone by stored slug (case-insensitive), falling back to a
/// name-derived slug for rows that have none.
pub(crate) async fn find_milestone_by_slug(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    slug: &str,
) -> TrackerResult<Option<Milestone>> {
    let sql = format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ? AND slug = ?");
    let row = sqlx::query(&sql)
        .bind(project_id.to_string())
        .bind(slug.trim())
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = row {
        return milestone_from_row(&row).map(Some);
    }

    let sql = format!(
        "SELECT {MILESTONE_COLUMNS} FROM milestones \
         WHERE project_id = ? AND (slug IS NULL OR slug = '') ORDER BY created_at, id"
    );
    let rows = sqlx::query(&sql)
        .bind(project_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    for row in &rows {
        let milestone = milestone_from_row(row)?;
        if slug_matches(&slugify(&milestone.name), slug) {
            return Ok(Some(milestone));
        }
    }
    Ok(None)
}

async fn insert_milestone(
    conn: &mut SqliteConnection,
    milestone: &Milestone,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO milestones ({MILESTONE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    sqlx::query(&sql)
        .bind(milestone.id.to_string())
        .bind(milestone.project_id.to_string())
        .bind(milestone.slug.as_deref())
        .bind(&milestone.name)
        .bind(milestone.description.as_deref())
        .bind(encode_date(milestone.start_date))
        .bind(encode_date(milestone.due_date))
        .bind(milestone.status.as_str())
        .bind(encode_dt(milestone.created_at))
        .bind(encode_dt(milestone.updated_at))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn new_milestone(project_id: Uuid, name: String, slug: Option<String>) -> Milestone {
    let now = now();
    Milestone {
        id: Uuid::new_v4(),
        project_id,
        slug,
        name,
        description: None,
        start_date: None,
        due_date: None,
        status: MilestoneStatus::default(),
        created_at: now,
        updated_at: now,
    }
}

/// Resolve a milestone reference. With `create_if_missing`, a slug that
/// matches nothing materializes a minimal milestone (caller must hold a
/// write transaction). Returns the milestone and whether it was created.
pub(crate) async fn resolve_milestone_ref(
    conn: &mut SqliteConnection,
    milestone: &MilestoneRef,
    create_if_missing: bool,
) -> TrackerResult<(Milestone, bool)> {
    match milestone {
        MilestoneRef::Id(id) => fetch_milestone(conn, *id)
            .await?
            .map(|m| (m, false))
            .ok_or_else(|| TrackerError::not_found("Milestone")),
        MilestoneRef::Slug { project, slug } => {
            let project = resolve_project_ref(conn, project).await?;
            if let Some(found) = find_milestone_by_slug(conn, project.id, slug).await? {
                return Ok((found, false));
            }
            if !create_if_missing {
                return Err(TrackerError::NotFound("Milestone not found by slug".into()));
            }

            let created = new_milestone(
                project.id,
                milestone_name_from_slug(slug),
                Some(slug.trim().to_string()),
            );
            insert_milestone(conn, &created).await?;
            tracing::info!(
                milestone_id = %created.id,
                project_id = %project.id,
                slug = %slug,
                "Created missing milestone"
            );
            Ok((created, true))
        }
    }
}

/// Reject a milestone that does not sit under the referenced project.
pub(crate) async fn ensure_milestone_in_project(
    conn: &mut SqliteConnection,
    milestone: &Milestone,
    project: Option<&ProjectRef>,
) -> TrackerResult<()> {
    let Some(project) = project else {
        return Ok(());
    };
    let project = resolve_project_ref(conn, project).await?;
    if project.id != milestone.project_id {
        return Err(TrackerError::Unprocessable(
            "Milestone does not belong to the given project".into(),
        ));
    }
    Ok(())
}

pub(crate) async fn fetch_phase(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> TrackerResult<Option<Phase>> {
    let sql = format!("SELECT {PHASE_COLUMNS} FROM phases WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(phase_from_row).transpose()
}

/// Walk up from `start` and fail if `target` is an ancestor (or `start` itself).
async fn ensure_not_ancestor(
    conn: &mut SqliteConnection,
    start: Uuid,
    target: Uuid,
) -> TrackerResult<()> {
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if id == target {
            return Err(TrackerError::BadRequest(
                "Project parent would create a cycle".into(),
            ));
        }
        cursor = fetch_project(conn, id).await?.and_then(|p| p.parent_id);
    }
    Ok(())
}

fn map_milestone_conflict(error: sqlx::Error) -> TrackerError {
    if is_unique_violation(&error) {
        TrackerError::Conflict("Milestone slug already exists in project".into())
    } else {
        error.into()
    }
}

// ============================================================================
// Store operations
// ============================================================================

impl SqliteStore {
    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    pub async fn create_project(&self, req: &CreateProjectRequest) -> TrackerResult<Project> {
        if req.name.trim().is_empty() {
            return Err(TrackerError::Unprocessable("name must not be empty".into()));
        }
        let mut tx = self.begin_write().await?;
        if let Some(parent_id) = req.parent_id {
            if fetch_project(&mut tx, parent_id).await?.is_none() {
                return Err(TrackerError::not_found("Parent project"));
            }
        }

        let now = now();
        let project = Project {
            id: Uuid::new_v4(),
            parent_id: req.parent_id,
            name: req.name.clone(),
            goal: req.goal.clone(),
            direction: req.direction.clone(),
            repository_path: req.repository_path.clone(),
            status: req.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let sql = format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(project.id.to_string())
            .bind(project.parent_id.map(|id| id.to_string()))
            .bind(&project.name)
            .bind(project.goal.as_deref())
            .bind(project.direction.as_deref())
            .bind(project.repository_path.as_deref())
            .bind(project.status.as_str())
            .bind(encode_dt(project.created_at))
            .bind(encode_dt(project.updated_at))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(project_id = %project.id, name = %project.name, "Created project");
        Ok(project)
    }

    pub async fn get_project(&self, id: Uuid) -> TrackerResult<Option<Project>> {
        let mut conn = self.pool().acquire().await?;
        fetch_project(&mut conn, id).await
    }

    pub async fn resolve_project(&self, project: &ProjectRef) -> TrackerResult<Project> {
        let mut conn = self.pool().acquire().await?;
        resolve_project_ref(&mut conn, project).await
    }

    pub async fn list_projects(&self, parent_id: Option<Uuid>) -> TrackerResult<Vec<Project>> {
        let rows = match parent_id {
            Some(parent_id) => {
                let sql = format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE parent_id = ? ORDER BY created_at, id"
                );
                sqlx::query(&sql)
                    .bind(parent_id.to_string())
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id");
                sqlx::query(&sql).fetch_all(self.pool()).await?
            }
        };
        rows.iter().map(project_from_row).collect()
    }

    pub async fn update_project(
        &self,
        id: Uuid,
        req: &UpdateProjectRequest,
    ) -> TrackerResult<Project> {
        let mut tx = self.begin_write().await?;
        let mut project = fetch_project(&mut tx, id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Project"))?;

        if let Some(name) = &req.name {
            if name.trim().is_empty() {
                return Err(TrackerError::Unprocessable("name must not be empty".into()));
            }
            project.name = name.clone();
        }
        if let Some(parent_id) = req.parent_id {
            if let Some(parent_id) = parent_id {
                if fetch_project(&mut tx, parent_id).await?.is_none() {
                    return Err(TrackerError::not_found("Parent project"));
                }
                ensure_not_ancestor(&mut tx, parent_id, id).await?;
            }
            project.parent_id = parent_id;
        }
        if let Some(goal) = &req.goal {
            project.goal = goal.clone();
        }
        if let Some(direction) = &req.direction {
            project.direction = direction.clone();
        }
        if let Some(repository_path) = &req.repository_path {
            project.repository_path = repository_path.clone();
        }
        if let Some(status) = req.status {
            project.status = status;
        }
        project.updated_at = now();

        sqlx::query(
            "UPDATE projects SET parent_id = ?, name = ?, goal = ?, direction = ?, \
             repository_path = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(project.parent_id.map(|id| id.to_string()))
        .bind(&project.name)
        .bind(project.goal.as_deref())
        .bind(project.direction.as_deref())
        .bind(project.repository_path.as_deref())
        .bind(project.status.as_str())
        .bind(encode_dt(project.updated_at))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(project)
    }

    pub async fn delete_project(&self, id: Uuid) -> TrackerResult<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrackerError::not_found("Project"));
        }
        tracing::info!(project_id = %id, "Deleted project");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Milestones
    // ------------------------------------------------------------------------

    pub async fn create_milestone(&self, req: &CreateMilestoneRequest) -> TrackerResult<Milestone> {
        let mut tx = self.begin_write().await?;
        if fetch_project(&mut tx, req.project_id).await?.is_none() {
            return Err(TrackerError::not_found("Project"));
        }

        let mut milestone = new_milestone(
            req.project_id,
            req.name.clone(),
            req.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from),
        );
        milestone.description = req.description.clone();
        milestone.start_date = req.start_date;
        milestone.due_date = req.due_date;
        milestone.status = req.status.unwrap_or_default();

        insert_milestone(&mut tx, &milestone)
            .await
            .map_err(map_milestone_conflict)?;
        tx.commit().await?;
        Ok(milestone)
    }

    pub async fn get_milestone(&self, id: Uuid) -> TrackerResult<Option<Milestone>> {
        let mut conn = self.pool().acquire().await?;
        fetch_milestone(&mut conn, id).await
    }

    pub async fn list_milestones(&self, project_id: Option<Uuid>) -> TrackerResult<Vec<Milestone>> {
        let rows = match project_id {
            Some(project_id) => {
                let sql = format!(
                    "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ? ORDER BY created_at, id"
                );
                sqlx::query(&sql)
                    .bind(project_id.to_string())
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let sql =
                    format!("SELECT {MILESTONE_COLUMNS} FROM milestones ORDER BY created_at, id");
                sqlx::query(&sql).fetch_all(self.pool()).await?
            }
        };
        rows.iter().map(milestone_from_row).collect()
    }

    async fn write_milestone(
        conn: &mut SqliteConnection,
        milestone: &Milestone,
    ) -> TrackerResult<()> {
        sqlx::query(
            "UPDATE milestones SET slug = ?, name = ?, description = ?, start_date = ?, \
             due_date = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(milestone.slug.as_deref())
        .bind(&milestone.name)
        .bind(milestone.description.as_deref())
        .bind(encode_date(milestone.start_date))
        .bind(encode_date(milestone.due_date))
        .bind(milestone.status.as_str())
        .bind(encode_dt(milestone.updated_at))
        .bind(milestone.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(map_milestone_conflict)?;
        Ok(())
    }

    pub async fn update_milestone(
        &self,
        id: Uuid,
        req: &UpdateMilestoneRequest,
    ) -> TrackerResult<Milestone> {
        let mut tx = self.begin_write().await?;
        let mut milestone = fetch_milestone(&mut tx, id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Milestone"))?;

        if let Some(name) = &req.name {
            milestone.name = name.clone();
        }
        if let Some(slug) = &req.slug {
            milestone.slug = slug.clone();
        }
        if let Some(description) = &req.description {
            milestone.description = description.clone();
        }
        if let Some(start_date) = req.start_date {
            milestone.start_date = start_date;
        }
        if let Some(due_date) = req.due_date {
            milestone.due_date = due_date;
        }
        if let Some(status) = req.status {
            milestone.status = status;
        }
        milestone.updated_at = now();

        Self::write_milestone(&mut tx, &milestone).await?;
        tx.commit().await?;
        Ok(milestone)
    }

    pub async fn delete_milestone(&self, id: Uuid) -> TrackerResult<()> {
        let result = sqlx::query("DELETE FROM milestones WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrackerError::not_found("Milestone"));
        }
        Ok(())
    }

    /// Create or update the milestone with `req.slug` under `project_id`.
    /// Returns the milestone and whether it was created.
    pub async fn upsert_milestone(
        &self,
        project_id: Uuid,
        req: &UpsertMilestoneRequest,
    ) -> TrackerResult<(Milestone, bool)> {
        let slug = req
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TrackerError::Unprocessable("slug required".into()))?;

        let mut tx = self.begin_write().await?;
        if fetch_project(&mut tx, project_id).await?.is_none() {
            return Err(TrackerError::not_found("Project"));
        }

        let sql = format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ? AND slug = ?");
        let existing = sqlx::query(&sql)
            .bind(project_id.to_string())
            .bind(slug)
            .fetch_optional(&mut *tx)
            .await?;

        let result = match existing {
            None => {
                let mut milestone = new_milestone(
                    project_id,
                    req.name.clone().unwrap_or_else(|| slug.to_string()),
                    Some(slug.to_string()),
                );
                milestone.start_date = req.start_date.flatten();
                milestone.due_date = req.due_date.flatten();
                insert_milestone(&mut tx, &milestone)
                    .await
                    .map_err(map_milestone_conflict)?;
                (milestone, true)
            }
            Some(row) => {
                let mut milestone = milestone_from_row(&row)?;
                if let Some(name) = &req.name {
                    milestone.name = name.clone();
                }
                if let Some(start_date) = req.start_date {
                    milestone.start_date = start_date;
                }
                if let Some(due_date) = req.due_date {
                    milestone.due_date = due_date;
                }
                milestone.updated_at = now();
                Self::write_milestone(&mut tx, &milestone).await?;
                (milestone, false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    pub async fn create_phase(&self, req: &CreatePhaseRequest) -> TrackerResult<Phase> {
        let mut tx = self.begin_write().await?;
        if fetch_milestone(&mut tx, req.milestone_id).await?.is_none() {
            return Err(TrackerError::not_found("Milestone"));
        }

        let now = now();
        let phase = Phase {
            id: Uuid::new_v4(),
            milestone_id: req.milestone_id,
            name: req.name.clone(),
            description: req.description.clone(),
            estimated_effort: req.estimated_effort.unwrap_or(0.0),
            remaining_effort: req.remaining_effort.unwrap_or(0.0),
            priority_score: req.priority_score.unwrap_or(0.0),
            status: req.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let sql = format!("INSERT INTO phases ({PHASE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
        sqlx::query(&sql)
            .bind(phase.id.to_string())
            .bind(phase.milestone_id.to_string())
            .bind(&phase.name)
            .bind(phase.description.as_deref())
            .bind(phase.estimated_effort)
            .bind(phase.remaining_effort)
            .bind(phase.priority_score)
            .bind(phase.status.as_str())
            .bind(encode_dt(phase.created_at))
            .bind(encode_dt(phase.updated_at))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(phase)
    }

    pub async fn get_phase(&self, id: Uuid) -> TrackerResult<Option<Phase>> {
        let mut conn = self.pool().acquire().await?;
        fetch_phase(&mut conn, id).await
    }

    pub async fn list_phases(&self, milestone_id: Option<Uuid>) -> TrackerResult<Vec<Phase>> {
        let rows = match milestone_id {
            Some(milestone_id) => {
                let sql = format!(
                    "SELECT {PHASE_COLUMNS} FROM phases WHERE milestone_id = ? ORDER BY created_at, id"
                );
                sqlx::query(&sql)
                    .bind(milestone_id.to_string())
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let sql = format!("SELECT {PHASE_COLUMNS} FROM phases ORDER BY created_at, id");
                sqlx::query(&sql).fetch_all(self.pool()).await?
            }
        };
        rows.iter().map(phase_from_row).collect()
    }

    pub async fn delete_phase(&self, id: Uuid) -> TrackerResult<()> {
        let result = sqlx::query("DELETE FROM phases WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrackerError::not_found("Phase"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TrackerError;
    use crate::store::models::*;
    use crate::test_helpers::{
        milestone_request, project_request, seed_milestone, seed_project, test_store,
    };
    use crate::tracker::models::*;
    use uuid::Uuid;

    fn phase_request(milestone: &Milestone, name: &str) -> CreatePhaseRequest {
        CreatePhaseRequest {
            milestone_id: milestone.id,
            name: name.into(),
            description: None,
            estimated_effort: None,
            remaining_effort: None,
            priority_score: None,
            status: None,
        }
    }

    fn task_request(milestone: &Milestone, external_id: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            milestone_id: Some(milestone.id),
            external_id: Some(external_id.into()),
            title: format!("Task {external_id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_project_parent_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let root = seed_project(&store, "Root").await;
        let child = store
            .create_project(&CreateProjectRequest {
                parent_id: Some(root.id),
                ..project_request("Child")
            })
            .await
            .unwrap();
        let grandchild = store
            .create_project(&CreateProjectRequest {
                parent_id: Some(child.id),
                ..project_request("Grandchild")
            })
            .await
            .unwrap();

        let onto_descendant = UpdateProjectRequest {
            parent_id: Some(Some(grandchild.id)),
            ..Default::default()
        };
        let err = store.update_project(root.id, &onto_descendant).await.unwrap_err();
        assert!(matches!(err, TrackerError::BadRequest(_)));

        let onto_self = UpdateProjectRequest {
            parent_id: Some(Some(root.id)),
            ..Default::default()
        };
        let err = store.update_project(root.id, &onto_self).await.unwrap_err();
        assert!(matches!(err, TrackerError::BadRequest(_)));

        let root = store.get_project(root.id).await.unwrap().unwrap();
        assert_eq!(root.parent_id, None);

        // Re-parenting sideways is still allowed
        let other = seed_project(&store, "Other").await;
        let moved = store
            .update_project(
                grandchild.id,
                &UpdateProjectRequest {
                    parent_id: Some(Some(other.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.parent_id, Some(other.id));
    }

    #[tokio::test]
    async fn test_milestone_upsert_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let project = seed_project(&store, "Apollo").await;

        let req = UpsertMilestoneRequest {
            slug: Some("beta".into()),
            ..Default::default()
        };
        let (created, was_created) = store.upsert_milestone(project.id, &req).await.unwrap();
        assert!(was_created);
        assert_eq!(created.slug.as_deref(), Some("beta"));
        assert_eq!(created.name, "beta");

        let req = UpsertMilestoneRequest {
            slug: Some("beta".into()),
            name: Some("Beta release".into()),
            ..Default::default()
        };
        let (updated, was_created) = store.upsert_milestone(project.id, &req).await.unwrap();
        assert!(!was_created);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Beta release");
        assert_eq!(store.list_milestones(Some(project.id)).await.unwrap().len(), 1);

        let err = store
            .upsert_milestone(project.id, &UpsertMilestoneRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Unprocessable(_)));

        let err = store
            .upsert_milestone(Uuid::new_v4(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_phase_delete_detaches_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let milestone = seed_milestone(&store, "Launch").await;
        let phase = store
            .create_phase(&phase_request(&milestone, "Build"))
            .await
            .unwrap();
        let task = store
            .create_task(&CreateTaskRequest {
                phase_id: Some(phase.id),
                ..task_request(&milestone, "T-1")
            })
            .await
            .unwrap()
            .task;
        assert_eq!(task.phase_id, Some(phase.id));

        store.delete_phase(phase.id).await.unwrap();

        let task = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(task.phase_id, None);
        assert!(store.get_phase(phase.id).await.unwrap().is_none());
        let err = store.delete_phase(phase.id).await.unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_milestone_delete_cascades_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let milestone = seed_milestone(&store, "Launch").await;
        let sibling = store
            .create_milestone(&milestone_request(milestone.project_id, "Later"))
            .await
            .unwrap();
        let doomed = store
            .create_task(&task_request(&milestone, "T-1"))
            .await
            .unwrap()
            .task;
        let kept = store
            .create_task(&task_request(&sibling, "T-2"))
            .await
            .unwrap()
            .task;

        store.delete_milestone(milestone.id).await.unwrap();

        assert!(store.get_task(doomed.id).await.unwrap().is_none());
        assert!(store.get_task(kept.id).await.unwrap().is_some());
        assert!(store.get_project(milestone.project_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_project_delete_cascades_everything_below() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let milestone = seed_milestone(&store, "Launch").await;
        let phase = store
            .create_phase(&phase_request(&milestone, "Build"))
            .await
            .unwrap();
        let task = store
            .create_task(&task_request(&milestone, "T-1"))
            .await
            .unwrap()
            .task;

        store.delete_project(milestone.project_id).await.unwrap();

        assert!(store.get_milestone(milestone.id).await.unwrap().is_none());
        assert!(store.get_phase(phase.id).await.unwrap().is_none());
        assert!(store.get_task(task.id).await.unwrap().is_none());
        let err = store.delete_project(milestone.project_id).await.unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }
}
