//! SQLite schema, applied idempotently at start-up

use crate::error::TrackerResult;
use sqlx::SqlitePool;

pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS write_gate (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  generation INTEGER NOT NULL
);

INSERT OR IGNORE INTO write_gate (id, generation) VALUES (1, 0);

CREATE TABLE IF NOT EXISTS projects (
  id TEXT PRIMARY KEY,
  parent_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  goal TEXT,
  direction TEXT,
  repository_path TEXT,
  status TEXT NOT NULL DEFAULT 'planning'
    CHECK (status IN ('planning', 'in_progress', 'on_hold', 'completed', 'archived')),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_projects_parent ON projects (parent_id);

CREATE TABLE IF NOT EXISTS milestones (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  slug TEXT COLLATE NOCASE,
  name TEXT NOT NULL,
  description TEXT,
  start_date TEXT,
  due_date TEXT,
  status TEXT NOT NULL DEFAULT 'not_started'
    CHECK (status IN ('not_started', 'in_progress', 'blocked', 'done')),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_milestones_project_slug ON milestones (project_id, slug);

CREATE TABLE IF NOT EXISTS phases (
  id TEXT PRIMARY KEY,
  milestone_id TEXT NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  description TEXT,
  estimated_effort REAL NOT NULL DEFAULT 0,
  remaining_effort REAL NOT NULL DEFAULT 0,
  priority_score REAL NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'not_started'
    CHECK (status IN ('not_started', 'in_progress', 'blocked', 'done')),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_phases_milestone ON phases (milestone_id);

CREATE TABLE IF NOT EXISTS tasks (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  milestone_id TEXT NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
  phase_id TEXT REFERENCES phases(id) ON DELETE SET NULL,
  parent_task_id TEXT REFERENCES tasks(id) ON DELETE CASCADE,
  external_id TEXT,
  slug TEXT COLLATE NOCASE,
  title TEXT NOT NULL,
  description TEXT,
  owner TEXT,
  assignee_persona TEXT,
  persona_required TEXT,
  acceptance_criteria TEXT,
  effort_estimate REAL NOT NULL DEFAULT 0 CHECK (effort_estimate >= 0),
  effort_spent REAL NOT NULL DEFAULT 0 CHECK (effort_spent >= 0),
  priority_score REAL NOT NULL DEFAULT 0,
  risk_level TEXT NOT NULL DEFAULT 'low' CHECK (risk_level IN ('low', 'medium', 'high')),
  severity TEXT NOT NULL DEFAULT 'minor'
    CHECK (severity IN ('nice_to_have', 'minor', 'major', 'critical')),
  status TEXT NOT NULL DEFAULT 'not_started'
    CHECK (status IN ('not_started', 'in_progress', 'blocked', 'in_review', 'on_hold', 'done')),
  lock_version INTEGER NOT NULL DEFAULT 1 CHECK (lock_version >= 1),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_tasks_project_external ON tasks (project_id, external_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_tasks_milestone_slug ON tasks (milestone_id, slug);
CREATE INDEX IF NOT EXISTS ix_tasks_external ON tasks (external_id);
CREATE INDEX IF NOT EXISTS ix_tasks_parent ON tasks (parent_task_id);

CREATE TABLE IF NOT EXISTS attachments (
  id TEXT PRIMARY KEY,
  task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  path TEXT NOT NULL,
  size_bytes INTEGER NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS personas (
  key TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  description TEXT,
  maximum_active_tasks INTEGER,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_personas (
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  persona_key TEXT NOT NULL REFERENCES personas(key) ON DELETE CASCADE,
  limit_per_agent INTEGER,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY (project_id, persona_key)
);

CREATE TABLE IF NOT EXISTS bugs (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
  title TEXT NOT NULL,
  description TEXT,
  severity TEXT NOT NULL DEFAULT 'S3',
  status TEXT NOT NULL DEFAULT 'open',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS event_logs (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  milestone_id TEXT REFERENCES milestones(id) ON DELETE SET NULL,
  task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
  category TEXT NOT NULL DEFAULT 'note',
  summary TEXT NOT NULL,
  details TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_event_logs_project ON event_logs (project_id, created_at);

CREATE TABLE IF NOT EXISTS context_snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  repo_id TEXT NOT NULL,
  branch TEXT,
  workflow_id TEXT,
  snapshot_path TEXT NOT NULL,
  summary_path TEXT NOT NULL,
  files_ndjson_path TEXT,
  totals_files INTEGER NOT NULL,
  totals_bytes INTEGER NOT NULL,
  totals_lines INTEGER NOT NULL,
  components_json TEXT,
  hotspots_json TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_context_snapshots_repo ON context_snapshots (repo_id, created_at);

CREATE TABLE IF NOT EXISTS context_index (
  repo_id TEXT PRIMARY KEY,
  latest_snapshot_id INTEGER NOT NULL REFERENCES context_snapshots(id),
  updated_at TEXT NOT NULL
)
"#;

/// Execute every statement of [`SQLITE_SCHEMA`]
pub async fn apply_schema(pool: &SqlitePool) -> TrackerResult<()> {
    for statement in SQLITE_SCHEMA.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
