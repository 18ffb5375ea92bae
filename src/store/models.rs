//! Persisted entity types for the tracker store

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a snake_case text enum with `as_str`, `Display`, `FromStr` and `ALL`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? } default $default:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {} '{}', expected one of: {}",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

text_enum! {
    /// Lifecycle of a project
    ProjectStatus {
        Planning => "planning",
        InProgress => "in_progress",
        OnHold => "on_hold",
        Completed => "completed",
        Archived => "archived",
    } default Planning
}

text_enum! {
    /// Lifecycle of a milestone or phase
    MilestoneStatus {
        NotStarted => "not_started",
        InProgress => "in_progress",
        Blocked => "blocked",
        Done => "done",
    } default NotStarted
}

text_enum! {
    /// Lifecycle of a task
    TaskStatus {
        NotStarted => "not_started",
        InProgress => "in_progress",
        Blocked => "blocked",
        InReview => "in_review",
        OnHold => "on_hold",
        Done => "done",
    } default NotStarted
}

text_enum! {
    RiskLevel {
        Low => "low",
        Medium => "medium",
        High => "high",
    } default Low
}

text_enum! {
    TaskSeverity {
        NiceToHave => "nice_to_have",
        Minor => "minor",
        Major => "major",
        Critical => "critical",
    } default Minor
}

impl RiskLevel {
    /// Scale applied to remaining effort to account for delivery risk
    pub fn multiplier(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 1.1,
            RiskLevel::High => 1.25,
        }
    }
}

// ============================================================================
// Hierarchy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub goal: Option<String>,
    pub direction: Option<String>,
    pub repository_path: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub slug: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Milestone {
    /// Stored slug, or one derived from the name for rows created without a slug
    pub fn effective_slug(&self) -> String {
        match &self.slug {
            Some(slug) if !slug.is_empty() => slug.clone(),
            _ => crate::tracker::identity::slugify(&self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub id: Uuid,
    pub milestone_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub estimated_effort: f64,
    pub remaining_effort: f64,
    pub priority_score: f64,
    pub status: MilestoneStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A unit of work. `lock_version` is the optimistic-concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Uuid,
    pub phase_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub assignee_persona: Option<String>,
    pub persona_required: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub effort_estimate: f64,
    pub effort_spent: f64,
    pub priority_score: f64,
    pub risk_level: RiskLevel,
    pub severity: TaskSeverity,
    pub status: TaskStatus,
    pub lock_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Reference data and records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub maximum_active_tasks: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persona assigned to a project, with the persona inlined
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectPersona {
    pub project_id: Uuid,
    pub persona_key: String,
    pub limit_per_agent: Option<i64>,
    pub persona: Persona,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bug {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub severity: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLog {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub category: String,
    pub summary: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Pointer to the analysis artifacts produced for one repository run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnapshot {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextIndex {
    pub repo_id: String,
    pub latest_snapshot_id: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_text_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), *status);
        }
        assert_eq!(TaskStatus::InReview.to_string(), "in_review");
    }

    #[test]
    fn test_unknown_status_lists_choices() {
        let err = "finished".parse::<TaskStatus>().unwrap_err();
        assert!(err.contains("finished"));
        assert!(err.contains("not_started, in_progress"));
    }

    #[test]
    fn test_serde_matches_text_form() {
        let json = serde_json::to_string(&TaskSeverity::NiceToHave).unwrap();
        assert_eq!(json, "\"nice_to_have\"");
        let risk: RiskLevel = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(risk, RiskLevel::Medium);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(TaskStatus::default(), TaskStatus::NotStarted);
        assert_eq!(RiskLevel::default(), RiskLevel::Low);
        assert_eq!(TaskSeverity::default(), TaskSeverity::Minor);
        assert_eq!(ProjectStatus::default(), ProjectStatus::Planning);
    }

    #[test]
    fn test_risk_multiplier() {
        assert_eq!(RiskLevel::Low.multiplier(), 1.0);
        assert_eq!(RiskLevel::Medium.multiplier(), 1.1);
        assert_eq!(RiskLevel::High.multiplier(), 1.25);
    }

    #[test]
    fn test_milestone_effective_slug_falls_back_to_name() {
        let now = Utc::now();
        let mut milestone = Milestone {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            slug: None,
            name: "Beta Launch".into(),
            description: None,
            start_date: None,
            due_date: None,
            status: MilestoneStatus::NotStarted,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(milestone.effective_slug(), "beta-launch");
        milestone.slug = Some("beta".into());
        assert_eq!(milestone.effective_slug(), "beta");
    }
}
