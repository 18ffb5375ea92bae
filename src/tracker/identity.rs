//! Identity references and slug rules
//!
//! Entities can be addressed by primary key, by slug within their parent
//! scope, or (tasks only) by a caller-supplied external id within a project.
//! The types here capture which of those a request supplied; the store turns
//! them into concrete rows.

use crate::error::{TrackerError, TrackerResult};
use uuid::Uuid;

/// Derive a slug from a display name: lower-cased, whitespace replaced by `-`.
pub fn slugify(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Case-insensitive slug comparison
pub fn slug_matches(candidate: &str, wanted: &str) -> bool {
    candidate.to_lowercase() == wanted.trim().to_lowercase()
}

/// Display name for a milestone materialized from a slug
pub fn milestone_name_from_slug(slug: &str) -> String {
    slug.trim().replace('-', " ")
}

/// Empty strings are treated as absent identifiers
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// References
// ============================================================================

/// How a request identifies a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRef {
    Id(Uuid),
    /// Name-derived slug; resolved by scanning all projects
    Slug(String),
}

impl ProjectRef {
    /// An explicit id wins over a slug. `None` when neither is supplied.
    pub fn from_parts(id: Option<Uuid>, slug: Option<&str>) -> Option<Self> {
        match (id, non_empty(slug)) {
            (Some(id), _) => Some(ProjectRef::Id(id)),
            (None, Some(slug)) => Some(ProjectRef::Slug(slug.to_string())),
            (None, None) => None,
        }
    }
}

/// How a request identifies a milestone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneRef {
    Id(Uuid),
    Slug { project: ProjectRef, slug: String },
}

impl MilestoneRef {
    /// Requires either a milestone id or a project reference plus a milestone slug.
    pub fn from_parts(
        milestone_id: Option<Uuid>,
        milestone_slug: Option<&str>,
        project: Option<ProjectRef>,
    ) -> TrackerResult<Self> {
        if let Some(id) = milestone_id {
            return Ok(MilestoneRef::Id(id));
        }
        match (non_empty(milestone_slug), project) {
            (Some(slug), Some(project)) => Ok(MilestoneRef::Slug {
                project,
                slug: slug.to_string(),
            }),
            (Some(_), None) => Err(TrackerError::Unprocessable(
                "project_id or project_slug required to resolve milestone_slug".into(),
            )),
            (None, _) => Err(TrackerError::Unprocessable(
                "milestone_id or milestone_slug required".into(),
            )),
        }
    }
}

/// How a request identifies a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    Id(Uuid),
    /// External id, scoped to a project when one is given, global otherwise
    External {
        external_id: String,
        project_id: Option<Uuid>,
    },
}

impl TaskRef {
    /// A primary key wins over an external id. Neither is an Unprocessable error.
    pub fn from_parts(
        id: Option<Uuid>,
        external_id: Option<&str>,
        project_id: Option<Uuid>,
    ) -> TrackerResult<Self> {
        match (id, non_empty(external_id)) {
            (Some(id), _) => Ok(TaskRef::Id(id)),
            (None, Some(external_id)) => Ok(TaskRef::External {
                external_id: external_id.to_string(),
                project_id,
            }),
            (None, None) => Err(TrackerError::Unprocessable(
                "id or external_id required".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Alpha Project"), "alpha-project");
        assert_eq!(slugify("  Beta  "), "beta");
        assert_eq!(slugify("Two  Spaces"), "two--spaces");
        assert_eq!(slugify("already-slugged"), "already-slugged");
    }

    #[test]
    fn test_slug_matches_ignores_case() {
        assert!(slug_matches("Beta-Launch", "beta-launch"));
        assert!(slug_matches("beta", " BETA "));
        assert!(!slug_matches("beta", "beta-2"));
    }

    #[test]
    fn test_milestone_name_from_slug() {
        assert_eq!(milestone_name_from_slug("public-beta"), "public beta");
    }

    #[test]
    fn test_project_ref_prefers_id() {
        let id = Uuid::new_v4();
        assert_eq!(
            ProjectRef::from_parts(Some(id), Some("alpha")),
            Some(ProjectRef::Id(id))
        );
        assert_eq!(
            ProjectRef::from_parts(None, Some("alpha")),
            Some(ProjectRef::Slug("alpha".into()))
        );
        assert_eq!(ProjectRef::from_parts(None, Some("  ")), None);
        assert_eq!(ProjectRef::from_parts(None, None), None);
    }

    #[test]
    fn test_milestone_ref_requires_project_for_slug() {
        let err = MilestoneRef::from_parts(None, Some("beta"), None).unwrap_err();
        assert!(matches!(err, TrackerError::Unprocessable(_)));

        let err = MilestoneRef::from_parts(None, None, Some(ProjectRef::Slug("a".into())))
            .unwrap_err();
        assert!(matches!(err, TrackerError::Unprocessable(_)));

        let resolved =
            MilestoneRef::from_parts(None, Some("beta"), Some(ProjectRef::Slug("a".into())))
                .unwrap();
        assert_eq!(
            resolved,
            MilestoneRef::Slug {
                project: ProjectRef::Slug("a".into()),
                slug: "beta".into()
            }
        );
    }

    #[test]
    fn test_task_ref_missing_identifier() {
        let err = TaskRef::from_parts(None, Some(""), None).unwrap_err();
        assert_eq!(err.to_string(), "id or external_id required");

        let project = Uuid::new_v4();
        assert_eq!(
            TaskRef::from_parts(None, Some("EXT-1"), Some(project)).unwrap(),
            TaskRef::External {
                external_id: "EXT-1".into(),
                project_id: Some(project)
            }
        );
    }
}
