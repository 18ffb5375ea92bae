//! Query parameter structs for list and lookup endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use uuid::Uuid;

/// Helper to deserialize optional values from query string (which are always strings)
fn deserialize_option_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Clamp an optional limit into `1..=max`, falling back to `default`
pub fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

/// `GET /v1/tasks`
#[derive(Debug, Deserialize, Default)]
pub struct TaskListQuery {
    pub external_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub project_id: Option<Uuid>,
    pub project_slug: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub milestone_id: Option<Uuid>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub created_after: Option<DateTime<Utc>>,
    /// Default 100, max 500
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub offset: Option<usize>,
}

pub const TASK_LIST_DEFAULT_LIMIT: usize = 100;
pub const TASK_LIST_MAX_LIMIT: usize = 500;

/// `GET /v1/tasks/resolve`
#[derive(Debug, Deserialize, Default)]
pub struct ResolveTaskQuery {
    pub external_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub project_id: Option<Uuid>,
    pub project_slug: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub milestone_id: Option<Uuid>,
    pub milestone_slug: Option<String>,
    pub task_slug: Option<String>,
}

/// `?project_id=` scoping for external-id lookups
#[derive(Debug, Deserialize, Default)]
pub struct ProjectScopeQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProjectListQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MilestoneListQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub project_id: Option<Uuid>,
}

/// `GET /v1/projects/{id}/milestones`
#[derive(Debug, Deserialize, Default)]
pub struct MilestoneLookupQuery {
    pub slug: Option<String>,
    pub name: Option<String>,
    /// Default 10
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PhaseListQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub milestone_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BugListQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub project_id: Option<Uuid>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub task_id: Option<Uuid>,
}

/// `GET /v1/events`; `project_id` is required
#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub project_id: Uuid,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub milestone_id: Option<Uuid>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub task_id: Option<Uuid>,
    /// Default 50
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ContextLatestQuery {
    pub repo_id: String,
    pub branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextListQuery {
    pub repo_id: String,
    /// 1..=100, default 20
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::Uri;

    fn parse<T: serde::de::DeserializeOwned>(query: &str) -> Option<T> {
        let uri: Uri = format!("http://localhost/?{query}").parse().unwrap();
        Query::<T>::try_from_uri(&uri).ok().map(|q| q.0)
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 100, 500), 100);
        assert_eq!(clamp_limit(Some(0), 100, 500), 1);
        assert_eq!(clamp_limit(Some(9000), 100, 500), 500);
    }

    #[test]
    fn test_task_list_query_parses_strings() {
        let q: TaskListQuery =
            parse("limit=20&offset=5&created_after=2025-01-01T00:00:00Z&project_id=").unwrap();
        assert_eq!(q.limit, Some(20));
        assert_eq!(q.offset, Some(5));
        assert!(q.created_after.is_some());
        assert_eq!(q.project_id, None);
    }

    #[test]
    fn test_event_query_requires_project() {
        assert!(parse::<EventListQuery>("limit=3").is_none());
    }
}
