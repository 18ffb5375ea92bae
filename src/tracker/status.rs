//! Status aggregation engine
//!
//! Pure roll-ups over committed rows: risk-adjusted remaining effort,
//! completion percentage, per-status counts, per-milestone summaries, ranked
//! next actions and a deterministic narrative summary. Callers load the rows;
//! nothing here touches the store.

use crate::store::models::{Milestone, Project, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Number of next actions suggested when the caller does not say otherwise
pub const DEFAULT_NEXT_ACTION_LIMIT: usize = 3;

/// Effort totals for a set of tasks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct EffortSummary {
    pub total_estimate: f64,
    pub remaining_effort: f64,
    pub percent_complete: f64,
}

impl EffortSummary {
    fn rounded(self) -> Self {
        Self {
            total_estimate: round2(self.total_estimate),
            remaining_effort: round2(self.remaining_effort),
            percent_complete: round2(self.percent_complete),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MilestoneStatusSummary {
    pub milestone_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub effort: EffortSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectStatusReport {
    pub project_id: Uuid,
    #[serde(flatten)]
    pub effort: EffortSummary,
    /// Task count per status, in status declaration order
    pub status_breakdown: BTreeMap<TaskStatus, usize>,
    pub milestones: Vec<MilestoneStatusSummary>,
}

impl ProjectStatusReport {
    /// Copy with every effort figure rounded to two decimals, for display
    pub fn rounded(&self) -> Self {
        Self {
            project_id: self.project_id,
            effort: self.effort.rounded(),
            status_breakdown: self.status_breakdown.clone(),
            milestones: self
                .milestones
                .iter()
                .map(|m| MilestoneStatusSummary {
                    milestone_id: m.milestone_id,
                    name: m.name.clone(),
                    effort: m.effort.rounded(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextActionSuggestion {
    pub task_id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub persona_required: Option<String>,
    pub priority_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectNextActions {
    pub project_id: Uuid,
    pub suggestions: Vec<NextActionSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectStatusSummary {
    pub project_id: Uuid,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Effort
// ============================================================================

/// `max(estimate - spent, 0)` scaled by the task's risk multiplier
pub fn task_remaining(task: &Task) -> f64 {
    let remaining = (task.effort_estimate - task.effort_spent).max(0.0);
    remaining * task.risk_level.multiplier()
}

pub fn summarize_effort<'a, I>(tasks: I) -> EffortSummary
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut total_estimate = 0.0;
    let mut remaining_effort = 0.0;
    for task in tasks {
        total_estimate += task.effort_estimate;
        remaining_effort += task_remaining(task);
    }

    let percent_complete = if total_estimate > 0.0 {
        (100.0 * (1.0 - remaining_effort / total_estimate)).clamp(0.0, 100.0)
    } else {
        0.0
    };

    EffortSummary {
        total_estimate,
        remaining_effort,
        percent_complete,
    }
}

/// Roll up a project from its milestones and the tasks under them.
///
/// Tasks whose milestone is not in `milestones` are ignored.
pub fn compute_project_status(
    project: &Project,
    milestones: &[Milestone],
    tasks: &[Task],
) -> ProjectStatusReport {
    let in_project: Vec<&Task> = tasks
        .iter()
        .filter(|t| milestones.iter().any(|m| m.id == t.milestone_id))
        .collect();

    let mut status_breakdown = BTreeMap::new();
    for task in &in_project {
        *status_breakdown.entry(task.status).or_insert(0) += 1;
    }

    let milestone_summaries = milestones
        .iter()
        .map(|milestone| MilestoneStatusSummary {
            milestone_id: milestone.id,
            name: milestone.name.clone(),
            effort: summarize_effort(
                in_project
                    .iter()
                    .copied()
                    .filter(|t| t.milestone_id == milestone.id),
            ),
        })
        .collect();

    ProjectStatusReport {
        project_id: project.id,
        effort: summarize_effort(in_project.iter().copied()),
        status_breakdown,
        milestones: milestone_summaries,
    }
}

// ============================================================================
// Next actions
// ============================================================================

/// Highest priority first, blocked before unblocked, then oldest, then id.
fn next_action_order(a: &Task, b: &Task) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| {
            (a.status != TaskStatus::Blocked).cmp(&(b.status != TaskStatus::Blocked))
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn next_action_reason(task: &Task) -> String {
    let mut parts = Vec::new();
    if task.priority_score > 0.0 {
        parts.push(format!("Priority score {}", format_general(task.priority_score)));
    }
    match task.status {
        TaskStatus::Blocked => parts.push("Unblock this task".to_string()),
        TaskStatus::NotStarted => parts.push("Ready to start".to_string()),
        _ => {}
    }
    if parts.is_empty() {
        parts.push("Pending task".to_string());
    }
    parts.join("; ")
}

/// Rank open tasks and keep the top `limit`.
pub fn select_next_actions(tasks: &[Task], limit: usize) -> Vec<NextActionSuggestion> {
    let mut open: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Done)
        .collect();
    open.sort_by(|a, b| next_action_order(a, b));

    open.into_iter()
        .take(limit)
        .map(|task| NextActionSuggestion {
            task_id: task.id,
            title: task.title.clone(),
            status: task.status,
            persona_required: task.persona_required.clone(),
            priority_score: task.priority_score,
            reason: next_action_reason(task),
        })
        .collect()
}

// ============================================================================
// Narrative
// ============================================================================

/// Render the status roll-up as one line of prose. Identical inputs and
/// `now` always produce identical output.
pub fn generate_summary(
    project: &Project,
    milestones: &[Milestone],
    tasks: &[Task],
    limit: usize,
    now: DateTime<Utc>,
) -> ProjectStatusSummary {
    let status = compute_project_status(project, milestones, tasks);
    let project_tasks: Vec<Task> = tasks
        .iter()
        .filter(|t| milestones.iter().any(|m| m.id == t.milestone_id))
        .cloned()
        .collect();
    let suggestions = select_next_actions(&project_tasks, limit);

    let mut parts = vec![format!(
        "{}: {:.1}% complete",
        project.name, status.effort.percent_complete
    )];

    if status.effort.total_estimate > 0.0 {
        parts.push(format!(
            "{:.1}h remaining of {:.1}h planned",
            status.effort.remaining_effort, status.effort.total_estimate
        ));
    } else {
        parts.push("No effort estimates yet".to_string());
    }

    if status.status_breakdown.is_empty() {
        parts.push("Tasks: none recorded".to_string());
    } else {
        let breakdown = status
            .status_breakdown
            .iter()
            .map(|(state, count)| format!("{count} {state}"))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("Tasks: {breakdown}"));
    }

    if suggestions.is_empty() {
        parts.push("Next: no pending items".to_string());
    } else {
        let formatted = suggestions
            .iter()
            .map(|s| format!("{} ({})", s.title, s.status))
            .collect::<Vec<_>>()
            .join("; ");
        parts.push(format!("Next: {formatted}"));
    }

    ProjectStatusSummary {
        project_id: project.id,
        summary: parts.join(". "),
        generated_at: now,
    }
}

// ============================================================================
// Number formatting
// ============================================================================

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Shortest "general" rendering with six significant digits:
/// `2.5`, `10`, `0.0001`, `1e+06`.
pub fn format_general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let scientific = format!("{value:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{MilestoneStatus, ProjectStatus, RiskLevel, TaskSeverity};
    use chrono::{Duration, TimeZone};

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 23, 12, 0, 0).unwrap()
    }

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            parent_id: None,
            name: "Atlas".into(),
            goal: None,
            direction: None,
            repository_path: None,
            status: ProjectStatus::InProgress,
            created_at: clock(),
            updated_at: clock(),
        }
    }

    fn milestone(project: &Project, name: &str) -> Milestone {
        Milestone {
            id: Uuid::new_v4(),
            project_id: project.id,
            slug: None,
            name: name.into(),
            description: None,
            start_date: None,
            due_date: None,
            status: MilestoneStatus::NotStarted,
            created_at: clock(),
            updated_at: clock(),
        }
    }

    fn task(milestone: &Milestone, title: &str, estimate: f64, spent: f64) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: milestone.project_id,
            milestone_id: milestone.id,
            phase_id: None,
            parent_task_id: None,
            external_id: None,
            slug: None,
            title: title.into(),
            description: None,
            owner: None,
            assignee_persona: None,
            persona_required: None,
            acceptance_criteria: None,
            effort_estimate: estimate,
            effort_spent: spent,
            priority_score: 0.0,
            risk_level: RiskLevel::Low,
            severity: TaskSeverity::Minor,
            status: TaskStatus::NotStarted,
            lock_version: 1,
            created_at: clock(),
            updated_at: clock(),
        }
    }

    // ========================================================================
    // Effort
    // ========================================================================

    #[test]
    fn test_risk_scaling() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut t = task(&m, "risky", 10.0, 0.0);

        assert_eq!(task_remaining(&t), 10.0);
        t.risk_level = RiskLevel::Medium;
        assert!((task_remaining(&t) - 11.0).abs() < 1e-9);
        t.risk_level = RiskLevel::High;
        assert_eq!(task_remaining(&t), 12.5);
    }

    #[test]
    fn test_overspent_task_has_no_remaining() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut t = task(&m, "over", 5.0, 8.0);
        t.risk_level = RiskLevel::High;
        assert_eq!(task_remaining(&t), 0.0);
    }

    #[test]
    fn test_empty_project_reports_zero() {
        let p = project();
        let report = compute_project_status(&p, &[], &[]);
        assert_eq!(report.effort.total_estimate, 0.0);
        assert_eq!(report.effort.percent_complete, 0.0);
        assert!(report.status_breakdown.is_empty());
        assert!(report.milestones.is_empty());
    }

    #[test]
    fn test_fully_spent_project_is_complete() {
        let p = project();
        let m = milestone(&p, "M1");
        let tasks = vec![task(&m, "a", 3.0, 3.0), task(&m, "b", 2.0, 5.0)];
        let report = compute_project_status(&p, &[m], &tasks);
        assert_eq!(report.effort.remaining_effort, 0.0);
        assert_eq!(report.effort.percent_complete, 100.0);
    }

    #[test]
    fn test_high_risk_can_clamp_percent_to_zero() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut t = task(&m, "a", 10.0, 0.0);
        t.risk_level = RiskLevel::High;
        let report = compute_project_status(&p, &[m], &[t]);
        assert_eq!(report.effort.remaining_effort, 12.5);
        assert_eq!(report.effort.percent_complete, 0.0);
    }

    #[test]
    fn test_milestone_summaries_and_breakdown() {
        let p = project();
        let m1 = milestone(&p, "Alpha");
        let m2 = milestone(&p, "Beta");
        let other = milestone(&project(), "Elsewhere");

        let mut done = task(&m1, "done", 4.0, 4.0);
        done.status = TaskStatus::Done;
        let open = task(&m1, "open", 4.0, 0.0);
        let mut blocked = task(&m2, "blocked", 2.0, 1.0);
        blocked.status = TaskStatus::Blocked;
        let stray = task(&other, "stray", 100.0, 0.0);

        let report = compute_project_status(
            &p,
            &[m1.clone(), m2.clone()],
            &[done, open, blocked, stray],
        );

        assert_eq!(report.effort.total_estimate, 10.0);
        assert_eq!(report.effort.remaining_effort, 5.0);
        assert_eq!(report.effort.percent_complete, 50.0);

        let counts: Vec<_> = report.status_breakdown.iter().collect();
        assert_eq!(
            counts,
            vec![
                (&TaskStatus::NotStarted, &1),
                (&TaskStatus::Blocked, &1),
                (&TaskStatus::Done, &1)
            ]
        );

        assert_eq!(report.milestones.len(), 2);
        assert_eq!(report.milestones[0].name, "Alpha");
        assert_eq!(report.milestones[0].effort.percent_complete, 50.0);
        assert_eq!(report.milestones[1].milestone_id, m2.id);
        assert_eq!(report.milestones[1].effort.remaining_effort, 1.0);
    }

    #[test]
    fn test_rounded_report() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut t = task(&m, "a", 3.0, 0.0);
        t.risk_level = RiskLevel::Medium;
        let u = task(&m, "b", 7.0, 7.0);
        let report = compute_project_status(&p, &[m], &[t, u]).rounded();
        assert_eq!(report.effort.remaining_effort, 3.3);
        assert_eq!(report.effort.percent_complete, 67.0);
    }

    #[test]
    fn test_report_serializes_flat() {
        let p = project();
        let m = milestone(&p, "M1");
        let report = compute_project_status(&p, &[m.clone()], &[task(&m, "a", 1.0, 0.0)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_estimate"], 1.0);
        assert_eq!(json["status_breakdown"]["not_started"], 1);
        assert_eq!(json["milestones"][0]["name"], "M1");
        assert_eq!(json["milestones"][0]["percent_complete"], 0.0);
    }

    // ========================================================================
    // Next actions
    // ========================================================================

    #[test]
    fn test_next_actions_ordering() {
        let p = project();
        let m = milestone(&p, "M1");

        let mut low = task(&m, "low", 1.0, 0.0);
        low.priority_score = 1.0;

        let mut high_open = task(&m, "high open", 1.0, 0.0);
        high_open.priority_score = 5.0;
        high_open.status = TaskStatus::InProgress;

        let mut high_blocked = task(&m, "high blocked", 1.0, 0.0);
        high_blocked.priority_score = 5.0;
        high_blocked.status = TaskStatus::Blocked;
        high_blocked.created_at = clock() + Duration::hours(1);

        let mut finished = task(&m, "finished", 1.0, 1.0);
        finished.priority_score = 99.0;
        finished.status = TaskStatus::Done;

        let suggestions = select_next_actions(&[low, high_open, finished, high_blocked], 3);
        let titles: Vec<_> = suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["high blocked", "high open", "low"]);
        assert_eq!(suggestions[0].reason, "Priority score 5; Unblock this task");
        assert_eq!(suggestions[1].reason, "Priority score 5");
        assert_eq!(suggestions[2].reason, "Priority score 1; Ready to start");
    }

    #[test]
    fn test_next_actions_tiebreak_by_creation() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut later = task(&m, "later", 1.0, 0.0);
        later.created_at = clock() + Duration::minutes(5);
        let earlier = task(&m, "earlier", 1.0, 0.0);

        let suggestions = select_next_actions(&[later, earlier], 1);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "earlier");
    }

    #[test]
    fn test_pending_reason_fallback() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut t = task(&m, "review me", 1.0, 0.0);
        t.status = TaskStatus::InReview;
        let suggestions = select_next_actions(&[t], 3);
        assert_eq!(suggestions[0].reason, "Pending task");
    }

    // ========================================================================
    // Narrative
    // ========================================================================

    #[test]
    fn test_summary_for_empty_project() {
        let p = project();
        let summary = generate_summary(&p, &[], &[], DEFAULT_NEXT_ACTION_LIMIT, clock());
        assert_eq!(
            summary.summary,
            "Atlas: 0.0% complete. No effort estimates yet. Tasks: none recorded. Next: no pending items"
        );
        assert_eq!(summary.generated_at, clock());
    }

    #[test]
    fn test_summary_is_reproducible() {
        let p = project();
        let m = milestone(&p, "M1");
        let mut a = task(&m, "Design API", 8.0, 2.0);
        a.priority_score = 2.5;
        a.risk_level = RiskLevel::Medium;
        let mut b = task(&m, "Ship", 4.0, 4.0);
        b.status = TaskStatus::Done;
        let tasks = vec![a, b];

        let first = generate_summary(&p, &[m.clone()], &tasks, 3, clock());
        let second = generate_summary(&p, &[m], &tasks, 3, clock());
        assert_eq!(first, second);
        assert_eq!(
            first.summary,
            "Atlas: 45.0% complete. 6.6h remaining of 12.0h planned. \
             Tasks: 1 not_started, 1 done. Next: Design API (not_started)"
        );
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(5.0), "5");
        assert_eq!(format_general(2.5), "2.5");
        assert_eq!(format_general(0.1), "0.1");
        assert_eq!(format_general(123456.0), "123456");
        assert_eq!(format_general(1234567.0), "1.23457e+06");
        assert_eq!(format_general(0.00001), "1e-05");
        assert_eq!(format_general(1.0 / 3.0), "0.333333");
    }
}
