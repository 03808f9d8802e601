//! Counting routines behind the dashboards, the task list tabs and the member
//! overview.
//!
//! Everything here is a pure function over an in-memory slice of tasks. An
//! empty slice always produces zeroed counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{Priority, Task, TaskStatus, TodoItem};

/// Number of tasks returned in the "recent tasks" slice of a dashboard.
pub const RECENT_TASKS_LIMIT: usize = 10;

/// Task counts keyed by lifecycle state, plus the overall total.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct TaskDistribution {
    #[serde(rename = "Pending")]
    pub pending: u64,
    #[serde(rename = "InProgress")]
    pub in_progress: u64,
    #[serde(rename = "Completed")]
    pub completed: u64,
    #[serde(rename = "All")]
    pub all: u64,
}

impl TaskDistribution {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
        }
        self.all += 1;
    }

    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().map(|task| task.status).collect()
    }
}

impl FromIterator<TaskStatus> for TaskDistribution {
    fn from_iter<I: IntoIterator<Item = TaskStatus>>(iter: I) -> Self {
        let mut distribution = Self::default();
        for status in iter {
            distribution.record(status);
        }
        distribution
    }
}

/// Task counts keyed by priority.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriorityLevels {
    #[serde(rename = "Low")]
    pub low: u64,
    #[serde(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "High")]
    pub high: u64,
}

impl PriorityLevels {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().map(|task| task.priority).collect()
    }
}

impl FromIterator<Priority> for PriorityLevels {
    fn from_iter<I: IntoIterator<Item = Priority>>(iter: I) -> Self {
        let mut levels = Self::default();
        for priority in iter {
            match priority {
                Priority::Low => levels.low += 1,
                Priority::Medium => levels.medium += 1,
                Priority::High => levels.high += 1,
            }
        }
        levels
    }
}

/// Counters shown on the status tabs of a task list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub all: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
}

impl From<TaskDistribution> for StatusSummary {
    fn from(distribution: TaskDistribution) -> Self {
        Self {
            all: distribution.all,
            pending_tasks: distribution.pending,
            in_progress_tasks: distribution.in_progress,
            completed_tasks: distribution.completed,
        }
    }
}

impl StatusSummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        TaskDistribution::from_tasks(tasks).into()
    }
}

/// Per-assignee workload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserTaskCounts {
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
}

impl UserTaskCounts {
    pub fn total(&self) -> u64 {
        self.pending_tasks + self.in_progress_tasks + self.completed_tasks
    }
}

/// Counts every task once for each of its assignees.
///
/// Users without any assigned task are absent from the map; callers should
/// fall back to `UserTaskCounts::default()`.
pub fn per_user_counts(tasks: &[Task]) -> HashMap<i32, UserTaskCounts> {
    let mut counts: HashMap<i32, UserTaskCounts> = HashMap::new();
    for task in tasks {
        for assignee in &task.assignees {
            let entry = counts.entry(assignee.id()).or_default();
            match task.status {
                TaskStatus::Pending => entry.pending_tasks += 1,
                TaskStatus::InProgress => entry.in_progress_tasks += 1,
                TaskStatus::Completed => entry.completed_tasks += 1,
            }
        }
    }
    counts
}

/// Tasks that are not completed and whose due date has passed.
pub fn overdue_count(tasks: &[Task], now: DateTime<Utc>) -> u64 {
    tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed && task.due_date < now)
        .count() as u64
}

/// Returns at most `limit` tasks, newest first. Ties on creation time are
/// broken by the higher id.
pub fn recent_tasks(tasks: &[Task], limit: usize) -> Vec<&Task> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    sorted.truncate(limit);
    sorted
}

/// Completed and total item counts of a checklist, in one pass.
pub fn checklist_counts(items: &[TodoItem]) -> (usize, usize) {
    items.iter().fold((0, 0), |(completed, total), item| {
        (completed + usize::from(item.completed), total + 1)
    })
}

/// Fraction of completed checklist items, `0.0` for an empty checklist.
pub fn progress(items: &[TodoItem]) -> f64 {
    match checklist_counts(items) {
        (_, 0) => 0.0,
        (completed, total) => completed as f64 / total as f64,
    }
}

/// Status a task takes after its checklist changes.
pub fn status_for_checklist(items: &[TodoItem]) -> TaskStatus {
    match checklist_counts(items) {
        (0, _) => TaskStatus::Pending,
        (completed, total) if completed == total => TaskStatus::Completed,
        _ => TaskStatus::InProgress,
    }
}

/// The chart data of a dashboard.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskCharts {
    pub task_distribution: TaskDistribution,
    pub task_priority_level: PriorityLevels,
}

impl TaskCharts {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self {
            task_distribution: TaskDistribution::from_tasks(tasks),
            task_priority_level: PriorityLevels::from_tasks(tasks),
        }
    }
}

/// Headline numbers of a dashboard.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub total_tasks: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
    pub overdue_tasks: u64,
}

impl DashboardStatistics {
    pub fn new(distribution: TaskDistribution, overdue_tasks: u64) -> Self {
        Self {
            total_tasks: distribution.all,
            pending_tasks: distribution.pending,
            in_progress_tasks: distribution.in_progress,
            completed_tasks: distribution.completed,
            overdue_tasks,
        }
    }
}
