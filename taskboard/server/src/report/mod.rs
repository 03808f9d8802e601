//! Spreadsheet exports of tasks and members.

use crate::task::stats::UserTaskCounts;
use crate::task::{Task, TaskServiceError};
use crate::user::{User, UserServiceError};
use sea_orm::ActiveEnum;

pub mod api;

pub const TASK_REPORT_HEADERS: [&str; 7] = [
    "Task ID",
    "Title",
    "Description",
    "Priority",
    "Status",
    "Due Date",
    "Assigned To",
];

pub const USER_REPORT_HEADERS: [&str; 7] = [
    "User ID",
    "Name",
    "Email",
    "Total Assigned Tasks",
    "Pending Tasks",
    "In Progress Tasks",
    "Completed Tasks",
];

/// Error type for report generation.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Represents a failure while writing a CSV record.
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    /// Represents a failure while flushing the CSV buffer.
    #[error("CSV buffer could not be flushed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tasks(#[from] TaskServiceError),
    #[error(transparent)]
    Users(#[from] UserServiceError),
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ReportError> {
    writer
        .into_inner()
        .map_err(|err| ReportError::Io(err.into_error()))
}

/// Renders one row per task. Assignees are joined by `", "` in a single cell.
pub fn tasks_csv(tasks: &[Task]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TASK_REPORT_HEADERS)?;
    for task in tasks {
        let assignees = task
            .assignees
            .iter()
            .map(User::name)
            .collect::<Vec<_>>()
            .join(", ");
        writer.write_record([
            task.id.to_string(),
            task.title.clone(),
            task.description.clone(),
            task.priority.to_value(),
            task.status.to_value(),
            task.due_date.format("%Y-%m-%d").to_string(),
            assignees,
        ])?;
    }
    finish(writer)
}

/// Renders one row per member with their workload.
pub fn users_csv(members: &[(User, UserTaskCounts)]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(USER_REPORT_HEADERS)?;
    for (user, counts) in members {
        writer.write_record([
            user.id().to_string(),
            user.name().to_string(),
            user.email().to_string(),
            counts.total().to_string(),
            counts.pending_tasks.to_string(),
            counts.in_progress_tasks.to_string(),
            counts.completed_tasks.to_string(),
        ])?;
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::Role;
    use crate::task::{Priority, TaskStatus};
    use chrono::{TimeZone, Utc};

    fn member(id: i32, name: &str) -> User {
        User::new(
            id,
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            Role::Member,
            None,
        )
    }

    #[test]
    fn empty_exports_still_have_a_header_row() {
        let tasks = String::from_utf8(tasks_csv(&[]).unwrap()).unwrap();
        let users = String::from_utf8(users_csv(&[]).unwrap()).unwrap();

        assert_eq!(
            tasks,
            "Task ID,Title,Description,Priority,Status,Due Date,Assigned To\n"
        );
        assert_eq!(
            users,
            "User ID,Name,Email,Total Assigned Tasks,Pending Tasks,In Progress Tasks,Completed Tasks\n"
        );
    }

    #[test]
    fn can_export_tasks_with_quoted_cells() {
        let created_at = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap();
        let task = Task {
            id: 7,
            title: "Ship release".to_string(),
            description: "Tag, build, publish".to_string(),
            priority: Priority::High,
            status: TaskStatus::InProgress,
            due_date: Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap(),
            created_by: 1,
            created_at,
            updated_at: created_at,
            assignees: vec![member(2, "Ada"), member(3, "Grace")],
            todo_checklist: Vec::new(),
            attachments: Vec::new(),
        };

        let csv = String::from_utf8(tasks_csv(&[task]).unwrap()).unwrap();

        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1],
            r#"7,Ship release,"Tag, build, publish",High,In Progress,2025-09-30,"Ada, Grace""#
        );
    }

    #[test]
    fn can_export_member_workload() {
        let counts = UserTaskCounts {
            pending_tasks: 1,
            in_progress_tasks: 2,
            completed_tasks: 3,
        };

        let csv = String::from_utf8(users_csv(&[(member(2, "Ada"), counts)]).unwrap()).unwrap();

        assert_eq!(csv.lines().nth(1), Some("2,Ada,ada@example.com,6,1,2,3"));
    }
}
