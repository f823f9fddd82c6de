use crate::error::TaskflowError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Lowercases caller text and folds spaces/dashes to underscores so that
/// "In Progress", "in-progress" and "in_progress" all name the same value.
fn normalize_enum_text(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Open,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_enum_text(s).as_str() {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(TaskflowError::InvalidInput(format!(
                "Invalid status: {} (expected open, in_progress, completed or blocked)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = TaskflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Bug,
    Feature,
    Improvement,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Bug => "bug",
            TaskType::Feature => "feature",
            TaskType::Improvement => "improvement",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_enum_text(s).as_str() {
            "bug" => Ok(TaskType::Bug),
            "feature" => Ok(TaskType::Feature),
            "improvement" => Ok(TaskType::Improvement),
            _ => Err(TaskflowError::InvalidInput(format!(
                "Invalid task type: {} (expected bug, feature or improvement)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for TaskType {
    type Error = TaskflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = TaskflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_enum_text(s).as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(TaskflowError::InvalidInput(format!(
                "Invalid priority: {} (expected low, medium or high)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for TaskPriority {
    type Error = TaskflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub task_type: TaskType,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StatusUpdate {
    pub id: i64,
    pub task_id: i64,
    #[sqlx(try_from = "String")]
    pub previous_status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub new_status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Authenticated caller identity, used only for audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Attributes for a task about to be created. Status is never supplied by
/// the caller; it is derived from the dependency set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub description: String,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, task_type: TaskType, priority: TaskPriority) -> Self {
        Self {
            title: title.into(),
            task_type,
            description: String::new(),
            priority,
            due_date: None,
            assigned_to: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_assignee(mut self, assignee: i64) -> Self {
        self.assigned_to = Some(assignee);
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.title.trim().is_empty() {
            return Err(TaskflowError::InvalidInput(
                "Task title must not be empty".to_string(),
            ));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(TaskflowError::InvalidInput(format!(
                "Task title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(TaskflowError::InvalidInput(format!(
                "Task description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }
}

/// Listing filter. Every populated field narrows the result; an empty
/// filter lists all live tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// Only tasks that have this task among their dependencies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<i64>,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_assignee(mut self, assignee: i64) -> Self {
        self.assigned_to = Some(assignee);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn depending_on(mut self, dependency_id: i64) -> Self {
        self.depends_on = Some(dependency_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_parse_accepts_display_forms() {
        assert_eq!(
            "In Progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert_eq!("COMPLETED".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert_eq!(" Blocked ".parse::<TaskStatus>().unwrap(), TaskStatus::Blocked);
    }

    #[test]
    fn test_status_parse_rejects_unknown_value() {
        let err = "done".parse::<TaskStatus>().unwrap_err();
        assert!(matches!(err, TaskflowError::InvalidInput(_)));
        assert!(err.to_string().contains("done"));
    }

    #[test]
    fn test_type_and_priority_parse() {
        assert_eq!("Bug".parse::<TaskType>().unwrap(), TaskType::Bug);
        assert_eq!("improvement".parse::<TaskType>().unwrap(), TaskType::Improvement);
        assert!("epic".parse::<TaskType>().is_err());

        assert_eq!("High".parse::<TaskPriority>().unwrap(), TaskPriority::High);
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_task_serializes_type_field() {
        let now = Utc::now();
        let task = Task {
            id: 1,
            title: "Fix login".to_string(),
            task_type: TaskType::Bug,
            description: String::new(),
            status: TaskStatus::InProgress,
            priority: TaskPriority::High,
            due_date: None,
            assigned_to: Some(2),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "bug");
        assert_eq!(json["status"], "in_progress");
        assert!(json.get("deleted_at").is_none());
    }

    #[test]
    fn test_new_task_validation() {
        let ok = NewTask::new("Write docs", TaskType::Feature, TaskPriority::Low);
        assert!(ok.validate().is_ok());

        let blank = NewTask::new("   ", TaskType::Feature, TaskPriority::Low);
        assert!(matches!(
            blank.validate(),
            Err(TaskflowError::InvalidInput(_))
        ));

        let long_title = NewTask::new("x".repeat(256), TaskType::Bug, TaskPriority::Low);
        assert!(long_title.validate().is_err());

        let long_description = NewTask::new("ok", TaskType::Bug, TaskPriority::Low)
            .with_description("y".repeat(1001));
        assert!(long_description.validate().is_err());
    }

    #[test]
    fn test_filter_equality_keys_cache() {
        let a = TaskFilter::default().with_status(TaskStatus::Open);
        let b = TaskFilter::default().with_status(TaskStatus::Open);
        let c = TaskFilter::default().with_status(TaskStatus::Blocked);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
