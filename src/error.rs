use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskflowError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Circular dependency: task {task_id} cannot depend on task {dependency_id}")]
    CircularDependency { task_id: i64, dependency_id: i64 },

    #[error("Integrity error: task {dependent_id} references missing task {missing_id}")]
    IntegrityError { dependent_id: i64, missing_id: i64 },

    #[error("Concurrency conflict on task {task_id} after {attempts} attempts")]
    ConcurrencyConflict { task_id: i64, attempts: u32 },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl TaskflowError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            TaskflowError::TaskNotFound(_) => "TASK_NOT_FOUND",
            TaskflowError::DatabaseError(_) => "DATABASE_ERROR",
            TaskflowError::InvalidInput(_) => "INVALID_INPUT",
            TaskflowError::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            TaskflowError::IntegrityError { .. } => "INTEGRITY_ERROR",
            TaskflowError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }

    /// True for caller mistakes (missing task, bad input, rejected edge).
    /// These are terminal for the request and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TaskflowError::TaskNotFound(_)
                | TaskflowError::InvalidInput(_)
                | TaskflowError::CircularDependency { .. }
        )
    }

    /// True when the failure came from store contention and the same unit of
    /// work may succeed if rerun.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskflowError::DatabaseError(e) => is_transient(e),
            _ => false,
        }
    }
}

/// SQLite reports contention as SQLITE_BUSY (5) or SQLITE_LOCKED (6); the
/// extended codes (e.g. 517 BUSY_SNAPSHOT) keep the primary code in the low byte.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, TaskflowError>;
