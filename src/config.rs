use crate::error::{Result, TaskflowError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = ".taskflow/tasks.db";

/// Engine configuration parsed from environment variables.
///
/// Optional:
///   TASKFLOW_DB_PATH: SQLite file, defaults to ".taskflow/tasks.db"
///   TASKFLOW_MAX_CONNECTIONS: pool size, defaults to 5
///   TASKFLOW_BUSY_TIMEOUT_MS: SQLite busy timeout, defaults to 5000
///   TASKFLOW_MAX_RETRIES: attempts per unit of work on contention, defaults to 8
///   TASKFLOW_RETRY_BASE_DELAY_MS: first backoff step, defaults to 10
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            max_retries: 8,
            retry_base_delay: Duration::from_millis(10),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_path = std::env::var("TASKFLOW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let max_connections =
            parse_env::<u32>("TASKFLOW_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections);
        if max_connections == 0 {
            return Err(TaskflowError::InvalidInput(
                "TASKFLOW_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }

        let busy_timeout = parse_env::<u64>("TASKFLOW_BUSY_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.busy_timeout);

        let max_retries =
            parse_env::<u32>("TASKFLOW_MAX_RETRIES")?.unwrap_or(defaults.max_retries);

        let retry_base_delay = parse_env::<u64>("TASKFLOW_RETRY_BASE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay);

        Ok(Self {
            database_path,
            max_connections,
            busy_timeout,
            max_retries,
            retry_base_delay,
        })
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            TaskflowError::InvalidInput(format!("{} must be a non-negative integer, got '{}'", name, raw))
        }),
        Err(_) => Ok(None),
    }
}
