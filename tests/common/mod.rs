//! Common utilities for integration tests
//!
//! Shared setup for the library-level tests (a service over a fresh
//! database in a temp dir) and the CLI tests (a `taskflow` command isolated
//! from the caller's environment).

#![allow(dead_code)] // Not every test file uses every helper

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use taskflow::config::EngineConfig;
use taskflow::db::{create_pool, run_migrations};
use taskflow::{NewTask, TaskPriority, TaskService, TaskType};
use tempfile::TempDir;

/// Get the path to the `taskflow` binary
///
/// Prefers `CARGO_BIN_EXE_taskflow` (set by cargo for integration tests,
/// including custom target directories) and falls back to `cargo_bin`.
#[allow(deprecated)]
pub fn taskflow_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_taskflow")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("taskflow"))
}

/// A `taskflow` command pointed at `db_path`, with every TASKFLOW_*
/// variable that could leak in from the environment cleared.
pub fn taskflow_command(db_path: &Path) -> Command {
    let mut cmd = Command::new(taskflow_binary());
    for var in [
        "TASKFLOW_ACTOR",
        "TASKFLOW_MAX_CONNECTIONS",
        "TASKFLOW_BUSY_TIMEOUT_MS",
        "TASKFLOW_MAX_RETRIES",
        "TASKFLOW_RETRY_BASE_DELAY_MS",
        "TASKFLOW_LOG_LEVEL",
        "TASKFLOW_LOG_JSON",
        "TASKFLOW_LOG_VERBOSE",
        "TASKFLOW_LOG_QUIET",
        "TASKFLOW_LOG_FILE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("TASKFLOW_DB_PATH", db_path);
    cmd
}

pub struct TestEnv {
    pub service: TaskService,
    pub config: EngineConfig,
    pub _temp_dir: TempDir,
}

/// A service over a freshly migrated database.
pub async fn setup_service() -> TestEnv {
    setup_service_with(EngineConfig::default()).await
}

pub async fn setup_service_with(config: EngineConfig) -> TestEnv {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("taskflow_test.db");
    let config = config.with_database_path(db_path.clone());

    let pool = create_pool(&db_path, &config)
        .await
        .expect("Failed to create test database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    TestEnv {
        service: TaskService::new(pool, &config),
        config,
        _temp_dir: temp_dir,
    }
}

pub fn feature(title: &str) -> NewTask {
    NewTask::new(title, TaskType::Feature, TaskPriority::Medium)
}
