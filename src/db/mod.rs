pub mod models;

use crate::config::EngineConfig;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "0.3.0";

pub async fn create_pool(db_path: &Path, config: &EngineConfig) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(pool)
        .await?;

    // Tasks. Status, type and priority are closed value sets.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            task_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'open',
            priority TEXT NOT NULL DEFAULT 'medium',
            due_date DATE,
            assigned_to INTEGER,
            deleted_at DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (status IN ('open', 'in_progress', 'completed', 'blocked')),
            CHECK (task_type IN ('bug', 'feature', 'improvement')),
            CHECK (priority IN ('low', 'medium', 'high')),
            CHECK (title != '')
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Index for listing filters (soft-deleted rows are always excluded)
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_tasks_live_status
        ON tasks(status, task_type, priority)
        WHERE deleted_at IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to
        ON tasks(assigned_to)
        "#,
    )
    .execute(pool)
    .await?;

    // Dependency edges: task_id depends on dependency_id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            dependency_id INTEGER NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            FOREIGN KEY (dependency_id) REFERENCES tasks(id) ON DELETE CASCADE,
            UNIQUE(task_id, dependency_id),
            CHECK(task_id != dependency_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Both directions are queried: dependencies-of and dependents-of
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_dependencies_task
        ON task_dependencies(task_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_dependencies_dependency
        ON task_dependencies(dependency_id)
        "#,
    )
    .execute(pool)
    .await?;

    // Audit trail. Rows are only ever inserted; deleted_at mirrors the
    // owning task's soft delete.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_status_updates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            previous_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            changed_by TEXT,
            deleted_at DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            CHECK (previous_status IN ('open', 'in_progress', 'completed', 'blocked')),
            CHECK (new_status IN ('open', 'in_progress', 'completed', 'blocked'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_status_updates_task
        ON task_status_updates(task_id, id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO schema_meta (key, value)
        VALUES ('schema_version', ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}
