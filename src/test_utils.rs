#[cfg(test)]
pub mod test_helpers {
    use crate::config::EngineConfig;
    use crate::db::{create_pool, run_migrations};
    use chrono::Utc;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    pub struct TestContext {
        pub pool: SqlitePool,
        pub config: EngineConfig,
        pub _temp_dir: TempDir,
    }

    impl TestContext {
        pub async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let db_path = temp_dir.path().join(".taskflow").join("tasks.db");
            let config = EngineConfig::default().with_database_path(db_path.clone());

            let pool = create_pool(&db_path, &config).await.unwrap();
            run_migrations(&pool).await.unwrap();

            Self {
                pool,
                config,
                _temp_dir: temp_dir,
            }
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }
    }

    /// Insert a task row directly, bypassing validation and derivation.
    pub async fn insert_raw_task(pool: &SqlitePool, title: &str, status: &str) -> i64 {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tasks (title, task_type, status, priority, created_at, updated_at) VALUES (?, 'feature', ?, 'medium', ?, ?)",
        )
        .bind(title)
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    /// Insert a raw dependency edge, bypassing cycle checks.
    pub async fn insert_raw_edge(pool: &SqlitePool, task_id: i64, dependency_id: i64) {
        sqlx::query("INSERT INTO task_dependencies (task_id, dependency_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(dependency_id)
            .execute(pool)
            .await
            .unwrap();
    }
}
