use crate::db::models::{NewTask, Task, TaskFilter, TaskStatus};
use crate::error::{Result, TaskflowError};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Durable record of tasks. CRUD plus soft-delete bookkeeping only; status
/// rules live in the engine.
pub struct TaskStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a live task by ID
    pub async fn load(&self, id: i64) -> Result<Task> {
        let mut conn = self.pool.acquire().await?;
        load_live(&mut conn, id)
            .await?
            .ok_or(TaskflowError::TaskNotFound(id))
    }

    /// Get a soft-deleted task by ID
    pub async fn load_trashed(&self, id: i64) -> Result<Task> {
        let mut conn = self.pool.acquire().await?;
        load_trashed(&mut conn, id)
            .await?
            .ok_or(TaskflowError::TaskNotFound(id))
    }

    /// Persist the descriptive attributes of a live task and bump `updated_at`.
    ///
    /// `task.status` is ignored: status only changes through the engine, so a
    /// stale copy cannot roll back a transition the audit trail has recorded.
    pub async fn save(&self, task: &Task) -> Result<Task> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, task_type = ?, description = ?, priority = ?,
                due_date = ?, assigned_to = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(task.title.as_str())
        .bind(task.task_type.as_str())
        .bind(task.description.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.assigned_to)
        .bind(now)
        .bind(task.id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TaskflowError::TaskNotFound(task.id));
        }

        self.load(task.id).await
    }

    /// Point a live task at a new assignee.
    pub async fn assign(&self, id: i64, assignee: i64) -> Result<Task> {
        let result = sqlx::query(
            "UPDATE tasks SET assigned_to = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(assignee)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TaskflowError::TaskNotFound(id));
        }

        self.load(id).await
    }

    /// Live tasks matching every populated field of `filter`, by id.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(crate::sql_constants::SELECT_LIVE_TASKS);

        if let Some(task_type) = filter.task_type {
            builder.push(" AND t.task_type = ").push_bind(task_type.as_str());
        }

        if let Some(status) = filter.status {
            builder.push(" AND t.status = ").push_bind(status.as_str());
        }

        if let Some(assignee) = filter.assigned_to {
            builder.push(" AND t.assigned_to = ").push_bind(assignee);
        }

        if let Some(due_date) = filter.due_date {
            builder.push(" AND t.due_date = ").push_bind(due_date);
        }

        if let Some(priority) = filter.priority {
            builder.push(" AND t.priority = ").push_bind(priority.as_str());
        }

        if let Some(dependency_id) = filter.depends_on {
            builder
                .push(" AND EXISTS (SELECT 1 FROM task_dependencies d WHERE d.task_id = t.id AND d.dependency_id = ")
                .push_bind(dependency_id)
                .push(")");
        }

        builder.push(" ORDER BY t.id ASC");

        let tasks = builder
            .build_query_as::<Task>()
            .fetch_all(self.pool)
            .await?;

        Ok(tasks)
    }
}

pub(crate) async fn load_live(conn: &mut SqliteConnection, id: i64) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(crate::sql_constants::SELECT_LIVE_TASK)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(task)
}

pub(crate) async fn load_trashed(conn: &mut SqliteConnection, id: i64) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(crate::sql_constants::SELECT_TRASHED_TASK)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(task)
}

pub(crate) async fn ensure_live(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    let exists: bool = sqlx::query_scalar(crate::sql_constants::CHECK_LIVE_TASK_EXISTS)
        .bind(id)
        .fetch_one(conn)
        .await?;

    if !exists {
        return Err(TaskflowError::TaskNotFound(id));
    }
    Ok(())
}

pub(crate) async fn insert_in(
    conn: &mut SqliteConnection,
    new_task: &NewTask,
    status: TaskStatus,
) -> Result<i64> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, task_type, description, status, priority, due_date, assigned_to, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new_task.title.trim())
    .bind(new_task.task_type.as_str())
    .bind(new_task.description.as_str())
    .bind(status.as_str())
    .bind(new_task.priority.as_str())
    .bind(new_task.due_date)
    .bind(new_task.assigned_to)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn update_status_in(
    conn: &mut SqliteConnection,
    id: i64,
    status: TaskStatus,
) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    sqlx::query(crate::sql_constants::UPDATE_TASK_STATUS)
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(now)
}

pub(crate) async fn mark_deleted_in(
    conn: &mut SqliteConnection,
    id: i64,
    deleted_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(deleted_at)
        .bind(deleted_at)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn clear_deleted_in(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE tasks SET deleted_at = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn hard_delete_in(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
