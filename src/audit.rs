use crate::db::models::{Actor, StatusUpdate, TaskStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Append-only log of status transitions.
///
/// The engine only ever appends; there is no update or delete. Rows are
/// hidden (not removed) while their task is soft-deleted, and physically
/// removed only when the task itself is force-deleted.
pub struct AuditTrail<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditTrail<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one transition record for a live task.
    pub async fn record(
        &self,
        task_id: i64,
        previous_status: TaskStatus,
        new_status: TaskStatus,
        actor: &Actor,
    ) -> Result<StatusUpdate> {
        let mut tx = self.pool.begin().await?;
        crate::store::ensure_live(&mut tx, task_id).await?;
        let update = record_in(&mut tx, task_id, previous_status, new_status, actor).await?;
        tx.commit().await?;
        Ok(update)
    }

    /// Full status history of a live task, oldest first.
    pub async fn history_of(&self, task_id: i64) -> Result<Vec<StatusUpdate>> {
        let mut conn = self.pool.acquire().await?;
        crate::store::ensure_live(&mut conn, task_id).await?;

        let history = sqlx::query_as::<_, StatusUpdate>(crate::sql_constants::SELECT_STATUS_HISTORY)
            .bind(task_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(history)
    }
}

/// Append a record inside the caller's transaction.
pub(crate) async fn record_in(
    conn: &mut SqliteConnection,
    task_id: i64,
    previous_status: TaskStatus,
    new_status: TaskStatus,
    actor: &Actor,
) -> Result<StatusUpdate> {
    let now = Utc::now();

    let result = sqlx::query(crate::sql_constants::INSERT_STATUS_UPDATE)
        .bind(task_id)
        .bind(previous_status.as_str())
        .bind(new_status.as_str())
        .bind(actor.as_str())
        .bind(now)
        .execute(conn)
        .await?;

    Ok(StatusUpdate {
        id: result.last_insert_rowid(),
        task_id,
        previous_status,
        new_status,
        changed_by: Some(actor.as_str().to_string()),
        created_at: now,
    })
}

/// Hide a task's history alongside its soft delete.
pub(crate) async fn hide_for(
    conn: &mut SqliteConnection,
    task_id: i64,
    deleted_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE task_status_updates SET deleted_at = ? WHERE task_id = ? AND deleted_at IS NULL",
    )
    .bind(deleted_at)
    .bind(task_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Make a restored task's history visible again.
pub(crate) async fn unhide_for(conn: &mut SqliteConnection, task_id: i64) -> Result<()> {
    sqlx::query("UPDATE task_status_updates SET deleted_at = NULL WHERE task_id = ?")
        .bind(task_id)
        .execute(conn)
        .await?;
    Ok(())
}
