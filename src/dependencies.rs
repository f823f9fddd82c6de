use crate::error::{Result, TaskflowError};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;

/// Directed "depends-on" edges over the task store.
///
/// An edge `(task, dependency)` means `task` cannot be considered unblocked
/// until `dependency` is completed. Edges are kept acyclic: `add_edges`
/// rejects any edge that would let a task reach itself.
pub struct DependencyGraph<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Ids of the tasks `task_id` depends on, ascending.
    pub async fn dependencies_of(&self, task_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.pool.acquire().await?;
        fetch_dependency_ids(&mut conn, task_id).await
    }

    /// Ids of the tasks that depend on `task_id`, ascending.
    pub async fn dependents_of(&self, task_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.pool.acquire().await?;
        fetch_dependent_ids(&mut conn, task_id).await
    }

    /// Add edges from `task_id` to each of `dependency_ids`.
    ///
    /// All edges are validated before any is written, so a rejected batch
    /// leaves the graph untouched. Edges that already exist are kept as-is.
    ///
    /// # Returns
    ///
    /// - `Ok(ids)` with the task's full dependency set after insertion
    /// - `Err(TaskflowError::TaskNotFound)` if the task or a dependency is missing
    /// - `Err(TaskflowError::CircularDependency)` for a self-edge or an edge that closes a cycle
    pub async fn add_edges(&self, task_id: i64, dependency_ids: &[i64]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        add_edges_in(&mut tx, task_id, dependency_ids).await?;
        let all = fetch_dependency_ids(&mut tx, task_id).await?;
        tx.commit().await?;
        Ok(all)
    }

    /// Check if adding "task_id depends on dependency_id" would create a cycle.
    pub async fn would_create_cycle(&self, task_id: i64, dependency_id: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        would_create_cycle(&mut conn, task_id, dependency_id).await
    }
}

pub(crate) async fn fetch_dependency_ids(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(crate::sql_constants::SELECT_DEPENDENCY_IDS)
        .bind(task_id)
        .fetch_all(conn)
        .await?;
    Ok(ids)
}

pub(crate) async fn fetch_dependent_ids(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(crate::sql_constants::SELECT_DEPENDENT_IDS)
        .bind(task_id)
        .fetch_all(conn)
        .await?;
    Ok(ids)
}

/// Whether `dependency_id` already reaches `task_id` by following
/// dependency edges, in which case the new edge would close a cycle.
///
/// `UNION` (not `UNION ALL`) deduplicates visited ids, so the recursion
/// terminates even if the stored graph is already cyclic.
pub(crate) async fn would_create_cycle(
    conn: &mut SqliteConnection,
    task_id: i64,
    dependency_id: i64,
) -> Result<bool> {
    if task_id == dependency_id {
        return Ok(true);
    }

    let has_cycle: bool = sqlx::query_scalar(
        r#"
        WITH RECURSIVE reachable(id) AS (
            SELECT ?

            UNION

            SELECT d.dependency_id
            FROM task_dependencies d
            JOIN reachable r ON d.task_id = r.id
        )
        SELECT EXISTS(SELECT 1 FROM reachable WHERE id = ?)
        "#,
    )
    .bind(dependency_id)
    .bind(task_id)
    .fetch_one(conn)
    .await?;

    Ok(has_cycle)
}

/// Validate and insert edges inside the caller's transaction.
pub(crate) async fn add_edges_in(
    conn: &mut SqliteConnection,
    task_id: i64,
    dependency_ids: &[i64],
) -> Result<()> {
    crate::store::ensure_live(conn, task_id).await?;

    let unique: BTreeSet<i64> = dependency_ids.iter().copied().collect();

    for &dependency_id in &unique {
        crate::store::ensure_live(conn, dependency_id).await?;
        if would_create_cycle(conn, task_id, dependency_id).await? {
            tracing::debug!(task_id, dependency_id, "Rejected cyclic dependency edge");
            return Err(TaskflowError::CircularDependency {
                task_id,
                dependency_id,
            });
        }
    }

    insert_edges(conn, task_id, &unique).await
}

/// Insert edges without validation. Callers must have checked existence
/// and acyclicity (a freshly created task has no dependents, so it cannot
/// close a cycle).
pub(crate) async fn insert_edges(
    conn: &mut SqliteConnection,
    task_id: i64,
    dependency_ids: &BTreeSet<i64>,
) -> Result<()> {
    let now = Utc::now();
    for &dependency_id in dependency_ids {
        sqlx::query(crate::sql_constants::INSERT_EDGE)
            .bind(task_id)
            .bind(dependency_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Remove every edge touching `task_id` in either direction and return the
/// ids of the tasks that depended on it.
pub(crate) async fn detach_all(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<i64>> {
    let former_dependents = fetch_dependent_ids(conn, task_id).await?;

    sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? OR dependency_id = ?")
        .bind(task_id)
        .bind(task_id)
        .execute(&mut *conn)
        .await?;

    Ok(former_dependents)
}
