use crate::audit;
use crate::config::EngineConfig;
use crate::db::models::{Actor, StatusUpdate, Task, TaskStatus};
use crate::dependencies::{fetch_dependency_ids, fetch_dependent_ids};
use crate::error::{Result, TaskflowError};
use crate::locks::TaskLocks;
use crate::retry::{with_retry, RetryPolicy};
use crate::status::derive_status;
use crate::store;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Where a status change came from; recorded in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    Explicit,
    Cascade,
    Rederive,
}

impl TransitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionSource::Explicit => "explicit",
            TransitionSource::Cascade => "cascade",
            TransitionSource::Rederive => "rederive",
        }
    }
}

/// Applies status changes and cascades completions to dependents.
///
/// Every per-task unit of work holds that task's lock from [`TaskLocks`]
/// and runs in its own transaction, so the dependency statuses a derivation
/// reads are the ones its write is based on. At most one task lock is held
/// at any time. A unit that hits store contention is rerun from scratch
/// under the [`RetryPolicy`].
#[derive(Clone)]
pub struct StatusEngine {
    pool: SqlitePool,
    locks: Arc<TaskLocks>,
    retry: RetryPolicy,
}

impl StatusEngine {
    pub fn new(pool: SqlitePool, config: &EngineConfig) -> Self {
        Self {
            pool,
            locks: Arc::new(TaskLocks::new()),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn locks(&self) -> &TaskLocks {
        &self.locks
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Set a task's status explicitly.
    ///
    /// Always appends one audit record for the task, even when the status
    /// does not change. Completing a task cascades to its dependents before
    /// this returns; the returned task reflects the explicit change.
    ///
    /// # Returns
    ///
    /// - `Err(TaskflowError::TaskNotFound)` if the task is absent or soft-deleted
    /// - `Err(TaskflowError::IntegrityError)` if the cascade finds a dangling edge;
    ///   the explicit change and any cascade steps before it stay committed
    pub async fn apply_status(
        &self,
        task_id: i64,
        new_status: TaskStatus,
        actor: &Actor,
    ) -> Result<Task> {
        let (task, update) = {
            let _guard = self.locks.acquire(task_id).await;
            with_retry(self.retry, task_id, move || {
                self.apply_once(task_id, new_status, actor)
            })
            .await?
        };

        crate::log_status_transition!(
            task_id,
            update.previous_status,
            update.new_status,
            TransitionSource::Explicit.as_str()
        );

        if new_status == TaskStatus::Completed {
            self.propagate(task_id, actor).await?;
        }

        Ok(task)
    }

    async fn apply_once(
        &self,
        task_id: i64,
        new_status: TaskStatus,
        actor: &Actor,
    ) -> Result<(Task, StatusUpdate)> {
        let mut tx = self.pool.begin().await?;

        let task = store::load_live(&mut tx, task_id)
            .await?
            .ok_or(TaskflowError::TaskNotFound(task_id))?;
        let previous_status = task.status;

        let updated_at = store::update_status_in(&mut tx, task_id, new_status).await?;
        let update = audit::record_in(&mut tx, task_id, previous_status, new_status, actor).await?;

        tx.commit().await?;

        Ok((
            Task {
                status: new_status,
                updated_at,
                ..task
            },
            update,
        ))
    }

    /// Re-derive every dependent reachable from `task_id` through tasks that
    /// have just become completed.
    ///
    /// Traversal is breadth-first with a visited set, so it terminates even
    /// on a cyclic graph. Dependents whose derived status matches their
    /// current one produce no record. Each dependent is its own transaction:
    /// on failure, the steps already taken stay committed and rerunning
    /// propagation resumes without duplicating records.
    ///
    /// # Returns
    ///
    /// The audit records appended, in the order they were written.
    pub async fn propagate(&self, task_id: i64, actor: &Actor) -> Result<Vec<StatusUpdate>> {
        let mut appended = Vec::new();
        let mut visited: HashSet<i64> = HashSet::from([task_id]);
        let mut queue: VecDeque<(i64, i64)> = self
            .dependents(task_id)
            .await?
            .into_iter()
            .map(|dependent| (task_id, dependent))
            .collect();

        while let Some((upstream, dependent)) = queue.pop_front() {
            if !visited.insert(dependent) {
                continue;
            }

            let changed = self
                .rederive_locked(dependent, Some(upstream), actor, TransitionSource::Cascade)
                .await
                .inspect_err(|e| {
                    if matches!(e, TaskflowError::IntegrityError { .. }) {
                        crate::log_error!(e, "cascade");
                    }
                })?;

            let Some(update) = changed else {
                continue;
            };

            let continues = update.new_status == TaskStatus::Completed;
            appended.push(update);

            if continues {
                for next in self.dependents(dependent).await? {
                    queue.push_back((dependent, next));
                }
            }
        }

        tracing::debug!(
            task_id,
            visited = visited.len(),
            changed = appended.len(),
            "Propagation finished"
        );

        Ok(appended)
    }

    /// Re-derive a single live task from its current dependencies.
    ///
    /// Returns the audit record when the derived status differs from the
    /// stored one, `None` when nothing changed.
    pub async fn rederive(&self, task_id: i64, actor: &Actor) -> Result<Option<StatusUpdate>> {
        self.rederive_locked(task_id, None, actor, TransitionSource::Rederive)
            .await
    }

    pub(crate) async fn rederive_locked(
        &self,
        task_id: i64,
        upstream: Option<i64>,
        actor: &Actor,
        source: TransitionSource,
    ) -> Result<Option<StatusUpdate>> {
        let changed = {
            let _guard = self.locks.acquire(task_id).await;
            with_retry(self.retry, task_id, move || {
                self.rederive_once(task_id, upstream, actor)
            })
            .await?
        };

        if let Some(update) = &changed {
            crate::log_status_transition!(
                task_id,
                update.previous_status,
                update.new_status,
                source.as_str()
            );
        }

        Ok(changed)
    }

    async fn rederive_once(
        &self,
        task_id: i64,
        upstream: Option<i64>,
        actor: &Actor,
    ) -> Result<Option<StatusUpdate>> {
        let mut tx = self.pool.begin().await?;

        let task = match store::load_live(&mut tx, task_id).await? {
            Some(task) => task,
            None => {
                return Err(match upstream {
                    Some(upstream) => TaskflowError::IntegrityError {
                        dependent_id: upstream,
                        missing_id: task_id,
                    },
                    None => TaskflowError::TaskNotFound(task_id),
                })
            },
        };

        let derived = derive_in(&mut tx, task_id).await?;
        if derived == task.status {
            return Ok(None);
        }

        store::update_status_in(&mut tx, task_id, derived).await?;
        let update = audit::record_in(&mut tx, task_id, task.status, derived, actor).await?;
        tx.commit().await?;

        Ok(Some(update))
    }

    async fn dependents(&self, task_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.pool.acquire().await?;
        fetch_dependent_ids(&mut conn, task_id).await
    }
}

/// Structural status of `task_id` from the current statuses of its
/// dependencies, read on the caller's connection. A dependency edge to a
/// task that is missing or soft-deleted is an integrity fault.
pub(crate) async fn derive_in(conn: &mut SqliteConnection, task_id: i64) -> Result<TaskStatus> {
    let dependency_ids = fetch_dependency_ids(conn, task_id).await?;

    let mut statuses = Vec::with_capacity(dependency_ids.len());
    for dependency_id in dependency_ids {
        let status: Option<TaskStatus> =
            sqlx::query_scalar::<_, String>(crate::sql_constants::SELECT_LIVE_TASK_STATUS)
                .bind(dependency_id)
                .fetch_optional(&mut *conn)
                .await?
                .map(|raw| raw.parse())
                .transpose()?;

        match status {
            Some(status) => statuses.push(status),
            None => {
                return Err(TaskflowError::IntegrityError {
                    dependent_id: task_id,
                    missing_id: dependency_id,
                })
            },
        }
    }

    Ok(derive_status(statuses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{insert_raw_edge, insert_raw_task, TestContext};
    use TaskStatus::*;

    async fn status_of(ctx: &TestContext, id: i64) -> TaskStatus {
        store::TaskStore::new(ctx.pool()).load(id).await.unwrap().status
    }

    async fn history_len(ctx: &TestContext, id: i64) -> usize {
        audit::AuditTrail::new(ctx.pool())
            .history_of(id)
            .await
            .unwrap()
            .len()
    }

    fn engine(ctx: &TestContext) -> StatusEngine {
        StatusEngine::new(ctx.pool().clone(), &ctx.config)
    }

    #[tokio::test]
    async fn test_apply_status_records_every_call() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "open").await;
        let engine = engine(&ctx);
        let actor = Actor::new("alice");

        let task = engine.apply_status(t, InProgress, &actor).await.unwrap();
        assert_eq!(task.status, InProgress);

        // Same status again still appends a record
        engine.apply_status(t, InProgress, &actor).await.unwrap();

        let history = audit::AuditTrail::new(ctx.pool()).history_of(t).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            (history[1].previous_status, history[1].new_status),
            (InProgress, InProgress)
        );
    }

    #[tokio::test]
    async fn test_apply_status_missing_task() {
        let ctx = TestContext::new().await;
        let engine = engine(&ctx);

        let result = engine.apply_status(77, Completed, &Actor::system()).await;
        assert!(matches!(result, Err(TaskflowError::TaskNotFound(77))));
    }

    #[tokio::test]
    async fn test_completion_unblocks_dependent() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "open").await;
        let u = insert_raw_task(ctx.pool(), "U", "completed").await;
        let d = insert_raw_task(ctx.pool(), "D", "blocked").await;
        insert_raw_edge(ctx.pool(), d, t).await;
        insert_raw_edge(ctx.pool(), d, u).await;

        engine(&ctx)
            .apply_status(t, Completed, &Actor::new("bob"))
            .await
            .unwrap();

        assert_eq!(status_of(&ctx, d).await, Open);
        let history = audit::AuditTrail::new(ctx.pool()).history_of(d).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].previous_status, history[0].new_status), (Blocked, Open));
        assert_eq!(history[0].changed_by.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_completion_with_other_incomplete_dependency() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "open").await;
        let v = insert_raw_task(ctx.pool(), "V", "in_progress").await;
        let d = insert_raw_task(ctx.pool(), "D", "blocked").await;
        insert_raw_edge(ctx.pool(), d, t).await;
        insert_raw_edge(ctx.pool(), d, v).await;

        engine(&ctx)
            .apply_status(t, Completed, &Actor::system())
            .await
            .unwrap();

        assert_eq!(status_of(&ctx, d).await, Blocked);
        assert_eq!(history_len(&ctx, d).await, 0);
    }

    #[tokio::test]
    async fn test_propagate_is_idempotent() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "completed").await;
        let a = insert_raw_task(ctx.pool(), "A", "blocked").await;
        let b = insert_raw_task(ctx.pool(), "B", "blocked").await;
        insert_raw_edge(ctx.pool(), a, t).await;
        insert_raw_edge(ctx.pool(), b, t).await;

        let engine = engine(&ctx);
        let first = engine.propagate(t, &Actor::system()).await.unwrap();
        assert_eq!(first.len(), 2);

        let second = engine.propagate(t, &Actor::system()).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(history_len(&ctx, a).await, 1);
        assert_eq!(history_len(&ctx, b).await, 1);
    }

    #[tokio::test]
    async fn test_propagate_stops_at_first_level() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "completed").await;
        let d = insert_raw_task(ctx.pool(), "D", "blocked").await;
        let e = insert_raw_task(ctx.pool(), "E", "blocked").await;
        insert_raw_edge(ctx.pool(), d, t).await;
        insert_raw_edge(ctx.pool(), e, d).await;

        let updates = engine(&ctx).propagate(t, &Actor::system()).await.unwrap();

        // D flips to open, which is not a completion; E is not revisited
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].task_id, d);
        assert_eq!(status_of(&ctx, e).await, Blocked);
    }

    #[tokio::test]
    async fn test_propagate_terminates_on_cyclic_graph() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "completed").await;
        let a = insert_raw_task(ctx.pool(), "A", "blocked").await;
        let b = insert_raw_task(ctx.pool(), "B", "open").await;
        // Corrupt graph: A <-> B, both downstream of T
        insert_raw_edge(ctx.pool(), a, t).await;
        insert_raw_edge(ctx.pool(), b, t).await;
        insert_raw_edge(ctx.pool(), a, b).await;
        insert_raw_edge(ctx.pool(), b, a).await;

        let updates = engine(&ctx).propagate(t, &Actor::system()).await.unwrap();

        // B depends on A (not completed) so it becomes blocked; A stays blocked
        assert_eq!(updates.len(), 1);
        assert_eq!(status_of(&ctx, a).await, Blocked);
        assert_eq!(status_of(&ctx, b).await, Blocked);
    }

    #[tokio::test]
    async fn test_propagate_reports_dangling_dependency() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "completed").await;
        let gone = insert_raw_task(ctx.pool(), "Gone", "completed").await;
        let d = insert_raw_task(ctx.pool(), "D", "blocked").await;
        insert_raw_edge(ctx.pool(), d, t).await;
        insert_raw_edge(ctx.pool(), d, gone).await;
        sqlx::query("UPDATE tasks SET deleted_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(gone)
            .execute(ctx.pool())
            .await
            .unwrap();

        let result = engine(&ctx).propagate(t, &Actor::system()).await;
        assert!(matches!(
            result,
            Err(TaskflowError::IntegrityError { dependent_id, missing_id })
                if dependent_id == d && missing_id == gone
        ));
        assert_eq!(status_of(&ctx, d).await, Blocked);
    }

    #[tokio::test]
    async fn test_failed_cascade_keeps_earlier_steps_and_resumes() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "completed").await;
        let a = insert_raw_task(ctx.pool(), "A", "blocked").await;
        let gone = insert_raw_task(ctx.pool(), "Gone", "completed").await;
        let d = insert_raw_task(ctx.pool(), "D", "blocked").await;
        insert_raw_edge(ctx.pool(), a, t).await;
        insert_raw_edge(ctx.pool(), d, t).await;
        insert_raw_edge(ctx.pool(), d, gone).await;
        sqlx::query("UPDATE tasks SET deleted_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(gone)
            .execute(ctx.pool())
            .await
            .unwrap();

        let engine = engine(&ctx);
        let actor = Actor::system();

        // A (lower id) is visited first; D then trips over the dangling edge
        let result = engine.propagate(t, &actor).await;
        assert!(matches!(
            result,
            Err(TaskflowError::IntegrityError { dependent_id, missing_id })
                if dependent_id == d && missing_id == gone
        ));
        assert_eq!(status_of(&ctx, a).await, Open);
        assert_eq!(history_len(&ctx, a).await, 1);
        assert_eq!(status_of(&ctx, d).await, Blocked);
        assert_eq!(history_len(&ctx, d).await, 0);

        // Repair, then rerun: only D gains a record
        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? AND dependency_id = ?")
            .bind(d)
            .bind(gone)
            .execute(ctx.pool())
            .await
            .unwrap();

        let updates = engine.propagate(t, &actor).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].task_id, d);
        assert_eq!((updates[0].previous_status, updates[0].new_status), (Blocked, Open));
        assert_eq!(history_len(&ctx, a).await, 1);
        assert_eq!(history_len(&ctx, d).await, 1);
    }

    #[tokio::test]
    async fn test_propagate_reports_dangling_dependent() {
        let ctx = TestContext::new().await;
        let t = insert_raw_task(ctx.pool(), "T", "completed").await;
        let d = insert_raw_task(ctx.pool(), "D", "blocked").await;
        insert_raw_edge(ctx.pool(), d, t).await;
        sqlx::query("UPDATE tasks SET deleted_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(d)
            .execute(ctx.pool())
            .await
            .unwrap();

        let result = engine(&ctx).propagate(t, &Actor::system()).await;
        assert!(matches!(
            result,
            Err(TaskflowError::IntegrityError { dependent_id, missing_id })
                if dependent_id == t && missing_id == d
        ));
    }

    #[tokio::test]
    async fn test_rederive() {
        let ctx = TestContext::new().await;
        let dep = insert_raw_task(ctx.pool(), "Dep", "open").await;
        let task = insert_raw_task(ctx.pool(), "Task", "open").await;
        insert_raw_edge(ctx.pool(), task, dep).await;

        let engine = engine(&ctx);
        let update = engine.rederive(task, &Actor::system()).await.unwrap();
        assert_eq!(update.map(|u| u.new_status), Some(Blocked));

        assert!(engine.rederive(task, &Actor::system()).await.unwrap().is_none());
        assert!(matches!(
            engine.rederive(999, &Actor::system()).await,
            Err(TaskflowError::TaskNotFound(999))
        ));
    }
}
