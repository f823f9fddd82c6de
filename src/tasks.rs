use crate::audit::{self, AuditTrail};
use crate::config::EngineConfig;
use crate::db::models::{Actor, NewTask, StatusUpdate, Task, TaskFilter, TaskStatus};
use crate::dependencies::{self, add_edges_in};
use crate::engine::{derive_in, StatusEngine, TransitionSource};
use crate::error::{Result, TaskflowError};
use crate::listing::TaskListCache;
use crate::retry::with_retry;
use crate::store::{self, TaskStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Retry subject used before a new task has an id.
const UNASSIGNED_TASK_ID: i64 = 0;

/// Outcome of a soft delete: when it happened and which former dependents
/// changed status as a result.
#[derive(Debug, Clone, Serialize)]
pub struct SoftDeleteResult {
    pub task_id: i64,
    pub deleted_at: DateTime<Utc>,
    pub rederived: Vec<StatusUpdate>,
}

/// Entry point for the surrounding CRUD layer.
///
/// Owns the status engine and the listing cache. Every mutating call
/// invalidates the cache once it finishes, whether it succeeded or not.
#[derive(Clone)]
pub struct TaskService {
    engine: StatusEngine,
    cache: Arc<TaskListCache>,
}

impl TaskService {
    /// The engine is private to the service so that every write goes
    /// through a method that invalidates the listing cache.
    pub fn new(pool: SqlitePool, config: &EngineConfig) -> Self {
        Self {
            engine: StatusEngine::new(pool, config),
            cache: Arc::new(TaskListCache::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.engine.pool()
    }

    pub fn cache(&self) -> &TaskListCache {
        &self.cache
    }

    /// Create a task whose initial status is derived from `dependency_ids`.
    ///
    /// The insert, the edges and the dependency-status read share one
    /// transaction. Creation writes no audit record.
    pub async fn create_task(&self, new_task: NewTask, dependency_ids: &[i64]) -> Result<Task> {
        let result = self.create_task_inner(&new_task, dependency_ids).await;
        self.cache.invalidate().await;
        result
    }

    async fn create_task_inner(&self, new_task: &NewTask, dependency_ids: &[i64]) -> Result<Task> {
        new_task.validate()?;
        let unique: BTreeSet<i64> = dependency_ids.iter().copied().collect();

        let unique_ref = &unique;
        let id = with_retry(self.engine.retry_policy(), UNASSIGNED_TASK_ID, move || {
            self.create_once(new_task, unique_ref)
        })
        .await?;

        let task = TaskStore::new(self.pool()).load(id).await?;
        crate::log_task_operation!(
            "create",
            task.id,
            format!("status={} dependencies={}", task.status, unique.len())
        );
        Ok(task)
    }

    async fn create_once(&self, new_task: &NewTask, dependency_ids: &BTreeSet<i64>) -> Result<i64> {
        let mut tx = self.pool().begin().await?;

        let mut statuses = Vec::with_capacity(dependency_ids.len());
        for &dependency_id in dependency_ids {
            let raw: Option<String> =
                sqlx::query_scalar(crate::sql_constants::SELECT_LIVE_TASK_STATUS)
                    .bind(dependency_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let raw = raw.ok_or(TaskflowError::TaskNotFound(dependency_id))?;
            statuses.push(raw.parse::<TaskStatus>()?);
        }

        let status = crate::status::derive_status(statuses);
        let id = store::insert_in(&mut tx, new_task, status).await?;
        // A new task has no dependents, so none of these edges can close a cycle
        dependencies::insert_edges(&mut tx, id, dependency_ids).await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Explicit status change; see [`StatusEngine::apply_status`].
    pub async fn set_status(
        &self,
        task_id: i64,
        new_status: TaskStatus,
        actor: &Actor,
    ) -> Result<Task> {
        let result = self.engine.apply_status(task_id, new_status, actor).await;
        self.cache.invalidate().await;
        result
    }

    /// Visible status history of a live task, oldest first.
    pub async fn get_history(&self, task_id: i64) -> Result<Vec<StatusUpdate>> {
        AuditTrail::new(self.pool()).history_of(task_id).await
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Task> {
        TaskStore::new(self.pool()).load(task_id).await
    }

    /// Filtered listing of live tasks, served from the cache when possible.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        if let Some(hit) = self.cache.get(filter).await {
            tracing::trace!(?filter, "Listing cache hit");
            return Ok(hit);
        }

        let generation = self.cache.generation().await;
        let tasks = TaskStore::new(self.pool()).list_tasks(filter).await?;
        self.cache
            .insert_if_current(filter.clone(), tasks.clone(), generation)
            .await;
        Ok(tasks)
    }

    /// Add dependency edges to an existing task, then re-derive the task
    /// itself. The batch is all-or-nothing.
    pub async fn add_dependencies(
        &self,
        task_id: i64,
        dependency_ids: &[i64],
        actor: &Actor,
    ) -> Result<Task> {
        let result = self.add_dependencies_inner(task_id, dependency_ids, actor).await;
        self.cache.invalidate().await;
        result
    }

    async fn add_dependencies_inner(
        &self,
        task_id: i64,
        dependency_ids: &[i64],
        actor: &Actor,
    ) -> Result<Task> {
        let (task, update) = {
            let _guard = self.engine.locks().acquire(task_id).await;
            with_retry(self.engine.retry_policy(), task_id, move || {
                self.add_dependencies_once(task_id, dependency_ids, actor)
            })
            .await?
        };

        if let Some(update) = update {
            crate::log_status_transition!(
                task_id,
                update.previous_status,
                update.new_status,
                TransitionSource::Rederive.as_str()
            );
        }
        crate::log_task_operation!("add_dependencies", task_id, format!("{:?}", dependency_ids));

        Ok(task)
    }

    async fn add_dependencies_once(
        &self,
        task_id: i64,
        dependency_ids: &[i64],
        actor: &Actor,
    ) -> Result<(Task, Option<StatusUpdate>)> {
        let mut tx = self.pool().begin().await?;

        add_edges_in(&mut tx, task_id, dependency_ids).await?;

        let task = store::load_live(&mut tx, task_id)
            .await?
            .ok_or(TaskflowError::TaskNotFound(task_id))?;
        let derived = derive_in(&mut tx, task_id).await?;

        if derived == task.status {
            tx.commit().await?;
            return Ok((task, None));
        }

        let updated_at = store::update_status_in(&mut tx, task_id, derived).await?;
        let update = audit::record_in(&mut tx, task_id, task.status, derived, actor).await?;
        tx.commit().await?;

        Ok((
            Task {
                status: derived,
                updated_at,
                ..task
            },
            Some(update),
        ))
    }

    /// Run the completion cascade from a live task on demand.
    pub async fn propagate(&self, task_id: i64, actor: &Actor) -> Result<Vec<StatusUpdate>> {
        let result = async {
            TaskStore::new(self.pool()).load(task_id).await?;
            self.engine.propagate(task_id, actor).await
        }
        .await;
        self.cache.invalidate().await;
        result
    }

    pub async fn assign(&self, task_id: i64, assignee: i64) -> Result<Task> {
        let result = TaskStore::new(self.pool()).assign(task_id, assignee).await;
        self.cache.invalidate().await;
        if result.is_ok() {
            crate::log_task_operation!("assign", task_id, format!("assignee={}", assignee));
        }
        result
    }

    /// Soft-delete a live task.
    ///
    /// Detaches every edge touching the task, hides its history, then
    /// re-derives each former dependent. A dependent whose only unfinished
    /// dependency was this task becomes open.
    pub async fn soft_delete(&self, task_id: i64, actor: &Actor) -> Result<SoftDeleteResult> {
        let result = self.soft_delete_inner(task_id, actor).await;
        self.cache.invalidate().await;
        result
    }

    async fn soft_delete_inner(&self, task_id: i64, actor: &Actor) -> Result<SoftDeleteResult> {
        let (deleted_at, former_dependents) = {
            let _guard = self.engine.locks().acquire(task_id).await;
            with_retry(self.engine.retry_policy(), task_id, move || self.soft_delete_once(task_id)).await?
        };
        crate::log_task_operation!("soft_delete", task_id);

        let mut rederived = Vec::new();
        for dependent in former_dependents {
            if let Some(update) = self
                .engine
                .rederive_locked(dependent, Some(task_id), actor, TransitionSource::Rederive)
                .await?
            {
                rederived.push(update);
            }
        }

        Ok(SoftDeleteResult {
            task_id,
            deleted_at,
            rederived,
        })
    }

    async fn soft_delete_once(&self, task_id: i64) -> Result<(DateTime<Utc>, Vec<i64>)> {
        let mut tx = self.pool().begin().await?;
        store::ensure_live(&mut tx, task_id).await?;

        let now = Utc::now();
        store::mark_deleted_in(&mut tx, task_id, now).await?;
        let former_dependents = dependencies::detach_all(&mut tx, task_id).await?;
        audit::hide_for(&mut tx, task_id, now).await?;

        tx.commit().await?;
        Ok((now, former_dependents))
    }

    /// Bring a soft-deleted task back along with its history. Edges
    /// detached by the delete stay detached.
    pub async fn restore(&self, task_id: i64) -> Result<Task> {
        let result = self.restore_inner(task_id).await;
        self.cache.invalidate().await;
        result
    }

    async fn restore_inner(&self, task_id: i64) -> Result<Task> {
        {
            let _guard = self.engine.locks().acquire(task_id).await;
            with_retry(self.engine.retry_policy(), task_id, move || async move {
                let mut tx = self.pool().begin().await?;
                store::load_trashed(&mut tx, task_id)
                    .await?
                    .ok_or(TaskflowError::TaskNotFound(task_id))?;
                store::clear_deleted_in(&mut tx, task_id).await?;
                audit::unhide_for(&mut tx, task_id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;
        }
        crate::log_task_operation!("restore", task_id);

        TaskStore::new(self.pool()).load(task_id).await
    }

    /// Permanently remove a soft-deleted task with its edges and history.
    pub async fn force_delete(&self, task_id: i64) -> Result<()> {
        let result = self.force_delete_inner(task_id).await;
        self.cache.invalidate().await;
        result
    }

    async fn force_delete_inner(&self, task_id: i64) -> Result<()> {
        {
            let _guard = self.engine.locks().acquire(task_id).await;
            with_retry(self.engine.retry_policy(), task_id, move || async move {
                let mut tx = self.pool().begin().await?;
                store::load_trashed(&mut tx, task_id)
                    .await?
                    .ok_or(TaskflowError::TaskNotFound(task_id))?;
                store::hard_delete_in(&mut tx, task_id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;
        }
        crate::log_task_operation!("force_delete", task_id);
        Ok(())
    }
}
