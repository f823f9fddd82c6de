use crate::db::models::{Task, TaskFilter};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<TaskFilter, Vec<Task>>,
}

/// Listing results keyed by the full filter value.
///
/// Every write invalidates the whole cache and bumps a generation counter.
/// A listing captures the generation before it queries and only stores its
/// result if no invalidation happened in between, so a query that raced a
/// write never repopulates the cache with pre-write rows.
#[derive(Default)]
pub struct TaskListCache {
    state: RwLock<CacheState>,
}

impl TaskListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, filter: &TaskFilter) -> Option<Vec<Task>> {
        self.state.read().await.entries.get(filter).cloned()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Store `tasks` for `filter` if the cache is still at `generation`.
    /// Returns whether the entry was stored.
    pub async fn insert_if_current(
        &self,
        filter: TaskFilter,
        tasks: Vec<Task>,
        generation: u64,
    ) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            tracing::debug!(
                expected = generation,
                current = state.generation,
                "Discarding listing computed before a write"
            );
            return false;
        }
        state.entries.insert(filter, tasks);
        true
    }

    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TaskStatus;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = TaskListCache::new();
        let filter = TaskFilter::default().with_status(TaskStatus::Open);

        assert!(cache.get(&filter).await.is_none());

        let generation = cache.generation().await;
        assert!(cache.insert_if_current(filter.clone(), Vec::new(), generation).await);
        assert!(cache.get(&filter).await.is_some_and(|tasks| tasks.is_empty()));
        assert_eq!(cache.len().await, 1);

        // Filters are compared by value
        assert!(cache.get(&TaskFilter::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_and_bumps_generation() {
        let cache = TaskListCache::new();
        let filter = TaskFilter::default();
        let before = cache.generation().await;
        cache.insert_if_current(filter.clone(), Vec::new(), before).await;

        cache.invalidate().await;

        assert!(cache.is_empty().await);
        assert_eq!(cache.generation().await, before + 1);
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let cache = TaskListCache::new();
        let filter = TaskFilter::default().depending_on(3);

        let generation = cache.generation().await;
        cache.invalidate().await;

        assert!(!cache.insert_if_current(filter.clone(), Vec::new(), generation).await);
        assert!(cache.get(&filter).await.is_none());
    }
}
