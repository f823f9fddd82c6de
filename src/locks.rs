use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedMutexGuard;

/// Map size above which expired entries are swept on acquisition.
const PRUNE_THRESHOLD: usize = 256;

/// In-process mutual exclusion keyed by task id.
///
/// Two units of work on the same task run one after the other; work on
/// different tasks proceeds in parallel. Entries are held weakly and swept
/// once the map grows past [`PRUNE_THRESHOLD`], so ids that are no longer
/// being touched do not accumulate.
///
/// Callers hold at most one task lock at a time, which rules out lock-order
/// deadlocks without a global ordering.
#[derive(Default)]
pub struct TaskLocks {
    locks: Mutex<HashMap<i64, Weak<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one unit of work on a task.
pub struct TaskLockGuard {
    task_id: i64,
    _guard: OwnedMutexGuard<()>,
}

impl TaskLockGuard {
    pub fn task_id(&self) -> i64 {
        self.task_id
    }
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `task_id`.
    pub async fn acquire(&self, task_id: i64) -> TaskLockGuard {
        let mutex = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

            let mutex = map.get(&task_id).and_then(Weak::upgrade).unwrap_or_else(|| {
                let fresh = Arc::new(tokio::sync::Mutex::new(()));
                map.insert(task_id, Arc::downgrade(&fresh));
                fresh
            });

            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, weak| weak.strong_count() > 0);
            }

            mutex
        };

        TaskLockGuard {
            task_id,
            _guard: mutex.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
