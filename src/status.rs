//! Status derivation rule.
//!
//! A task's structural status depends only on the statuses of its
//! dependencies: it is blocked while any of them is unfinished and open
//! otherwise. The rule never yields `InProgress` or `Completed`; those come
//! only from an explicit status change.

use crate::db::models::TaskStatus;

/// Compute the structural status for a task whose dependencies are in the
/// given states. An empty dependency set is open.
pub fn derive_status<I>(dependency_statuses: I) -> TaskStatus
where
    I: IntoIterator<Item = TaskStatus>,
{
    let blocked = dependency_statuses
        .into_iter()
        .any(|status| !is_satisfied(status));

    if blocked {
        TaskStatus::Blocked
    } else {
        TaskStatus::Open
    }
}

/// Whether a dependency in this state lets its dependents proceed.
pub fn is_satisfied(status: TaskStatus) -> bool {
    match status {
        TaskStatus::Completed => true,
        TaskStatus::Open | TaskStatus::InProgress | TaskStatus::Blocked => false,
    }
}
