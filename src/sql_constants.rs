//! SQL query constants and fragments
//!
//! Frequently used column lists and single-row statements live here so the
//! store, graph and audit modules select exactly the same shapes.
//!
//! Note: Dynamic WHERE clauses (listing filters) are still built inline.

// ============================================================================
// Task Queries
// ============================================================================

/// Column list matching `db::models::Task`
pub const TASK_COLUMNS: &str = "id, title, task_type, description, status, priority, due_date, assigned_to, deleted_at, created_at, updated_at";

/// Base SELECT for tasks. Add WHERE clauses as needed.
pub const SELECT_TASK_FULL: &str = const_format::formatcp!("SELECT {} FROM tasks", TASK_COLUMNS);

/// Live (not soft-deleted) task by id
pub const SELECT_LIVE_TASK: &str =
    const_format::formatcp!("{} WHERE id = ? AND deleted_at IS NULL", SELECT_TASK_FULL);

/// Soft-deleted task by id
pub const SELECT_TRASHED_TASK: &str =
    const_format::formatcp!("{} WHERE id = ? AND deleted_at IS NOT NULL", SELECT_TASK_FULL);

/// Base listing query over live tasks
pub const SELECT_LIVE_TASKS: &str =
    const_format::formatcp!("SELECT {} FROM tasks t WHERE t.deleted_at IS NULL", TASK_COLUMNS);

/// Check if a live task exists by ID
pub const CHECK_LIVE_TASK_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ? AND deleted_at IS NULL)";

/// Status of a live task
pub const SELECT_LIVE_TASK_STATUS: &str =
    "SELECT status FROM tasks WHERE id = ? AND deleted_at IS NULL";

/// Persist a status change
pub const UPDATE_TASK_STATUS: &str = "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?";

// ============================================================================
// Dependency Queries
// ============================================================================

/// Ids this task depends on
pub const SELECT_DEPENDENCY_IDS: &str =
    "SELECT dependency_id FROM task_dependencies WHERE task_id = ? ORDER BY dependency_id";

/// Ids of tasks that depend on this task
pub const SELECT_DEPENDENT_IDS: &str =
    "SELECT task_id FROM task_dependencies WHERE dependency_id = ? ORDER BY task_id";

/// Edge insertion; an existing edge is left untouched
pub const INSERT_EDGE: &str = "INSERT OR IGNORE INTO task_dependencies (task_id, dependency_id, created_at) VALUES (?, ?, ?)";

// ============================================================================
// Audit Queries
// ============================================================================

/// Column list matching `db::models::StatusUpdate`
pub const STATUS_UPDATE_COLUMNS: &str =
    "id, task_id, previous_status, new_status, changed_by, created_at";

pub const INSERT_STATUS_UPDATE: &str = "INSERT INTO task_status_updates (task_id, previous_status, new_status, changed_by, created_at) VALUES (?, ?, ?, ?, ?)";

/// Visible history of a task, oldest first. AUTOINCREMENT ids follow
/// insertion order even when two rows share a timestamp.
pub const SELECT_STATUS_HISTORY: &str = const_format::formatcp!(
    "SELECT {} FROM task_status_updates WHERE task_id = ? AND deleted_at IS NULL ORDER BY id ASC",
    STATUS_UPDATE_COLUMNS
);
