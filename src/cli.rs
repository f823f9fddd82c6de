use clap::{Parser, Subcommand};
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
Taskflow - task dependency graph with status propagation

Tasks depend on other tasks. A task with an unfinished dependency is
blocked; completing a task re-derives every task that depends on it.
Every status change is kept in an append-only history.

Examples:
  taskflow add "Write parser" --type feature
  taskflow add "Ship release" --type feature --depends-on 1,2
  taskflow status 1 completed
  taskflow history 3
  taskflow list --status blocked

Results are printed as JSON on stdout. Errors are printed as JSON on
stderr with a non-zero exit code.
"#;

#[derive(Parser, Clone)]
#[command(name = "taskflow")]
#[command(about = "Task dependency graph and status propagation with an audit trail")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Database file (overrides TASKFLOW_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Name recorded in the history (falls back to TASKFLOW_ACTOR, then "cli")
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Create a task; its status is derived from its dependencies
    Add {
        /// Task title
        title: String,

        /// Task type: bug, feature, improvement
        #[arg(long = "type", default_value = "feature")]
        task_type: String,

        /// Priority: low, medium, high
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Longer description
        #[arg(long)]
        description: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// Assignee id
        #[arg(long)]
        assignee: Option<i64>,

        /// Ids of tasks this one depends on (comma separated)
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<i64>,
    },

    /// Set a task's status explicitly
    ///
    /// Completing a task re-derives the tasks that depend on it.
    Status {
        /// Task id
        id: i64,

        /// New status: open, in_progress, completed, blocked
        status: String,
    },

    /// Show the status history of a task, oldest first
    History {
        /// Task id
        id: i64,
    },

    /// List tasks matching all given filters
    List {
        /// Filter by type
        #[arg(long = "type")]
        task_type: Option<String>,

        /// Filter by status
        #[arg(long)]
        status: Option<String>,

        /// Filter by assignee id
        #[arg(long)]
        assignee: Option<i64>,

        /// Filter by due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// Filter by priority
        #[arg(long)]
        priority: Option<String>,

        /// Only tasks that depend on this task id
        #[arg(long)]
        depends_on: Option<i64>,
    },

    /// Add dependencies to an existing task
    DependsOn {
        /// Task id
        id: i64,

        /// Ids of the tasks it should depend on
        #[arg(required = true, num_args = 1..)]
        dependency_ids: Vec<i64>,
    },

    /// Re-run the completion cascade from a task
    Propagate {
        /// Task id
        id: i64,
    },

    /// Assign a task
    Assign {
        /// Task id
        id: i64,

        /// Assignee id
        assignee: i64,
    },

    /// Move a task to the trash, or purge a trashed task with --force
    Delete {
        /// Task id
        id: i64,

        /// Permanently remove a task that is already in the trash
        #[arg(long)]
        force: bool,
    },

    /// Restore a task from the trash
    Restore {
        /// Task id
        id: i64,
    },
}
