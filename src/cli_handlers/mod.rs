// CLI command handlers module
//
// Task commands plus the small parsing/printing helpers they share.

pub mod task_commands;
pub mod utils;

pub use task_commands::handle_command;
pub use utils::{parse_due_date, print_json, resolve_actor};
