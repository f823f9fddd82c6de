pub mod audit;
pub mod cli;
pub mod cli_handlers;
pub mod config;
pub mod db;
pub mod dependencies;
pub mod engine;
pub mod error;
pub mod listing;
pub mod locks;
pub mod logging;
pub mod retry;
pub mod sql_constants;
pub mod status;
pub mod store;
pub mod tasks;

pub use db::models::{Actor, NewTask, StatusUpdate, Task, TaskFilter, TaskPriority, TaskStatus, TaskType};
pub use engine::StatusEngine;
pub use error::{Result, TaskflowError};
pub use tasks::TaskService;

#[cfg(test)]
pub mod test_utils;
