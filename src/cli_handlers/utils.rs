//! Utility functions for CLI handlers

use crate::db::models::Actor;
use crate::error::{Result, TaskflowError};
use chrono::NaiveDate;
use serde::Serialize;

pub const DEFAULT_ACTOR: &str = "cli";

/// Print a command result as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_due_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        TaskflowError::InvalidInput(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
    })
}

/// `--actor`, then `TASKFLOW_ACTOR`, then the default.
pub fn resolve_actor(flag: Option<&str>) -> Actor {
    let from_env = std::env::var("TASKFLOW_ACTOR").ok();
    let name = flag
        .or(from_env.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_ACTOR);
    Actor::new(name)
}
