use super::utils::{parse_due_date, print_json};
use crate::cli::Commands;
use crate::db::models::{Actor, NewTask, TaskFilter, TaskPriority, TaskStatus, TaskType};
use crate::error::Result;
use crate::tasks::TaskService;
use serde_json::json;

/// Run one subcommand against the service and print its result.
pub async fn handle_command(service: &TaskService, actor: &Actor, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            title,
            task_type,
            priority,
            description,
            due,
            assignee,
            depends_on,
        } => {
            let mut new_task = NewTask::new(
                title,
                task_type.parse::<TaskType>()?,
                priority.parse::<TaskPriority>()?,
            );
            if let Some(description) = description {
                new_task = new_task.with_description(description);
            }
            if let Some(due) = due {
                new_task = new_task.with_due_date(parse_due_date(&due)?);
            }
            if let Some(assignee) = assignee {
                new_task = new_task.with_assignee(assignee);
            }

            let task = service.create_task(new_task, &depends_on).await?;
            print_json(&task)
        },

        Commands::Status { id, status } => {
            let task = service.set_status(id, status.parse::<TaskStatus>()?, actor).await?;
            print_json(&task)
        },

        Commands::History { id } => {
            let history = service.get_history(id).await?;
            print_json(&history)
        },

        Commands::List {
            task_type,
            status,
            assignee,
            due,
            priority,
            depends_on,
        } => {
            let filter = TaskFilter {
                task_type: task_type.map(|raw| raw.parse::<TaskType>()).transpose()?,
                status: status.map(|raw| raw.parse::<TaskStatus>()).transpose()?,
                assigned_to: assignee,
                due_date: due.map(|raw| parse_due_date(&raw)).transpose()?,
                priority: priority.map(|raw| raw.parse::<TaskPriority>()).transpose()?,
                depends_on,
            };
            let tasks = service.list_tasks(&filter).await?;
            print_json(&tasks)
        },

        Commands::DependsOn { id, dependency_ids } => {
            let task = service.add_dependencies(id, &dependency_ids, actor).await?;
            print_json(&task)
        },

        Commands::Propagate { id } => {
            let updates = service.propagate(id, actor).await?;
            print_json(&json!({
                "task_id": id,
                "updated": updates,
            }))
        },

        Commands::Assign { id, assignee } => {
            let task = service.assign(id, assignee).await?;
            print_json(&task)
        },

        Commands::Delete { id, force: false } => {
            let outcome = service.soft_delete(id, actor).await?;
            print_json(&outcome)
        },

        Commands::Delete { id, force: true } => {
            service.force_delete(id).await?;
            print_json(&json!({
                "task_id": id,
                "deleted": true,
                "permanent": true,
            }))
        },

        Commands::Restore { id } => {
            let task = service.restore(id).await?;
            print_json(&task)
        },
    }
}
