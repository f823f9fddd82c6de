use clap::Parser;
use taskflow::cli::Cli;
use taskflow::cli_handlers::{handle_command, resolve_actor};
use taskflow::config::EngineConfig;
use taskflow::db::{create_pool, run_migrations};
use taskflow::error::Result;
use taskflow::logging::{init_from_env, init_logging, LoggingConfig};
use taskflow::tasks::TaskService;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get logging configuration
    let cli = Cli::parse();

    // Explicit flags win over TASKFLOW_LOG_* variables
    let logging = if cli.verbose > 0 || cli.quiet || cli.json {
        init_logging(LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json))
    } else {
        init_from_env()
    };

    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli).await {
        let error_response = e.to_error_response();
        match serde_json::to_string_pretty(&error_response) {
            Ok(body) => eprintln!("{}", body),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = EngineConfig::from_env()?;
    if let Some(db) = &cli.db {
        config = config.with_database_path(db.clone());
    }

    let pool = create_pool(&config.database_path, &config).await?;
    run_migrations(&pool).await?;
    tracing::debug!(database = %config.database_path.display(), "Database ready");

    let service = TaskService::new(pool, &config);
    let actor = resolve_actor(cli.actor.as_deref());

    handle_command(&service, &actor, cli.command.clone()).await
}
