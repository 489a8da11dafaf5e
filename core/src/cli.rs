use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::api::{self, AppState};
use crate::application::{bootstrap, Application};
use crate::auth::{Caller, StaticTokenAuthenticator};
use crate::config::{Config, LoggingConfig};
use crate::db;
use crate::types::{ExecutionId, UserId, WorkflowId};

#[derive(Parser)]
#[command(name = "flowvault")]
#[command(about = "Flowvault - workflow versioning, lifecycle and execution ledger", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL (overrides config file and env vars)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// User id to act as for inspection commands
    #[arg(long, global = true)]
    pub user: Option<UserId>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the REST API server
    Serve {
        /// Listen address (overrides server.listen_addr)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Run database migrations
    Migrate,

    /// Print the effective configuration (secrets redacted)
    Config,

    /// List the versions of a workflow
    Versions {
        /// Workflow ID to query
        workflow_id: WorkflowId,
    },

    /// Get the status of an execution
    Status {
        /// Execution ID to query
        execution_id: ExecutionId,
    },

    /// Print the log of an execution
    Logs {
        /// Execution ID to query
        execution_id: ExecutionId,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `logging.level` when set.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // try_init fails only when a subscriber is already installed
    if logging.json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn load_config(cli: &Cli, listen: Option<String>) -> Result<Config> {
    Config::builder()
        .config_path(cli.config.clone())
        .database_url(cli.database_url.clone())
        .listen_addr(listen)
        .build()
}

fn acting_user(user: Option<UserId>) -> Result<Caller> {
    match user {
        Some(user_id) => Ok(Caller::new(user_id)),
        None => bail!("--user is required for inspection commands"),
    }
}

/// Internal function that handles CLI commands
async fn run_cli_with_args(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    let listen = match &cli.command {
        Commands::Serve { listen } => listen.clone(),
        _ => None,
    };

    // Eagerly load and validate configuration before executing any command
    let config = load_config(&cli, listen)?;
    init_tracing(&config.logging);
    let user = cli.user;

    match cli.command {
        Commands::Serve { .. } => {
            let authenticator = StaticTokenAuthenticator::from_config(&config.auth);
            if authenticator.is_empty() {
                warn!("auth.tokens is empty, every authenticated route will answer 401");
            }
            let app = bootstrap(config).await?;
            api::serve(AppState::new(Arc::new(app), Arc::new(authenticator))).await?;
        }

        Commands::Migrate => {
            println!("Running migrations...");
            let pool = db::create_pool(&config.database).await?;
            db::migrate(&pool).await?;
            println!("Migrations complete!");
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }

        Commands::Versions { workflow_id } => {
            let caller = acting_user(user)?;
            let app = open(config).await?;
            let detail = app.workflows.get(&caller, workflow_id).await?;

            println!("Workflow {}: {}", detail.workflow.id, detail.workflow.name);
            if detail.versions.is_empty() {
                println!("No versions");
                return Ok(());
            }
            for version in detail.versions {
                println!(
                    "  v{} | {} | {} | {}",
                    version.version,
                    version.status,
                    &version.definition_hash[..version.definition_hash.len().min(12)],
                    version.created_at
                );
            }
        }

        Commands::Status { execution_id } => {
            let caller = acting_user(user)?;
            let app = open(config).await?;
            let detail = app.executions.detail(&caller, execution_id).await?;

            println!("Execution: {}", detail.execution.id);
            println!("Workflow: {} (version {})", detail.workflow_id, detail.version);
            println!("Status: {}", detail.execution.status);
            println!("Started: {}", detail.execution.started_at);
            if let Some(ended_at) = detail.execution.ended_at {
                println!("Ended: {}", ended_at);
            }
            println!("\nInputs:\n  {}", detail.execution.inputs);
            if let Some(result) = detail.execution.result {
                println!("\nResult:\n  {}", result);
            }
        }

        Commands::Logs { execution_id } => {
            let caller = acting_user(user)?;
            let app = open(config).await?;
            let logs = app.executions.get_logs(&caller, execution_id).await?;

            if logs.is_empty() {
                println!("No log entries");
                return Ok(());
            }
            for entry in logs {
                println!(
                    "{} [{}] {}{}",
                    entry.timestamp,
                    entry.level.as_str(),
                    entry
                        .node_id
                        .map(|node| format!("{}: ", node))
                        .unwrap_or_default(),
                    entry.message
                );
            }
        }
    }

    Ok(())
}

/// Bootstrap for read-only commands, without migrating
async fn open(mut config: Config) -> Result<Application> {
    config.database.auto_migrate = false;
    bootstrap(config).await.context("Failed to open the store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "flowvault",
            "status",
            "42",
            "--user",
            "7",
            "--database-url",
            "postgresql://localhost/flowvault",
        ]);

        assert_eq!(cli.user, Some(7));
        assert_eq!(
            cli.database_url.as_deref(),
            Some("postgresql://localhost/flowvault")
        );
        assert!(matches!(cli.command, Commands::Status { execution_id: 42 }));
    }

    #[test]
    fn test_serve_listen_override() {
        let cli = Cli::parse_from(["flowvault", "serve", "--listen", "0.0.0.0:9000"]);
        match cli.command {
            Commands::Serve { listen } => assert_eq!(listen.as_deref(), Some("0.0.0.0:9000")),
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_inspection_requires_user() {
        let cli = Cli::parse_from(["flowvault", "logs", "1"]);
        assert!(acting_user(cli.user).is_err());
        assert_eq!(acting_user(Some(3)).unwrap(), Caller::new(3));
    }
}
