//! Application wiring
//!
//! Builds the store selected by configuration and the services on top of
//! it. Transport layers (REST, CLI) only ever talk to an [`Application`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::auth::AccessGate;
use crate::config::{Config, DatabaseBackend};
use crate::db;
use crate::drafting::completion::{ChatCompletionClient, CompletionService};
use crate::drafting::DraftPipeline;
use crate::executions::ExecutionLedger;
use crate::lifecycle::LifecycleController;
use crate::store::{MemoryStore, PgStore, Store};
use crate::versions::VersionStore;
use crate::workflows::WorkflowService;

/// The Flowvault application instance with all services
pub struct Application {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub workflows: WorkflowService,
    pub versions: VersionStore,
    pub lifecycle: LifecycleController,
    pub executions: ExecutionLedger,
    pub drafting: DraftPipeline,
}

impl Application {
    /// Create a new Application instance (pure instantiation, no I/O)
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let gate = AccessGate::new(store.clone());
        let versions = VersionStore::new(store.clone(), gate.clone());

        Self {
            workflows: WorkflowService::new(store.clone(), gate.clone()),
            lifecycle: LifecycleController::new(store.clone(), gate.clone()),
            executions: ExecutionLedger::new(store.clone(), gate.clone()),
            drafting: DraftPipeline::new(completion, &config.drafting, gate, versions.clone()),
            versions,
            store,
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Connect the configured backend and build the application
///
/// With the postgres backend, migrations run first when
/// `database.auto_migrate` is set.
pub async fn bootstrap(config: Config) -> Result<Application> {
    config.validate()?;

    let store: Arc<dyn Store> = match config.database.backend {
        DatabaseBackend::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
        DatabaseBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            if config.database.auto_migrate {
                db::migrate(&pool).await?;
                info!("database migrations applied");
            }
            Arc::new(PgStore::new(pool, config.versions.max_conflict_retries))
        }
    };

    let completion =
        ChatCompletionClient::new(&config.drafting).context("Failed to set up completion client")?;
    if !completion.is_configured() {
        info!("drafting.api_key not set, drafting endpoints will report an external service error");
    }

    Ok(Application::new(config, store, Arc::new(completion)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Caller;
    use crate::types::NewWorkflow;

    #[tokio::test]
    async fn test_bootstrap_memory_backend() {
        let app = bootstrap(Config::default()).await.unwrap();
        let caller = Caller::new(1);

        let workflow = app
            .workflows
            .create(
                &caller,
                NewWorkflow {
                    name: "Invoice Approval".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(app.workflows.list(&caller).await.unwrap(), vec![workflow]);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_postgres_without_url() {
        let mut config = Config::default();
        config.database.backend = DatabaseBackend::Postgres;
        assert!(bootstrap(config).await.is_err());
    }
}
