use std::sync::Arc;

use artibot_agent::{
    ActionExecutor, AgentRuntime, DeterministicIntentResolver, NoopNotifier, ReminderService,
};
use artibot_core::config::{AppConfig, ConfigError, LoadOptions};
use artibot_core::RetryPolicy;
use artibot_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates, and wires the agent runtime over SQL repositories.
/// Delivery stays on the noop notifier; the WhatsApp gateway picks outbound
/// messages up outside this process.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let executor = ActionExecutor::sql(db_pool.clone()).with_retry(RetryPolicy {
        max_attempts: config.numbering.max_attempts,
        base_delay_ms: config.numbering.backoff_base_ms,
        max_delay_ms: config.numbering.backoff_max_ms,
    });
    let reminders = ReminderService::new(executor.repositories().clone(), Arc::new(NoopNotifier));
    let runtime = AgentRuntime::new(
        Arc::new(DeterministicIntentResolver),
        executor,
        reminders,
        config.dialogue.clone(),
    );
    info!(whatsapp_enabled = config.whatsapp.enabled, "agent runtime wired");

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}
