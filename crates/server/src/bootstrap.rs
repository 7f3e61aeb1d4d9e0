use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use skipper_agent::{
    ClaudeBackend, OllamaBackend, ProviderError, ProviderRouter, SharedRegistry,
    SkillScheduler,
};
use skipper_core::config::{AppConfig, ConfigError, LoadOptions};
use skipper_core::registry::SkillRegistry;
use skipper_db::{connect_with_settings, migrations, ConversationStore, DbPool,
    SqlConversationStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<dyn ConversationStore>,
    pub registry: SharedRegistry,
    pub router: Arc<ProviderRouter>,
    pub scheduler: Arc<SkillScheduler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm backend construction failed: {0}")]
    Provider(#[source] ProviderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

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

    let store: Arc<dyn ConversationStore> =
        Arc::new(SqlConversationStore::new(db_pool.clone()));

    let mut registry = SkillRegistry::new(&config.skills.dir);
    match registry.load_all() {
        Ok(count) => info!(skills = count, dir = %config.skills.dir.display(), "skill registry loaded"),
        Err(error) => {
            warn!(%error, dir = %config.skills.dir.display(), "skill registry load failed; starting empty")
        }
    }
    let registry: SharedRegistry = Arc::new(RwLock::new(registry));

    let local = Arc::new(
        OllamaBackend::new(
            &config.llm.local_base_url,
            &config.llm.local_model,
            config.llm.timeout_secs,
        )
        .map_err(BootstrapError::Provider)?,
    );
    let cloud = Arc::new(
        ClaudeBackend::new(
            config.llm.cloud_api_key.clone(),
            &config.llm.cloud_model,
            config.llm.timeout_secs,
        )
        .map_err(BootstrapError::Provider)?,
    );
    let router =
        Arc::new(ProviderRouter::new(local, cloud, config.llm.provider_override));

    let scheduler = Arc::new(SkillScheduler::new(registry.clone()));
    let jobs = scheduler.register_all().await;
    info!(jobs, "scheduled skills registered");

    Ok(Application { config, db_pool, store, registry, router, scheduler })
}
