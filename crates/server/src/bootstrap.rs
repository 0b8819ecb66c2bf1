use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use woms_core::audit::TracingAuditSink;
use woms_core::config::{AppConfig, ConfigError, LoadOptions};
use woms_core::documents::RenderError;
use woms_core::session::TokenCodec;
use woms_db::repositories::{SqlNotificationRepository, SqlRequestRepository, SqlSignatureRepository};
use woms_db::{connect_with_config, migrations, DbPool, NotificationInbox, WorkflowStore};

use crate::api::AppState;
use crate::pdf::build_renderer;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("document renderer setup failed: {0}")]
    Renderer(#[source] RenderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        renderer = ?config.renderer.backend,
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let renderer = build_renderer(&config.renderer).map_err(BootstrapError::Renderer)?;
    let store = WorkflowStore::new(
        Arc::new(SqlRequestRepository::new(db_pool.clone())),
        Arc::new(TracingAuditSink),
    )
    .with_limits(config.listing.limits());
    let inbox = NotificationInbox::new(
        Arc::new(SqlNotificationRepository::new(db_pool.clone())),
        config.notifications.poll_interval_secs,
    );

    let state = AppState {
        store: Arc::new(store),
        inbox: Arc::new(inbox),
        signatures: Arc::new(SqlSignatureRepository::new(db_pool.clone())),
        renderer,
        tokens: Arc::new(TokenCodec::new(
            config.auth.jwt_secret.clone(),
            config.auth.token_ttl_secs,
        )),
        organization: config.organization.to_organization(),
    };

    Ok(Application { config, db_pool, state })
}
