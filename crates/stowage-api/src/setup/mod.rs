//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use stowage_core::Config;
use stowage_db::{AttachmentRepository, ContentRepository};
use stowage_services::{create_storage, StowageServices};

/// Validate config, connect the collaborators, start the sweep scheduler and
/// build the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config
        .validate()
        .context("Configuration validation failed")?;

    stowage_infra::init_telemetry(None)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        production = config.is_production(),
        storage_backend = ?config.storage_backend(),
        "Configuration loaded and validated successfully"
    );

    let pool = stowage_db::setup_database(&config).await?;

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;

    let services = StowageServices::build(
        &config,
        storage,
        Arc::new(AttachmentRepository::new(pool.clone())),
        Arc::new(ContentRepository::new(pool)),
    );

    let scheduler = Arc::new(services.sweep_scheduler(&config));
    let _sweep_task = scheduler.start();
    tracing::info!(
        interval_secs = config.sweep_interval().as_secs(),
        "Temp sweep scheduler started"
    );

    let state = Arc::new(AppState::new(config.clone(), services));
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
