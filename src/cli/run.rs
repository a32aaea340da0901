use crate::catalog::{CatalogError, CatalogPipeline, FileCatalog, PipelineConfig, SinkError};
use crate::config::{load_config, CatalogConfig, Config, ConfigError};
use crate::server::{run_server, AppState, StatsHandler};
use crate::storage::{
    CatalogMetricsStorage, DatabaseMetricsStorage, DuckDbPackageStore, MetricsStorage,
    PackageStore, StorageError,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config not found; searched ~/.config/pkgstats/config.yml and /etc/pkgstats/config.yml. Use --config <path> or run 'pkgstats config init'")]
    ConfigNotFound,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("catalog sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("HTTP server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config_path = config_path.ok_or(RunError::ConfigNotFound)?;

    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(&config_path)?;

    run_service(config).await
}

async fn run_service(config: Config) -> Result<(), RunError> {
    info!(path = %config.database.path.display(), "Opening gallery database");
    let store: Arc<dyn PackageStore> = Arc::new(DuckDbPackageStore::new(
        &config.database.path,
        config.database.command_timeout,
    )?);

    let mut storages: Vec<Arc<dyn MetricsStorage>> = Vec::new();

    if config.records_downloads() {
        info!("Recording downloads in the gallery database");
        storages.push(Arc::new(DatabaseMetricsStorage::new(store.clone())));
    }

    let pipeline = match config.enabled_catalog() {
        Some(catalog_config) => {
            let pipeline = start_catalog(catalog_config).await?;
            storages.push(Arc::new(CatalogMetricsStorage::new(
                store.clone(),
                pipeline.clone(),
            )));
            Some(pipeline)
        }
        None => None,
    };

    let handler = Arc::new(StatsHandler::new(storages));
    let state = AppState::new(handler.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listen = config.server.listen.clone();
    let mut server_handle =
        tokio::spawn(async move { run_server(&listen, state, shutdown_rx).await });

    info!("Service started, press Ctrl+C to shutdown");

    let server_result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            (&mut server_handle).await
        }
        result = &mut server_handle => result,
    };

    // Accepted requests have been processed once the server returns, so the
    // catalog sees every record before it is closed.
    if let Some(pipeline) = pipeline {
        let report = pipeline.shutdown().await;
        info!(
            committed = report.committed,
            failed = report.failed,
            "Catalog flushed"
        );
    }

    info!(processed = handler.processed(), "Service shutdown complete");

    match server_result? {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "HTTP server stopped with an error");
            Err(e.into())
        }
    }
}

async fn start_catalog(catalog_config: &CatalogConfig) -> Result<CatalogPipeline, RunError> {
    let instance_id = catalog_config.instance_id.as_deref().unwrap_or("default");
    info!(
        directory = %catalog_config.directory.display(),
        instance_id,
        "Starting catalog"
    );

    let sink = Arc::new(
        FileCatalog::open(
            &catalog_config.directory,
            instance_id,
            &catalog_config.base_address,
            catalog_config.page_size,
        )
        .await?,
    );

    Ok(CatalogPipeline::start(
        PipelineConfig::from(catalog_config),
        sink,
    )?)
}
