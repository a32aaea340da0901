pub mod api;
pub mod handler;

pub use api::{router, AppState};
pub use handler::{HandlerError, StatsHandler};

use tokio::sync::watch;

/// Serve the download event endpoint until `shutdown_rx` flips to true, then
/// wait for accepted requests to finish processing.
pub async fn run_server(
    listen: &str,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let tasks = state.tasks.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("Listening for download events on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            tracing::info!("HTTP server shutting down gracefully");
        })
        .await?;

    tasks.close();
    tasks.wait().await;
    tracing::debug!("Background event processing finished");

    Ok(())
}
