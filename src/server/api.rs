use super::handler::{HandlerError, StatsHandler};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "Package Metrics Service";

/// Shared state for the HTTP front end
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<StatsHandler>,
    /// Background processing of accepted requests
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(handler: Arc<StatsHandler>) -> Self {
        Self {
            handler,
            tasks: TaskTracker::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route(
            "/DownloadEvent",
            post(download_event).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /
pub async fn health_check() -> impl IntoResponse {
    format!("{}: OK", SERVICE_NAME)
}

/// POST /DownloadEvent
///
/// Responds once the body has been parsed; storage writes continue in the
/// background.
pub async fn download_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, HandlerError> {
    let events = state.handler.parse(&body)?;

    let handler = state.handler.clone();
    state.tasks.spawn(async move {
        handler.process(events).await;
    });

    Ok(StatusCode::ACCEPTED)
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        "Only HTTP POST requests are accepted",
    )
        .into_response()
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Page is not found").into_response()
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Rejected download event request");
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}
