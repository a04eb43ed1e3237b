//! Put-notification webhook.
//!
//! The bucket posts an S3 event notification for every uploaded object; each
//! referenced object is processed in order and the outcome is returned as a
//! JSON string body.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use laptimes_pipeline::{
    IngestProcessor, PipelineError, ProcessingFailure, ProcessingOutcome, S3Event,
    ALREADY_COMPLETED_MESSAGE, SUCCESS_MESSAGE,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<IngestProcessor>,
}

/// Create the webhook router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(handle_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "laptimes-ingest"
    }))
}

/// Process the objects referenced by one put notification
#[instrument(skip(state, event), fields(records = event.records.len()))]
pub async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<S3Event>,
) -> (StatusCode, Json<String>) {
    if event.records.is_empty() {
        let failure = ProcessingFailure::from(PipelineError::Validation(
            "Event contains no records".to_string(),
        ));
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(failure.message));
    }

    match state.processor.process_event(&event).await {
        Ok(outcomes) => {
            info!(objects = outcomes.len(), "Put notification handled");
            let processed = outcomes
                .iter()
                .any(|o| matches!(o, ProcessingOutcome::Processed { .. }));
            let message = if processed {
                SUCCESS_MESSAGE
            } else {
                ALREADY_COMPLETED_MESSAGE
            };
            (StatusCode::OK, Json(message.to_string()))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProcessingFailure::from(e).message),
        ),
    }
}

/// Serve the webhook until the listener fails
pub async fn start_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let router = create_router(state);

    info!(address = %addr, "Starting put notification listener");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("Notification listener error")?;

    Ok(())
}
