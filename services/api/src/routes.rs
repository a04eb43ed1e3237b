//! HTTP routes: full-scan query and base64 upload on `/api/data`.

use crate::config::ApiConfig;
use crate::error::ApiError;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use laptimes_pipeline::flattener::COMPLETED_SUFFIX;
use laptimes_pipeline::{is_completed_key, BlobStore, FlatLapRecord, RecordStore};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub record_store: Arc<dyn RecordStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub upload_prefix: String,
}

/// Upload request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: Option<String>,
    /// Base64 of the JSON document
    pub file_content: Option<String>,
}

/// Upload response body
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    /// Key the upload was stored under
    pub file_name: String,
}

/// Create the API router
pub fn create_router(state: AppState, origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/data",
            get(list_records)
                .post(upload_file)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .with_state(state)
}

fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal("handler panicked".to_string()).into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "laptimes-api"
    }))
}

/// Every stored lap record, unpaginated
#[instrument(skip(state))]
pub async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<FlatLapRecord>>, ApiError> {
    let records = state.record_store.scan_all().await?;

    metrics::counter!("laptimes.api.scans").increment(1);
    info!(count = records.len(), "Served lap records");

    Ok(Json(records))
}

/// Store an uploaded race file in the bucket; processing happens on the put notification
#[instrument(skip(state, body), fields(size_bytes = body.len()))]
pub async fn upload_file(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let request: UploadRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {}", e)))?;

    let file_name = request
        .file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("fileName is required".to_string()))?;
    let file_content = request
        .file_content
        .ok_or_else(|| ApiError::BadRequest("fileContent is required".to_string()))?;

    let content = STANDARD
        .decode(file_content.trim())
        .map_err(|e| ApiError::BadRequest(format!("fileContent is not valid base64: {}", e)))?;

    let key = upload_key(&state.upload_prefix, Utc::now().timestamp_millis(), &file_name);

    state
        .blob_store
        .put(&key, content, "application/json")
        .await?;

    metrics::counter!("laptimes.api.uploads").increment(1);
    info!(key = %key, "Stored uploaded race file");

    Ok(Json(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE.to_string(),
        file_name: key,
    }))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Object key for an upload: `<prefix><epoch-millis>-<sanitized name>`.
///
/// A key that would look already processed has its trailing `-completed`
/// rewritten to `_completed`, so the ingest path never skips a fresh upload.
pub fn upload_key(prefix: &str, epoch_millis: i64, file_name: &str) -> String {
    let key = format!("{}{}-{}", prefix, epoch_millis, sanitize_file_name(file_name));
    if !is_completed_key(&key) {
        return key;
    }

    let (stem, extension) = match key.strip_suffix(".json") {
        Some(stem) => (stem, ".json"),
        None => (key.as_str(), ""),
    };
    let stem = &stem[..stem.len() - COMPLETED_SUFFIX.len()];
    format!("{}_completed{}", stem, extension)
}

/// Keep only the final path segment and characters safe in object keys
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    base.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let origin = config.origin_header()?;
    let router = create_router(state, origin);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting laptimes API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
