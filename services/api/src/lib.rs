//! Laptimes API
//!
//! Serves every stored lap record to the dashboard and accepts race file
//! uploads, which are written to the bucket for the ingest service to pick up.
//!
//! ```text
//! GET  /api/data ──▶ RecordStore::scan_all
//! POST /api/data ──▶ base64 decode ──▶ BlobStore::put(<prefix><millis>-<name>)
//! ```

pub mod config;
pub mod error;
pub mod routes;

pub use config::{ApiConfig, Config};
pub use error::{ApiError, ErrorResponse};
pub use routes::{create_router, start_api_server, AppState, UploadRequest, UploadResponse};
