//! Laptimes Pipeline - lap record ingestion for the laptimes tracker
//!
//! This library turns uploaded race timing files into flat lap records and
//! moves them between the storage services the tracker runs on:
//!
//! - Race documents (race → driver → lap) uploaded as JSON blobs
//! - Flat lap records written to the record store
//! - Relocation of processed blobs to `<base>-completed.json`
//!
//! ```text
//! upload ──▶ blob store ──▶ IngestProcessor ──▶ record store ──▶ full scan
//!                 ▲               │
//!                 └── relocate ◀──┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use laptimes_pipeline::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let blobs = Arc::new(InMemoryBlobStore::new());
//!     let records = Arc::new(InMemoryRecordStore::new());
//!     let processor = IngestProcessor::new(blobs, records, ProcessorOptions::default());
//!
//!     processor.process_object("1700000000000-race.json").await?;
//!     Ok(())
//! }
//! ```

pub mod blob_store;
pub mod config;
pub mod error;
pub mod flattener;
pub mod model;
pub mod processor;
pub mod record_store;

// Re-export main types
pub use blob_store::{relocate_completed, BlobStore, InMemoryBlobStore, S3BlobStore};
pub use config::{ConfigError, DatabaseConfig, LoggingConfig, S3Config};
pub use error::{PipelineError, Result};
pub use flattener::{
    completed_key, flatten, is_completed_key, flatten_with_context, legacy_document_context, parse_upload,
    DocumentContext,
};
pub use model::{FlatLapRecord, RawDriver, RawLap, RawRace, RawRaceData, RawRaceDocument};
pub use processor::{
    IngestProcessor, ProcessingFailure, ProcessingOutcome, ProcessorOptions, S3Event,
    ALREADY_COMPLETED_MESSAGE, SUCCESS_MESSAGE,
};
pub use record_store::{InMemoryRecordStore, PgRecordStore, RecordStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blob_store::{BlobStore, InMemoryBlobStore, S3BlobStore};
    pub use crate::error::PipelineError;
    pub use crate::model::FlatLapRecord;
    pub use crate::processor::{IngestProcessor, ProcessingOutcome, ProcessorOptions, S3Event};
    pub use crate::record_store::{InMemoryRecordStore, PgRecordStore, RecordStore};
}
