//! Error taxonomy for the ingestion path.
//!
//! Every failure on the way from an uploaded blob to stored lap records maps
//! to one [`PipelineError`] variant. None of them are retried automatically;
//! callers report them upstream and leave the source blob where it is.

use thiserror::Error;

/// Result alias used throughout the pipeline crate.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors that can occur while flattening, storing or relocating lap data
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required field (track name, races structure, race date) is missing or unusable
    #[error("{0}")]
    Validation(String),

    /// The uploaded blob is not valid JSON or does not match the document shape
    #[error("{0}")]
    Parse(#[from] serde_json::Error),

    /// The record store rejected a write; `index` is the first record not written
    #[error("Failed to write lap record {index}: {message}")]
    StoreWrite { index: usize, message: String },

    /// The record store could not be scanned
    #[error("Failed to read lap records: {0}")]
    StoreRead(String),

    /// The referenced blob does not exist
    #[error("Blob not found: {key}")]
    BlobNotFound { key: String },

    /// Any other blob store failure
    #[error("Blob store error: {0}")]
    Blob(String),

    /// A put notification names a bucket this service does not read from
    #[error("Notification is for bucket {bucket}, expected {expected}")]
    UnexpectedBucket { bucket: String, expected: String },

    /// Records were written but the source blob could not be moved aside
    #[error("Failed to relocate {key}: {message}")]
    Relocation { key: String, message: String },
}

impl PipelineError {
    pub fn missing_track_name() -> Self {
        PipelineError::Validation("TrackName is missing".to_string())
    }

    pub fn missing_races() -> Self {
        PipelineError::Validation(
            "data.races is missing: cannot read races from upload".to_string(),
        )
    }

    /// Whether the error was raised before any side effect took place
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::Parse(_)
                | PipelineError::BlobNotFound { .. }
                | PipelineError::UnexpectedBucket { .. }
        )
    }
}
