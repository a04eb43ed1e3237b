//! Errors raised by the dashboard's API client and upload flow.

use thiserror::Error;

/// Shown when the upload form is submitted incomplete
pub const UPLOAD_PRECONDITION_MESSAGE: &str = "Please select a file and enter a track name.";

/// Errors from talking to the laptimes API
#[derive(Error, Debug)]
pub enum ApiClientError {
    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

/// Errors raised by the upload flow
#[derive(Error, Debug)]
pub enum UploadError {
    /// File or track name missing; nothing was sent
    #[error("{}", UPLOAD_PRECONDITION_MESSAGE)]
    MissingInput,

    #[error("Selected file is not valid JSON: {0}")]
    InvalidFile(#[from] serde_json::Error),

    #[error("Selected file must contain a JSON object")]
    NotAnObject,

    #[error(transparent)]
    Api(#[from] ApiClientError),
}

impl UploadError {
    /// Precondition failures are reported before any request is made
    pub fn is_precondition(&self) -> bool {
        matches!(self, UploadError::MissingInput)
    }
}
