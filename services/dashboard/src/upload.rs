//! Upload form handling: validation, track/notes injection and encoding.

use crate::error::{UploadError, UPLOAD_PRECONDITION_MESSAGE};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A file picked in the upload form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub content: String,
}

/// Contents of the upload form at submit time
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub file: Option<SelectedFile>,
    pub track_name: String,
    pub notes: String,
}

/// Body of `POST /api/data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub file_name: String,
    /// Base64 of the JSON document
    pub file_content: String,
}

/// Response of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub message: String,
    /// Key the file was stored under
    pub file_name: String,
}

/// Status line under the upload form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadStatus {
    #[default]
    Idle,
    MissingInput,
    Uploading,
    Succeeded,
    Failed,
}

impl UploadStatus {
    pub fn message(&self) -> &'static str {
        match self {
            UploadStatus::Idle => "",
            UploadStatus::MissingInput => UPLOAD_PRECONDITION_MESSAGE,
            UploadStatus::Uploading => "Uploading...",
            UploadStatus::Succeeded => "Upload successful! You can now close this window.",
            UploadStatus::Failed => "Upload failed. Please try again.",
        }
    }
}

impl UploadForm {
    /// Build the request body, stamping the form's track name and notes
    /// onto the parsed document.
    pub fn prepare(&self) -> Result<UploadPayload, UploadError> {
        let file = match &self.file {
            Some(file) if !self.track_name.trim().is_empty() => file,
            _ => return Err(UploadError::MissingInput),
        };

        let mut document: Value = serde_json::from_str(&file.content)?;
        let fields = document.as_object_mut().ok_or(UploadError::NotAnObject)?;
        fields.insert(
            "trackName".to_string(),
            Value::String(self.track_name.trim().to_string()),
        );
        fields.insert("notes".to_string(), Value::String(self.notes.clone()));

        let encoded = STANDARD.encode(serde_json::to_vec(&document)?);

        Ok(UploadPayload {
            file_name: file.name.clone(),
            file_content: encoded,
        })
    }
}
