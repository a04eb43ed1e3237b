//! Seam between the view-model and the page's HTTP transport.
//!
//! The page implements [`DashboardApi`] with whatever fetch primitive its host
//! provides (browser `fetch`, a native HTTP client) and hands it to
//! [`Dashboard`](crate::Dashboard). Implementations decode responses with
//! [`decode_response`] so status and body errors map to [`ApiClientError`] the
//! same way everywhere.

use crate::error::ApiClientError;
use crate::upload::{UploadPayload, UploadReceipt};
use async_trait::async_trait;
use laptimes_pipeline::FlatLapRecord;
use serde::de::DeserializeOwned;

/// Transport to the laptimes API, supplied by the hosting page
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// `GET /api/data`: every stored record
    async fn fetch_records(&self) -> Result<Vec<FlatLapRecord>, ApiClientError>;

    /// `POST /api/data`
    async fn upload(&self, payload: &UploadPayload) -> Result<UploadReceipt, ApiClientError>;
}

/// Decode a JSON response body, rejecting non-2xx statuses
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ApiClientError> {
    if !(200..300).contains(&status) {
        return Err(ApiClientError::Status(status));
    }
    serde_json::from_slice(body).map_err(|e| ApiClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_records() {
        let body = br#"[{
            "RaceId": "r-1", "LapTimestamp": 1682942400000, "RaceName": "Heat 1",
            "TrackName": "Spa", "RaceNotes": "", "DriverName": "Max",
            "LapNumber": 0, "LapTime": 6296, "LapDateTime": "2023-05-01T12:00:00.000Z"
        }]"#;
        let records: Vec<FlatLapRecord> = decode_response(200, body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].driver_name, "Max");
    }

    struct CannedApi {
        status: u16,
        body: &'static [u8],
    }

    #[async_trait]
    impl DashboardApi for CannedApi {
        async fn fetch_records(&self) -> Result<Vec<FlatLapRecord>, ApiClientError> {
            decode_response(self.status, self.body)
        }

        async fn upload(&self, _payload: &UploadPayload) -> Result<UploadReceipt, ApiClientError> {
            decode_response(self.status, br#"{"message": "File uploaded successfully", "fileName": "1-a.json"}"#)
        }
    }

    #[test]
    fn test_transport_built_on_decode_response() {
        let api = CannedApi {
            status: 503,
            body: b"",
        };
        let err = tokio_test::block_on(api.fetch_records()).unwrap_err();
        assert_eq!(err.to_string(), "HTTP error! status: 503");

        let api = CannedApi {
            status: 200,
            body: b"[]",
        };
        assert!(tokio_test::block_on(api.fetch_records()).unwrap().is_empty());

        let payload = UploadPayload {
            file_name: "a.json".to_string(),
            file_content: "e30=".to_string(),
        };
        let receipt = tokio_test::block_on(api.upload(&payload)).unwrap();
        assert_eq!(receipt.file_name, "1-a.json");
    }

    #[test]
    fn test_decode_errors() {
        let err = decode_response::<Vec<FlatLapRecord>>(500, b"{}").unwrap_err();
        assert!(matches!(err, ApiClientError::Status(500)));

        let err = decode_response::<Vec<FlatLapRecord>>(200, b"<html>").unwrap_err();
        assert!(matches!(err, ApiClientError::Decode(_)));
    }
}
