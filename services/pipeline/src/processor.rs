//! Ingestion processor.
//!
//! Runs once per uploaded blob: fetch, parse, flatten, write every record,
//! then relocate the blob. Preconditions are checked for every document
//! before the first write, so a missing track name never reaches the store.

use crate::blob_store::{relocate_completed, BlobStore};
use crate::error::{PipelineError, Result};
use crate::flattener::{
    flatten_with_context, is_completed_key, legacy_document_context, parse_upload,
    DocumentContext,
};
use crate::model::FlatLapRecord;
use crate::record_store::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Body returned when a blob was fully processed
pub const SUCCESS_MESSAGE: &str = "Data processed successfully and file renamed";

/// Body returned when every referenced key was already processed
pub const ALREADY_COMPLETED_MESSAGE: &str = "File already processed, nothing to do";

/// Object storage put notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// URL-encoded object key, spaces as `+`
    pub key: String,
}

/// One blob to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl S3Event {
    /// Decoded object references carried by the notification
    pub fn objects(&self) -> Vec<ObjectRef> {
        self.records
            .iter()
            .map(|record| ObjectRef {
                bucket: record.s3.bucket.name.clone(),
                key: decode_object_key(&record.s3.object.key),
            })
            .collect()
    }
}

/// Decode a notification object key: `+` is a space, `%XX` an escaped byte.
/// Malformed escapes are kept verbatim.
pub fn decode_object_key(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

/// Outcome of processing one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Records written and blob relocated
    Processed {
        documents: usize,
        records_written: usize,
        relocated_to: String,
    },
    /// The key names an already processed blob
    AlreadyCompleted,
}

/// Processor options
#[derive(Debug, Clone, Default)]
pub struct ProcessorOptions {
    /// Fall back to `<track>-<notes>.json` key naming when a document has no track name
    pub allow_legacy_filename_track: bool,
    /// Bucket the blob store reads from; notifications for any other bucket are rejected
    pub bucket: Option<String>,
}

/// Turns uploaded blobs into stored lap records
pub struct IngestProcessor {
    blob_store: Arc<dyn BlobStore>,
    record_store: Arc<dyn RecordStore>,
    options: ProcessorOptions,
}

impl IngestProcessor {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        record_store: Arc<dyn RecordStore>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            blob_store,
            record_store,
            options,
        }
    }

    /// Process every object referenced by a put notification, in order.
    /// Stops at the first failure.
    ///
    /// A record for a bucket other than the configured one rejects the whole
    /// notification before anything is read.
    pub async fn process_event(&self, event: &S3Event) -> Result<Vec<ProcessingOutcome>> {
        let objects = event.objects();

        if let Some(expected) = self.options.bucket.as_deref() {
            if let Some(foreign) = objects.iter().find(|o| o.bucket != expected) {
                warn!(bucket = %foreign.bucket, expected = %expected, "Notification for foreign bucket");
                return Err(PipelineError::UnexpectedBucket {
                    bucket: foreign.bucket.clone(),
                    expected: expected.to_string(),
                });
            }
        }

        let mut outcomes = Vec::with_capacity(objects.len());
        for object in objects {
            outcomes.push(self.process_object(&object.key).await?);
        }
        Ok(outcomes)
    }

    /// Process one uploaded blob
    #[instrument(skip(self), fields(run_id = %Uuid::new_v4()))]
    pub async fn process_object(&self, key: &str) -> Result<ProcessingOutcome> {
        if is_completed_key(key) {
            info!(key = %key, "Blob already processed, skipping");
            return Ok(ProcessingOutcome::AlreadyCompleted);
        }

        let result = self.process_pending(key).await;

        match &result {
            Ok(outcome) => {
                metrics::counter!("laptimes.uploads.processed").increment(1);
                info!(key = %key, outcome = ?outcome, "Data processed and stored successfully");
            }
            Err(e) => {
                metrics::counter!("laptimes.uploads.failed").increment(1);
                error!(key = %key, error = %e, "Error processing data");
            }
        }

        result
    }

    async fn process_pending(&self, key: &str) -> Result<ProcessingOutcome> {
        let body = self.blob_store.get(key).await?;
        let records = self.flatten_upload(key, &body)?;
        let documents = records.len();
        let records: Vec<FlatLapRecord> = records.into_iter().flatten().collect();

        let records_written = self.record_store.put_all(&records).await?;

        let relocated_to = relocate_completed(self.blob_store.as_ref(), key)
            .await
            .map_err(|e| {
                warn!(
                    key = %key,
                    records_written = records_written,
                    "Records stored but blob relocation failed"
                );
                e
            })?;

        Ok(ProcessingOutcome::Processed {
            documents,
            records_written,
            relocated_to,
        })
    }

    /// Parse and flatten every document in the blob, without side effects
    fn flatten_upload(&self, key: &str, body: &[u8]) -> Result<Vec<Vec<FlatLapRecord>>> {
        parse_upload(body)?
            .iter()
            .map(|doc| {
                let context = match DocumentContext::from_document(doc) {
                    Ok(context) => context,
                    Err(e) if self.options.allow_legacy_filename_track => {
                        let context = legacy_document_context(key).ok_or(e)?;
                        warn!(
                            key = %key,
                            track = %context.track_name,
                            "Using deprecated filename track naming"
                        );
                        context
                    }
                    Err(e) => return Err(e),
                };
                flatten_with_context(doc, &context)
            })
            .collect()
    }
}

/// Failure body reported upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingFailure {
    pub message: String,
}

impl From<PipelineError> for ProcessingFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            message: format!("Error processing data: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{InMemoryBlobStore, MockBlobStore};
    use crate::record_store::{InMemoryRecordStore, MockRecordStore};
    use serde_json::json;

    fn sample_document() -> serde_json::Value {
        json!({
            "trackName": "Test Track",
            "notes": "Test Notes",
            "data": {
                "races": [{
                    "uuid": "race-1",
                    "name": "Heat 1",
                    "date": "2023-05-01T10:00:00Z",
                    "drivers": [
                        {
                            "name": "Driver 1",
                            "laps": [
                                {"kind": "outlap", "endTimestamp": 40000, "duration": 4000},
                                {"kind": "normal", "endTimestamp": 101000, "duration": 6100},
                                {"kind": "normal", "endTimestamp": 163000, "duration": 6200}
                            ]
                        },
                        {
                            "name": "Driver 2",
                            "laps": [
                                {"kind": "normal", "endTimestamp": 63000, "duration": 6300}
                            ]
                        }
                    ]
                }]
            }
        })
    }

    async fn seeded_blobs(key: &str, body: &serde_json::Value) -> Arc<InMemoryBlobStore> {
        let blobs = Arc::new(InMemoryBlobStore::new());
        blobs
            .put(key, serde_json::to_vec(body).unwrap(), "application/json")
            .await
            .unwrap();
        blobs
    }

    #[tokio::test]
    async fn test_processes_and_relocates() {
        let blobs = seeded_blobs("test-file.json", &sample_document()).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let processor =
            IngestProcessor::new(blobs.clone(), records.clone(), ProcessorOptions::default());

        let outcome = processor.process_object("test-file.json").await.unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::Processed {
                documents: 1,
                records_written: 3,
                relocated_to: "test-file-completed.json".to_string(),
            }
        );
        assert_eq!(blobs.keys(), vec!["test-file-completed.json".to_string()]);

        let stored = records.scan_all().await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|r| r.track_name == "Test Track"));
        assert_eq!(stored[0].lap_number, 1);
    }

    #[tokio::test]
    async fn test_missing_track_name_writes_nothing() {
        let mut body = sample_document();
        body.as_object_mut().unwrap().remove("trackName");
        let blobs = seeded_blobs("test-file.json", &body).await;

        let mut records = MockRecordStore::new();
        records.expect_put().never();
        records.expect_put_all().never();

        let processor =
            IngestProcessor::new(blobs.clone(), Arc::new(records), ProcessorOptions::default());
        let err = processor.process_object("test-file.json").await.unwrap_err();

        assert_eq!(
            ProcessingFailure::from(err).message,
            "Error processing data: TrackName is missing"
        );
        assert!(blobs.contains("test-file.json"));
    }

    #[tokio::test]
    async fn test_missing_data_reports_races() {
        let body = json!({"trackName": "Test Track", "notes": "Test Notes"});
        let blobs = seeded_blobs("test-file.json", &body).await;
        let processor = IngestProcessor::new(
            blobs,
            Arc::new(InMemoryRecordStore::new()),
            ProcessorOptions::default(),
        );

        let err = processor.process_object("test-file.json").await.unwrap_err();
        assert!(err.to_string().contains("races"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        blobs
            .put("bad.json", b"Invalid JSON".to_vec(), "application/json")
            .await
            .unwrap();
        let processor = IngestProcessor::new(
            blobs.clone(),
            Arc::new(InMemoryRecordStore::new()),
            ProcessorOptions::default(),
        );

        let err = processor.process_object("bad.json").await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert!(blobs.contains("bad.json"));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_blob_in_place() {
        let blobs = seeded_blobs("test-file.json", &sample_document()).await;
        let mut records = MockRecordStore::new();
        records.expect_put_all().times(1).returning(|_| {
            Err(PipelineError::StoreWrite {
                index: 1,
                message: "ProvisionedThroughputExceeded".to_string(),
            })
        });

        let processor =
            IngestProcessor::new(blobs.clone(), Arc::new(records), ProcessorOptions::default());
        let err = processor.process_object("test-file.json").await.unwrap_err();

        assert!(matches!(err, PipelineError::StoreWrite { index: 1, .. }));
        assert_eq!(blobs.keys(), vec!["test-file.json".to_string()]);
    }

    #[tokio::test]
    async fn test_relocation_failure_keeps_written_records() {
        let body = serde_json::to_vec(&sample_document()).unwrap();
        let mut blobs = MockBlobStore::new();
        blobs
            .expect_get()
            .times(1)
            .returning(move |_| Ok(body.clone()));
        blobs
            .expect_copy()
            .times(1)
            .returning(|_, _| Err(PipelineError::Blob("access denied".to_string())));
        blobs.expect_delete().never();

        let records = Arc::new(InMemoryRecordStore::new());
        let processor =
            IngestProcessor::new(Arc::new(blobs), records.clone(), ProcessorOptions::default());
        let err = processor.process_object("test-file.json").await.unwrap_err();

        assert!(matches!(err, PipelineError::Relocation { .. }));
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let processor = IngestProcessor::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryRecordStore::new()),
            ProcessorOptions::default(),
        );
        let err = processor.process_object("nope.json").await.unwrap_err();
        assert!(matches!(err, PipelineError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_completed_keys_are_skipped() {
        let processor = IngestProcessor::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryRecordStore::new()),
            ProcessorOptions::default(),
        );
        assert_eq!(
            processor.process_object("race-completed.json").await.unwrap(),
            ProcessingOutcome::AlreadyCompleted
        );
    }

    #[tokio::test]
    async fn test_array_upload_checks_every_document_before_writing() {
        let mut second = sample_document();
        second.as_object_mut().unwrap().remove("trackName");
        let body = json!([sample_document(), second]);
        let blobs = seeded_blobs("batch.json", &body).await;
        let records = Arc::new(InMemoryRecordStore::new());

        let processor =
            IngestProcessor::new(blobs, records.clone(), ProcessorOptions::default());
        assert!(processor.process_object("batch.json").await.is_err());
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_filename_track() {
        let mut body = sample_document();
        body.as_object_mut().unwrap().remove("trackName");
        body.as_object_mut().unwrap().remove("notes");
        let blobs = seeded_blobs("Genk-wet.json", &body).await;
        let records = Arc::new(InMemoryRecordStore::new());

        let processor = IngestProcessor::new(
            blobs,
            records.clone(),
            ProcessorOptions {
                allow_legacy_filename_track: true,
                ..ProcessorOptions::default()
            },
        );
        processor.process_object("Genk-wet.json").await.unwrap();

        let stored = records.scan_all().await.unwrap();
        assert!(stored.iter().all(|r| r.track_name == "Genk" && r.race_notes == "wet"));
    }

    #[tokio::test]
    async fn test_process_event_decodes_keys() {
        let blobs = seeded_blobs("my race.json", &sample_document()).await;
        let processor = IngestProcessor::new(
            blobs.clone(),
            Arc::new(InMemoryRecordStore::new()),
            ProcessorOptions::default(),
        );
        let event: S3Event = serde_json::from_value(json!({
            "Records": [{"s3": {"bucket": {"name": "uploads"}, "object": {"key": "my+race.json"}}}]
        }))
        .unwrap();

        let outcomes = processor.process_event(&event).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(blobs.contains("my race-completed.json"));
    }

    #[tokio::test]
    async fn test_process_event_rejects_foreign_bucket() {
        let blobs = seeded_blobs("race.json", &sample_document()).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let processor = IngestProcessor::new(
            blobs.clone(),
            records.clone(),
            ProcessorOptions {
                bucket: Some("uploads".to_string()),
                ..ProcessorOptions::default()
            },
        );
        let event: S3Event = serde_json::from_value(json!({
            "Records": [
                {"s3": {"bucket": {"name": "uploads"}, "object": {"key": "race.json"}}},
                {"s3": {"bucket": {"name": "someone-else"}, "object": {"key": "race.json"}}}
            ]
        }))
        .unwrap();

        let err = processor.process_event(&event).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnexpectedBucket { ref bucket, .. } if bucket == "someone-else"
        ));
        assert!(err.is_precondition());
        assert!(records.is_empty());
        assert!(blobs.contains("race.json"));
    }

    #[tokio::test]
    async fn test_completed_looking_key_is_skipped_without_writes() {
        let blobs = seeded_blobs("1700000000000-heat-completed.json", &sample_document()).await;
        let records = Arc::new(InMemoryRecordStore::new());
        let processor =
            IngestProcessor::new(blobs.clone(), records.clone(), ProcessorOptions::default());

        let outcome = processor
            .process_object("1700000000000-heat-completed.json")
            .await
            .unwrap();
        assert_eq!(outcome, ProcessingOutcome::AlreadyCompleted);
        assert!(records.is_empty());
    }

    #[test]
    fn test_decode_object_key() {
        assert_eq!(decode_object_key("my+race.json"), "my race.json");
        assert_eq!(decode_object_key("a%2Bb%20c.json"), "a+b c.json");
        assert_eq!(decode_object_key("100%"), "100%");
        assert_eq!(decode_object_key("bad%zz"), "bad%zz");
    }
}
