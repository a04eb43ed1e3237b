//! Blob storage for uploaded race files.
//!
//! Uploads land in the bucket under their upload key. Once a file has been
//! fully processed it is relocated to `<base>-completed.json`: copied to the
//! new key, then the original is deleted.

use crate::config::S3Config;
use crate::error::{PipelineError, Result};
use crate::flattener::completed_key;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

/// Object storage holding uploaded race files
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob; a missing key yields [`PipelineError::BlobNotFound`]
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write a blob, replacing any existing content
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Copy a blob to a new key within the same store
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Delete a blob
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Move a processed blob aside by copying it to its completed key and
/// deleting the original. Returns the new key.
#[instrument(skip(store))]
pub async fn relocate_completed(store: &dyn BlobStore, key: &str) -> Result<String> {
    let target = completed_key(key);

    store
        .copy(key, &target)
        .await
        .map_err(|e| PipelineError::Relocation {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    store
        .delete(key)
        .await
        .map_err(|e| PipelineError::Relocation {
            key: key.to_string(),
            message: e.to_string(),
        })?;

    debug!(from = %key, to = %target, "Relocated processed blob");
    Ok(target)
}

/// S3-backed blob store
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 blob store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    PipelineError::BlobNotFound {
                        key: key.to_string(),
                    }
                } else {
                    PipelineError::Blob(format!("Failed to get {}: {}", key, e))
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::Blob(format!("Failed to read {}: {}", key, e)))?
            .into_bytes();

        debug!(size_bytes = bytes.len(), "Fetched blob");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PipelineError::Blob(format!("Failed to put {}: {}", key, e)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, encode_copy_source_key(from)))
            .key(to)
            .send()
            .await
            .map_err(|e| PipelineError::Blob(format!("Failed to copy {} to {}: {}", from, to, e)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| PipelineError::Blob(format!("Failed to delete {}: {}", key, e)))?;

        Ok(())
    }
}

/// Percent-encode a key for the `x-amz-copy-source` header, keeping `/`
fn encode_copy_source_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// In-process blob store, used for local runs and tests
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in lexical order
    pub fn keys(&self) -> Vec<String> {
        self.blobs.lock().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().contains_key(key)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::BlobNotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), body);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let mut blobs = self.blobs.lock();
        let body = blobs
            .get(from)
            .cloned()
            .ok_or_else(|| PipelineError::BlobNotFound {
                key: from.to_string(),
            })?;
        blobs.insert(to.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.lock().remove(key);
        Ok(())
    }
}
