//! SDK object store backend for S3 and S3-compatible services.
//!
//! Small payloads go up in one `put_object`; anything over the configured
//! threshold uses a multipart upload, which also gives the per-part progress
//! ticks the coordinator aggregates. URLs are presigned GETs unless a public
//! base URL (public bucket or CDN) is configured.

use crate::config::S3StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::object_store::{
    display_name_from_key, ObjectHandle, ObjectMetadata, ObjectStore, ProgressSender,
    StoredObject,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

/// Object metadata key carrying the guest-visible file name.
const ORIGINAL_NAME_META: &str = "original-name";

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    config: S3StoreConfig,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3StoreConfig) -> StoreResult<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);

        // Custom endpoint for MinIO/R2/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        // Path-style access for MinIO compatibility
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = S3Client::from_conf(builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    async fn simple_put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        original_name: &str,
    ) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .metadata(ORIGINAL_NAME_META, original_name)
            .send()
            .await
            .map_err(|e| StoreError::upload_failed(e.to_string()))?;

        Ok(())
    }

    async fn multipart_put(
        &self,
        key: &str,
        data: &Bytes,
        content_type: &str,
        original_name: &str,
        progress: &ProgressSender,
    ) -> StoreResult<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .metadata(ORIGINAL_NAME_META, original_name)
            .send()
            .await
            .map_err(|e| StoreError::upload_failed(e.to_string()))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StoreError::upload_failed("no upload ID in response"))?;

        let part_size = self.config.part_size_bytes.max(1);
        let mut completed_parts = Vec::new();
        let mut part_number = 1i32;
        let mut sent = 0u64;

        let mut offset = 0usize;
        while offset < data.len() {
            let end = (offset + part_size).min(data.len());
            let chunk = data.slice(offset..end);
            let chunk_len = chunk.len() as u64;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| StoreError::upload_failed(e.to_string()))?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );

            sent += chunk_len;
            progress.sent(sent);
            part_number += 1;
            offset = end;
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| StoreError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Resolve the fetchable URL for a key: public base when configured,
    /// presigned GET otherwise.
    async fn resolve_url(&self, key: &str) -> StoreResult<String> {
        if let Some(ref base) = self.config.public_base_url {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
        }

        let presigning_config = PresigningConfig::expires_in(self.config.presigned_url_expiry())
            .map_err(|e| StoreError::url_failed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StoreError::url_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data, progress), fields(key = %key, size_bytes = data.len()))]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        progress: ProgressSender,
    ) -> StoreResult<StoredObject> {
        let original_name = display_name_from_key(key);

        if data.len() > self.config.multipart_threshold_bytes {
            self.multipart_put(key, &data, content_type, &original_name, &progress)
                .await?;
        } else {
            self.simple_put(key, data, content_type, &original_name)
                .await?;
        }
        progress.complete();

        let url = self.resolve_url(key).await?;
        debug!(key = %key, "Object stored");

        Ok(StoredObject {
            key: key.to_string(),
            url,
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectHandle>> {
        let mut handles = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(format!("{}/", prefix.trim_matches('/')));

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StoreError::list_failed(e.to_string()))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                handles.push(ObjectHandle {
                    key: key.to_string(),
                    display_name: display_name_from_key(key),
                    url: None,
                    created_at: object
                        .last_modified()
                        .and_then(|t| t.to_millis().ok())
                        .and_then(DateTime::<Utc>::from_timestamp_millis),
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        debug!(prefix = %prefix, count = handles.len(), "Listed objects");
        Ok(handles)
    }

    async fn metadata(&self, handle: &ObjectHandle) -> StoreResult<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&handle.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) {
                    StoreError::not_found(&handle.key)
                } else {
                    StoreError::metadata_failed(e.to_string())
                }
            })?;

        let created_at = response
            .last_modified()
            .and_then(|t| t.to_millis().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .or(handle.created_at)
            .ok_or_else(|| StoreError::metadata_failed("object has no creation timestamp"))?;

        let original_name = response
            .metadata()
            .and_then(|m| m.get(ORIGINAL_NAME_META))
            .cloned();

        Ok(ObjectMetadata {
            created_at,
            size_bytes: response.content_length().map(|len| len as u64),
            original_name,
        })
    }

    async fn url(&self, handle: &ObjectHandle) -> StoreResult<String> {
        self.resolve_url(&handle.key).await
    }
}
