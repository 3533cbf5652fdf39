//! REST object store backend for direct, unsigned uploads.
//!
//! Speaks the Cloudinary-shaped direct upload API: a multipart POST against
//! `{api_base}/{cloud_name}/auto/upload` authorized by nothing more than an
//! unsigned upload preset, and per-kind JSON list endpoints under the
//! delivery host. The upload body streams in fixed-size chunks so byte
//! progress reaches the coordinator while the request is in flight.
//!
//! Listing responses already carry each resource's delivery URL and creation
//! time, so `metadata`/`url` resolve from the handle without extra requests.

use crate::config::RestStoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::object_store::{
    display_name_from_key, ObjectHandle, ObjectMetadata, ObjectStore, ProgressSender,
    StoredObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

/// Upload body chunk size; one progress tick per chunk.
const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// Resource kinds the list endpoints are queried for.
const RESOURCE_KINDS: [&str; 2] = ["image", "video"];

/// REST-backed object store
pub struct RestObjectStore {
    http: Client,
    config: RestStoreConfig,
}

/// Direct upload API response
#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    created_at: DateTime<Utc>,
}

/// List endpoint response
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<ListedResource>,
}

#[derive(Debug, Deserialize)]
struct ListedResource {
    public_id: String,
    format: Option<String>,
    created_at: DateTime<Utc>,
}

impl RestObjectStore {
    /// Create a new REST object store
    pub fn new(config: RestStoreConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("guest-gallery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::config_error(e.to_string()))?;

        info!(cloud_name = %config.cloud_name, "REST object store initialized");

        Ok(Self { http, config })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/{}/auto/upload",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    fn list_url(&self, resource_kind: &str, tag: &str) -> String {
        format!(
            "{}/{}/{}/list/{}.json",
            self.config.delivery_base_url.trim_end_matches('/'),
            self.config.cloud_name,
            resource_kind,
            tag
        )
    }

    fn delivery_url(&self, resource_kind: &str, public_id: &str, format: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}/{}/upload/{}",
            self.config.delivery_base_url.trim_end_matches('/'),
            self.config.cloud_name,
            resource_kind,
            public_id
        );
        if let Some(format) = format {
            url.push('.');
            url.push_str(format);
        }
        url
    }
}

/// Wrap a payload in a streaming body that ticks `progress` per chunk as the
/// connection consumes it.
fn progress_body(data: Bytes, progress: ProgressSender) -> reqwest::Body {
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(STREAM_CHUNK_BYTES)
        .map(|start| data.slice(start..(start + STREAM_CHUNK_BYTES).min(data.len())))
        .collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress.sent(sent);
        Ok::<Bytes, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(stream)
}

/// The logical namespace doubles as the listing tag.
fn tag_from_prefix(prefix: &str) -> &str {
    let trimmed = prefix.trim_matches('/');
    trimmed.split('/').next().unwrap_or(trimmed)
}

#[async_trait]
impl ObjectStore for RestObjectStore {
    #[instrument(skip(self, data, progress), fields(key = %key, size_bytes = data.len()))]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        progress: ProgressSender,
    ) -> StoreResult<StoredObject> {
        let total_bytes = data.len() as u64;
        let tag = tag_from_prefix(key).to_string();

        // The store derives the delivery extension from the payload, so the
        // public id is the key without its extension.
        let public_id = key
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(key)
            .to_string();

        let file_part = Part::stream_with_length(progress_body(data, progress.clone()), total_bytes)
            .file_name(display_name_from_key(key))
            .mime_str(content_type)
            .map_err(|e| StoreError::upload_failed(e.to_string()))?;

        let form = Form::new()
            .text("upload_preset", self.config.upload_preset.clone())
            .text("public_id", public_id)
            .text("tags", tag)
            .part("file", file_part);

        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::upload_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::upload_failed(format!("{status}: {body}")));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| StoreError::upload_failed(e.to_string()))?;

        progress.complete();
        debug!(public_id = %parsed.public_id, "Object uploaded");

        Ok(StoredObject {
            key: parsed.public_id,
            url: parsed.secure_url,
            created_at: parsed.created_at,
        })
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectHandle>> {
        let tag = tag_from_prefix(prefix);
        let mut handles = Vec::new();

        for kind in RESOURCE_KINDS {
            let url = self.list_url(kind, tag);
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| StoreError::list_failed(e.to_string()))?;

            // A tag nothing has been uploaded under yet lists as 404.
            if response.status() == StatusCode::NOT_FOUND {
                debug!(kind, tag, "No resources listed");
                continue;
            }

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::list_failed(format!("{status}: {body}")));
            }

            let parsed: ListResponse = response
                .json()
                .await
                .map_err(|e| StoreError::list_failed(e.to_string()))?;

            for resource in parsed.resources {
                handles.push(ObjectHandle {
                    display_name: display_name_from_key(&resource.public_id),
                    url: Some(self.delivery_url(
                        kind,
                        &resource.public_id,
                        resource.format.as_deref(),
                    )),
                    created_at: Some(resource.created_at),
                    key: resource.public_id,
                });
            }
        }

        debug!(tag, count = handles.len(), "Listed resources");
        Ok(handles)
    }

    async fn metadata(&self, handle: &ObjectHandle) -> StoreResult<ObjectMetadata> {
        let created_at = handle.created_at.ok_or_else(|| {
            warn!(key = %handle.key, "Handle missing creation time from listing");
            StoreError::metadata_failed("listing carried no creation timestamp")
        })?;

        Ok(ObjectMetadata {
            created_at,
            size_bytes: None,
            original_name: Some(handle.display_name.clone()),
        })
    }

    async fn url(&self, handle: &ObjectHandle) -> StoreResult<String> {
        handle
            .url
            .clone()
            .ok_or_else(|| StoreError::url_failed("listing carried no delivery URL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestStoreConfig;

    fn test_config() -> RestStoreConfig {
        serde_json::from_str(
            r#"{"cloud_name": "demo", "upload_preset": "guest_uploads"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let store = RestObjectStore::new(test_config()).unwrap();
        assert_eq!(
            store.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );
        assert_eq!(
            store.list_url("image", "uploads"),
            "https://res.cloudinary.com/demo/image/list/uploads.json"
        );
        assert_eq!(
            store.delivery_url("video", "uploads/2026-08-07/a_b_clip", Some("mp4")),
            "https://res.cloudinary.com/demo/video/upload/uploads/2026-08-07/a_b_clip.mp4"
        );
    }

    #[test]
    fn test_tag_from_prefix() {
        assert_eq!(tag_from_prefix("uploads"), "uploads");
        assert_eq!(tag_from_prefix("uploads/2026-08-07/x"), "uploads");
        assert_eq!(tag_from_prefix("/uploads/"), "uploads");
    }

    #[test]
    fn test_upload_response_parsing() {
        let parsed: UploadResponse = serde_json::from_str(
            r#"{
                "public_id": "uploads/2026-08-07/103000123_9f8_photo",
                "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/uploads/2026-08-07/103000123_9f8_photo.jpg",
                "created_at": "2026-08-07T10:30:00Z",
                "bytes": 48213,
                "resource_type": "image"
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.public_id, "uploads/2026-08-07/103000123_9f8_photo");
        assert!(parsed.secure_url.starts_with("https://"));
    }

    #[test]
    fn test_list_response_parsing() {
        let parsed: ListResponse = serde_json::from_str(
            r#"{
                "resources": [
                    {"public_id": "uploads/a", "format": "jpg", "created_at": "2026-08-07T10:30:00Z"},
                    {"public_id": "uploads/b", "created_at": "2026-08-06T09:00:00Z"}
                ],
                "updated_at": "2026-08-07T11:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.resources.len(), 2);
        assert_eq!(parsed.resources[0].format.as_deref(), Some("jpg"));
        assert!(parsed.resources[1].format.is_none());
    }

    #[tokio::test]
    async fn test_metadata_and_url_resolve_from_handle() {
        let store = RestObjectStore::new(test_config()).unwrap();
        let handle = ObjectHandle {
            key: "uploads/2026-08-07/103000123_9f8_photo".to_string(),
            display_name: "photo".to_string(),
            url: Some("https://res.cloudinary.com/demo/image/upload/uploads/a.jpg".to_string()),
            created_at: Some(Utc::now()),
        };

        let metadata = store.metadata(&handle).await.unwrap();
        assert_eq!(metadata.original_name.as_deref(), Some("photo"));
        assert!(store.url(&handle).await.unwrap().starts_with("https://"));

        let bare = ObjectHandle {
            key: "x".to_string(),
            display_name: "x".to_string(),
            url: None,
            created_at: None,
        };
        assert!(store.metadata(&bare).await.is_err());
        assert!(store.url(&bare).await.is_err());
    }
}
