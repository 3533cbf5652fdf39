//! Session state and the boundary the presentation layer drives.
//!
//! A `GallerySession` owns the only mutable UI-facing state (progress
//! percentage, gallery records, loading flag) and publishes every change
//! through a watch channel. The renderer subscribes and redraws on change;
//! it never reaches into coordinator or loader internals. Two inbound
//! events exist: the guest picked files, and the page wants the gallery
//! (re)loaded.

use crate::compressor::{Compressor, ImageCompressor};
use crate::config::{Config, StoreConfig, StoreProvider};
use crate::error::GalleryResult;
use crate::gallery_loader::GalleryLoader;
use crate::object_store::{FileHandle, ObjectStore, UploadRecord};
use crate::rest_store::RestObjectStore;
use crate::s3_store::S3ObjectStore;
use crate::upload_coordinator::{BatchOutcome, ProgressPublisher, UploadCoordinator};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

/// Everything the presentation layer needs to render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RendererState {
    /// Batch completion estimate, 0..=100
    pub progress: u8,
    /// Gallery records, newest-first after a load, completion-order
    /// appended during a live session
    pub files: Vec<UploadRecord>,
    /// Raised while the gallery feed is being rebuilt
    pub is_loading: bool,
}

/// Construct the configured object store backend.
pub async fn create_object_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.provider {
        StoreProvider::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .context("store.provider is \"s3\" but [store.s3] is missing")?;
            let store = S3ObjectStore::new(s3)
                .await
                .context("Failed to initialize S3 object store")?;
            Ok(Arc::new(store) as Arc<dyn ObjectStore>)
        }
        StoreProvider::Rest => {
            let rest = config
                .rest
                .as_ref()
                .context("store.provider is \"rest\" but [store.rest] is missing")?;
            let store = RestObjectStore::new(rest.clone())
                .context("Failed to initialize REST object store")?;
            Ok(Arc::new(store) as Arc<dyn ObjectStore>)
        }
    }
}

/// One guest-facing gallery session.
pub struct GallerySession {
    coordinator: UploadCoordinator,
    loader: GalleryLoader,
    state: watch::Sender<RendererState>,
}

impl GallerySession {
    /// Wire a session from configuration: backend, compression, concurrency.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = create_object_store(&config.store).await?;
        Ok(Self::new(store, config))
    }

    /// Wire a session around an already-constructed store.
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        let compressor: Option<Arc<dyn Compressor>> = if config.compression.enabled {
            Some(Arc::new(ImageCompressor::new(config.compression.clone())))
        } else {
            None
        };

        let coordinator = UploadCoordinator::new(
            store.clone(),
            compressor,
            &config.upload,
            &config.compression,
        );
        let loader = GalleryLoader::new(store, &config.upload);
        let (state, _) = watch::channel(RendererState::default());

        Self {
            coordinator,
            loader,
            state,
        }
    }

    /// Subscribe the renderer to state changes.
    pub fn subscribe(&self) -> watch::Receiver<RendererState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> RendererState {
        self.state.borrow().clone()
    }

    /// Inbound event: the guest picked files.
    ///
    /// Drives one upload batch; successful records are appended to the
    /// published gallery in completion order once the batch settles.
    #[instrument(skip(self, files), fields(batch_size = files.len()))]
    pub async fn files_selected(&self, files: Vec<FileHandle>) -> BatchOutcome {
        let publisher: ProgressPublisher = {
            let state = self.state.clone();
            Arc::new(move |progress| {
                state.send_modify(|s| s.progress = progress);
            })
        };

        let outcome = self.coordinator.submit(files, publisher).await;

        if !outcome.records.is_empty() {
            self.state
                .send_modify(|s| s.files.extend(outcome.records.iter().cloned()));
        }

        outcome
    }

    /// Inbound event: (re)build the gallery feed.
    ///
    /// Replaces the published records wholesale. On failure the gallery is
    /// left empty and non-loading so the caller can offer a retry.
    #[instrument(skip(self))]
    pub async fn load_gallery(&self) -> GalleryResult<usize> {
        self.state.send_modify(|s| s.is_loading = true);

        match self.loader.load().await {
            Ok(records) => {
                let count = records.len();
                self.state.send_modify(|s| {
                    s.files = records;
                    s.is_loading = false;
                });
                info!(count, "Gallery loaded");
                Ok(count)
            }
            Err(e) => {
                self.state.send_modify(|s| {
                    s.files.clear();
                    s.is_loading = false;
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressionConfig, ServiceConfig, UploadConfig};
    use crate::error::{GalleryError, StoreError};
    use crate::object_store::{MockObjectStore, ObjectHandle, ObjectMetadata, StoredObject};
    use chrono::{TimeZone, Utc};

    fn test_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            store: StoreConfig {
                provider: StoreProvider::S3,
                s3: None,
                rest: None,
            },
            upload: UploadConfig::default(),
            compression: CompressionConfig {
                enabled: false,
                ..CompressionConfig::default()
            },
        }
    }

    fn session_with(store: MockObjectStore) -> GallerySession {
        GallerySession::new(Arc::new(store), &test_config())
    }

    #[tokio::test]
    async fn test_initial_state() {
        let session = session_with(MockObjectStore::new());
        let state = session.current();
        assert_eq!(state.progress, 0);
        assert!(state.files.is_empty());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_files_selected_appends_and_settles() {
        let mut store = MockObjectStore::new();
        store.expect_put().returning(|key, _data, _ct, progress| {
            progress.complete();
            Ok(StoredObject {
                key: key.to_string(),
                url: format!("https://cdn.example.test/{key}"),
                created_at: Utc::now(),
            })
        });
        let session = session_with(store);

        let outcome = session
            .files_selected(vec![
                FileHandle::new("a.jpg", "image/jpeg", vec![1u8; 256]),
                FileHandle::new("b.mp4", "video/mp4", vec![2u8; 256]),
            ])
            .await;

        assert_eq!(outcome.records.len(), 2);
        let state = session.current();
        assert_eq!(state.progress, 100);
        assert_eq!(state.files.len(), 2);

        // A second batch appends rather than replaces.
        session
            .files_selected(vec![FileHandle::new("c.jpg", "image/jpeg", vec![3u8; 64])])
            .await;
        assert_eq!(session.current().files.len(), 3);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_not_fatal() {
        let mut store = MockObjectStore::new();
        store.expect_put().returning(|key, _data, _ct, progress| {
            if key.contains("bad") {
                Err(StoreError::upload_failed("network error"))
            } else {
                progress.complete();
                Ok(StoredObject {
                    key: key.to_string(),
                    url: format!("https://cdn.example.test/{key}"),
                    created_at: Utc::now(),
                })
            }
        });
        let session = session_with(store);

        let outcome = session
            .files_selected(vec![
                FileHandle::new("good.jpg", "image/jpeg", vec![1u8; 1024]),
                FileHandle::new("bad.mp4", "video/mp4", vec![2u8; 1024]),
            ])
            .await;

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.failures.len(), 1);

        let state = session.current();
        assert_eq!(state.progress, 100);
        assert_eq!(state.files.len(), 1);
        assert_eq!(state.files[0].name, "good.jpg");
    }

    #[tokio::test]
    async fn test_load_gallery_replaces_wholesale() {
        let mut store = MockObjectStore::new();
        store.expect_list().returning(|_| {
            Ok(vec![
                ObjectHandle {
                    key: "uploads/old.jpg".to_string(),
                    display_name: "old.jpg".to_string(),
                    url: Some("https://cdn.example.test/old.jpg".to_string()),
                    created_at: Some(Utc.timestamp_opt(1_000, 0).unwrap()),
                },
                ObjectHandle {
                    key: "uploads/new.jpg".to_string(),
                    display_name: "new.jpg".to_string(),
                    url: Some("https://cdn.example.test/new.jpg".to_string()),
                    created_at: Some(Utc.timestamp_opt(2_000, 0).unwrap()),
                },
            ])
        });
        store.expect_url().returning(|h| Ok(h.url.clone().unwrap()));
        store.expect_metadata().returning(|h| {
            Ok(ObjectMetadata {
                created_at: h.created_at.unwrap(),
                size_bytes: None,
                original_name: None,
            })
        });
        let session = session_with(store);

        let count = session.load_gallery().await.unwrap();
        assert_eq!(count, 2);

        let state = session.current();
        assert!(!state.is_loading);
        assert_eq!(state.files.len(), 2);
        assert_eq!(state.files[0].name, "new.jpg");

        // Loading again replaces rather than appends.
        session.load_gallery().await.unwrap();
        assert_eq!(session.current().files.len(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_empty_non_loading_gallery() {
        let mut store = MockObjectStore::new();
        store
            .expect_list()
            .returning(|_| Err(StoreError::list_failed("permission denied")));
        let session = session_with(store);

        let err = session.load_gallery().await.unwrap_err();
        assert!(matches!(err, GalleryError::Enumeration(_)));

        let state = session.current();
        assert!(!state.is_loading);
        assert!(state.files.is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_observes_changes() {
        let mut store = MockObjectStore::new();
        store.expect_list().returning(|_| Ok(Vec::new()));
        let session = session_with(store);
        let mut receiver = session.subscribe();

        session.load_gallery().await.unwrap();

        receiver.changed().await.unwrap();
        let state = receiver.borrow_and_update().clone();
        assert!(!state.is_loading);
        assert!(state.files.is_empty());
    }
}
