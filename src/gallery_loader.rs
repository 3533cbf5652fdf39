//! Gallery feed construction.
//!
//! On page activation the loader enumerates everything previously stored
//! under the configured namespace, resolves each object's public URL and
//! creation time concurrently, and hands back the records newest-first.
//! The sort is stable, so objects sharing a timestamp keep the order the
//! store enumerated them in.

use crate::config::UploadConfig;
use crate::error::{GalleryError, GalleryResult};
use crate::object_store::{ObjectStore, UploadRecord};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

/// Gallery loader
pub struct GalleryLoader {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    fetch_concurrency: usize,
}

impl GalleryLoader {
    pub fn new(store: Arc<dyn ObjectStore>, config: &UploadConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            fetch_concurrency: config.fetch_concurrency.max(1),
        }
    }

    /// Build the gallery feed from everything the store already holds.
    ///
    /// Enumeration failure fails the whole load; a single object whose URL
    /// or metadata cannot be resolved is logged and skipped.
    #[instrument(skip(self))]
    pub async fn load(&self) -> GalleryResult<Vec<UploadRecord>> {
        let started = Instant::now();

        let handles = self.store.list(&self.namespace).await.map_err(|e| {
            error!(namespace = %self.namespace, error = %e, "Gallery enumeration failed");
            metrics::counter!("gallery.load.failed").increment(1);
            GalleryError::Enumeration(e)
        })?;

        debug!(count = handles.len(), "Enumerated stored objects");

        let store = &self.store;
        let mut resolved: Vec<(usize, UploadRecord)> =
            stream::iter(handles.into_iter().enumerate())
                .map(|(index, handle)| async move {
                    let fetched =
                        futures::future::try_join(store.url(&handle), store.metadata(&handle))
                            .await;
                    match fetched {
                        Ok((url, metadata)) => Some((
                            index,
                            UploadRecord {
                                name: metadata
                                    .original_name
                                    .unwrap_or_else(|| handle.display_name.clone()),
                                url,
                                uploaded_at: metadata.created_at,
                            },
                        )),
                        Err(e) => {
                            warn!(key = %handle.key, error = %e, "Skipping object with unresolvable URL or metadata");
                            metrics::counter!("gallery.load.skipped").increment(1);
                            None
                        }
                    }
                })
                .buffer_unordered(self.fetch_concurrency)
                .filter_map(|resolved| async move { resolved })
                .collect()
                .await;

        // Concurrent resolution scrambles completion order; restore the
        // enumeration order first so the stable sort can preserve it for
        // equal timestamps.
        resolved.sort_by_key(|(index, _)| *index);
        let mut records: Vec<UploadRecord> =
            resolved.into_iter().map(|(_, record)| record).collect();
        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        metrics::histogram!("gallery.load.duration_seconds")
            .record(started.elapsed().as_secs_f64());
        debug!(count = records.len(), "Gallery feed built");

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::object_store::{MockObjectStore, ObjectHandle, ObjectMetadata};
    use chrono::{TimeZone, Utc};

    fn handle(key: &str, ts_secs: i64) -> ObjectHandle {
        ObjectHandle {
            key: key.to_string(),
            display_name: key.rsplit('/').next().unwrap_or(key).to_string(),
            url: Some(format!("https://cdn.example.test/{key}")),
            created_at: Some(Utc.timestamp_opt(ts_secs, 0).unwrap()),
        }
    }

    /// Store that answers url/metadata straight from handle caches.
    fn store_with(handles: Vec<ObjectHandle>) -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_list()
            .returning(move |_| Ok(handles.clone()));
        store.expect_url().returning(|h| {
            h.url
                .clone()
                .ok_or_else(|| StoreError::url_failed("no url"))
        });
        store.expect_metadata().returning(|h| {
            Ok(ObjectMetadata {
                created_at: h.created_at.unwrap(),
                size_bytes: None,
                original_name: None,
            })
        });
        store
    }

    fn loader(store: MockObjectStore) -> GalleryLoader {
        GalleryLoader::new(Arc::new(store), &UploadConfig::default())
    }

    #[tokio::test]
    async fn test_empty_namespace_loads_empty() {
        let mut store = MockObjectStore::new();
        store.expect_list().returning(|_| Ok(Vec::new()));

        let records = loader(store).load().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_sorted_newest_first() {
        // Enumerated oldest-first; T1 < T2 < T3 must come back [T3, T2, T1].
        let store = store_with(vec![
            handle("uploads/t1.jpg", 1_000),
            handle("uploads/t2.jpg", 2_000),
            handle("uploads/t3.jpg", 3_000),
        ]);

        let records = loader(store).load().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["t3.jpg", "t2.jpg", "t1.jpg"]);
        assert!(records.windows(2).all(|w| w[0].uploaded_at > w[1].uploaded_at));
    }

    #[tokio::test]
    async fn test_equal_timestamps_keep_enumeration_order() {
        let store = store_with(vec![
            handle("uploads/first.jpg", 5_000),
            handle("uploads/second.jpg", 5_000),
            handle("uploads/newer.jpg", 9_000),
        ]);

        let records = loader(store).load().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["newer.jpg", "first.jpg", "second.jpg"]);
    }

    #[tokio::test]
    async fn test_enumeration_failure_surfaces() {
        let mut store = MockObjectStore::new();
        store
            .expect_list()
            .returning(|_| Err(StoreError::list_failed("permission denied")));

        let err = loader(store).load().await.unwrap_err();
        assert!(matches!(err, GalleryError::Enumeration(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_object_is_skipped() {
        let mut bad = handle("uploads/ghost.jpg", 4_000);
        bad.url = None;
        let store = store_with(vec![handle("uploads/ok.jpg", 3_000), bad]);

        let records = loader(store).load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok.jpg");
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let handles = vec![
            handle("uploads/a.jpg", 1_000),
            handle("uploads/b.jpg", 2_000),
        ];
        let loader = loader(store_with(handles));

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();
        assert_eq!(first, second);
    }
}
