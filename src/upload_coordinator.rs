//! Batch upload coordination.
//!
//! One `submit` call takes everything the guest picked in one interaction,
//! optionally compresses each image, uploads every file concurrently, and
//! folds the per-file byte ticks into a single 0..=100 percentage:
//!
//! `overall = floor(100 * Σ bytes_sent / Σ total_bytes)`
//!
//! weighted over the post-compression batch. The scalar starts at 0 when the
//! batch starts and is pinned to exactly 100 once every task settles.
//!
//! Failures are isolated per file: a file that fails to compress or upload
//! is logged, counted, and reported in the outcome while its siblings
//! proceed. No rollback, no retry.

use crate::compressor::Compressor;
use crate::config::{CompressionConfig, UploadConfig};
use crate::error::GalleryError;
use crate::object_store::{
    generate_object_key, FileHandle, ObjectStore, ProgressEvent, ProgressSender, UploadRecord,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

/// Callback the coordinator publishes progress percentages through.
pub type ProgressPublisher = Arc<dyn Fn(u8) + Send + Sync>;

/// Outcome of one submitted batch.
///
/// `records` holds one entry per file that made it into the store, in task
/// completion order (nondeterministic across runs). `failures` holds the
/// per-file errors for everything that did not.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<UploadRecord>,
    pub failures: Vec<GalleryError>,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Upload coordinator
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    compressor: Option<Arc<dyn Compressor>>,
    namespace: String,
    concurrency: usize,
    parallel_compression: bool,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        compressor: Option<Arc<dyn Compressor>>,
        upload: &UploadConfig,
        compression: &CompressionConfig,
    ) -> Self {
        Self {
            store,
            compressor,
            namespace: upload.namespace.clone(),
            concurrency: upload.concurrency.max(1),
            parallel_compression: compression.parallel,
        }
    }

    /// Submit one batch of guest-selected files.
    ///
    /// Resolves once every file has settled. Progress percentages are
    /// published through `publish` for the lifetime of the batch.
    #[instrument(skip(self, files, publish), fields(batch_size = files.len()))]
    pub async fn submit(&self, files: Vec<FileHandle>, publish: ProgressPublisher) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if files.is_empty() {
            return outcome;
        }

        publish(0);

        let prepared = self.compress_batch(files, &mut outcome).await;
        if prepared.is_empty() {
            // Nothing survived compression; the batch still settles.
            publish(100);
            return outcome;
        }

        let totals: Vec<u64> = prepared.iter().map(FileHandle::size_bytes).collect();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let aggregator = tokio::spawn(aggregate_progress(totals, tick_rx, publish.clone()));

        let results: Vec<Result<UploadRecord, GalleryError>> =
            stream::iter(prepared.into_iter().enumerate())
                .map(|(index, file)| {
                    let store = self.store.clone();
                    let key = generate_object_key(&self.namespace, &file.name);
                    let progress = ProgressSender::new(index, file.size_bytes(), tick_tx.clone());
                    async move { upload_one(store, key, file, progress).await }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        // Closing the tick channel ends the aggregator; the settled batch
        // then pins the published scalar to exactly 100.
        drop(tick_tx);
        let _ = aggregator.await;
        publish(100);

        for result in results {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(e) => outcome.failures.push(e),
            }
        }

        info!(
            uploaded = outcome.records.len(),
            failed = outcome.failures.len(),
            "Batch settled"
        );

        outcome
    }

    /// Run the compression pre-step, dropping files that fail it.
    async fn compress_batch(
        &self,
        files: Vec<FileHandle>,
        outcome: &mut BatchOutcome,
    ) -> Vec<FileHandle> {
        let Some(compressor) = &self.compressor else {
            return files;
        };

        let width = if self.parallel_compression {
            files.len().max(1)
        } else {
            1
        };

        let results: Vec<(String, Result<FileHandle, GalleryError>)> = stream::iter(files)
            .map(|file| {
                let compressor = compressor.clone();
                async move {
                    let name = file.name.clone();
                    (name, compressor.compress(file).await)
                }
            })
            .buffered(width)
            .collect()
            .await;

        let mut kept = Vec::with_capacity(results.len());
        for (name, result) in results {
            match result {
                Ok(file) => kept.push(file),
                Err(e) => {
                    error!(name = %name, error = %e, "Compression failed, file dropped from batch");
                    metrics::counter!("gallery.compression.failed").increment(1);
                    outcome.failures.push(e);
                }
            }
        }
        kept
    }
}

async fn upload_one(
    store: Arc<dyn ObjectStore>,
    key: String,
    file: FileHandle,
    progress: ProgressSender,
) -> Result<UploadRecord, GalleryError> {
    let name = file.name.clone();
    let size_bytes = file.size_bytes();

    match store
        .put(&key, file.data, &file.content_type, progress)
        .await
    {
        Ok(stored) => {
            debug!(name = %name, key = %key, size_bytes, "Upload complete");
            metrics::counter!("gallery.uploads.completed").increment(1);
            metrics::counter!("gallery.bytes.uploaded").increment(size_bytes);
            Ok(UploadRecord {
                name,
                url: stored.url,
                uploaded_at: stored.created_at,
            })
        }
        Err(e) => {
            error!(name = %name, key = %key, error = %e, "Upload failed, continuing with remaining files");
            metrics::counter!("gallery.uploads.failed").increment(1);
            Err(GalleryError::upload_failed(name, e))
        }
    }
}

/// Fold per-file byte ticks into the batch-wide percentage.
///
/// Runs until every `ProgressSender` for the batch is dropped. Publishes
/// only on change; the final pin to 100 is the caller's responsibility so
/// it lands after the last task settles.
async fn aggregate_progress(
    totals: Vec<u64>,
    mut ticks: mpsc::UnboundedReceiver<ProgressEvent>,
    publish: ProgressPublisher,
) {
    let grand_total: u64 = totals.iter().sum();
    if grand_total == 0 {
        // Zero-byte batch: nothing to weight, completion pins 100.
        while ticks.recv().await.is_some() {}
        return;
    }

    let mut sent = vec![0u64; totals.len()];
    let mut last_published = 0u8;

    while let Some(event) = ticks.recv().await {
        let Some(slot) = sent.get_mut(event.file_index) else {
            continue;
        };
        *slot = event.bytes_sent.min(totals[event.file_index]);

        let overall = ((sent.iter().sum::<u64>() * 100) / grand_total) as u8;
        if overall != last_published {
            last_published = overall;
            publish(overall);
        }
    }
}
