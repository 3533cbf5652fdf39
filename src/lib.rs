//! Guest Gallery
//!
//! Core for a guest-facing event gallery page: guests scan a code, land on
//! the page, and upload photos and videos. This crate coordinates the upload
//! batches (optional image compression, concurrent dispatch to a pluggable
//! object store, one aggregated progress percentage) and rebuilds the
//! gallery feed newest-first from whatever the store already holds. The
//! presentation layer subscribes to a single published state and renders it;
//! everything durable lives in the external store.
//!
//! ## Features
//!
//! - **Pluggable storage**: one `ObjectStore` trait, two backends: an
//!   authenticated SDK client for S3-compatible stores and an unsigned
//!   direct-upload REST API keyed by cloud name + preset
//! - **Batch uploads with live progress**: every file in a batch uploads
//!   concurrently; byte-level ticks fold into a single 0..=100 scalar,
//!   pinned to exactly 100 when the batch settles
//! - **Failure isolation**: a file that fails to compress or upload is
//!   logged and dropped from the results; its siblings are unaffected
//! - **Newest-first gallery**: stable descending sort by upload time over
//!   everything enumerated from the store
//!
//! ## Architecture
//!
//! ```text
//! Renderer (excluded)              Object Store
//! ┌──────────────┐               ┌──────────────────┐
//! │ subscribe()  │◀── watch ──┐  │ uploads/{date}/  │
//! │ picker event │            │  │   {ts}_{id}_{n}  │
//! └──────┬───────┘            │  └──────────────────┘
//!        │ files_selected     │        ▲        ▲
//!        ▼                    │        │        │
//! ┌──────────────┐     ┌──────┴─────┐  │        │
//! │ Gallery      │────▶│ Renderer   │  │        │
//! │ Session      │     │ State      │  │        │
//! └──┬────────┬──┘     └────────────┘  │        │
//!    │        │                        │        │
//!    ▼        ▼                        │        │
//! ┌────────┐ ┌──────────┐   put        │        │
//! │ Upload │ │ Gallery  │──────────────┘        │
//! │ Coord. │ │ Loader   │   list/metadata/url   │
//! └───┬────┘ └──────────┘───────────────────────┘
//!     │
//!     ▼
//! ┌────────────┐
//! │ Image      │
//! │ Compressor │
//! └────────────┘
//! ```

pub mod compressor;
pub mod config;
pub mod error;
pub mod gallery_loader;
pub mod logging;
pub mod object_store;
pub mod rest_store;
pub mod s3_store;
pub mod session;
pub mod upload_coordinator;

pub use compressor::{Compressor, ImageCompressor};
pub use config::{
    CompressionConfig, Config, RestStoreConfig, S3StoreConfig, ServiceConfig, StoreConfig,
    StoreProvider, UploadConfig,
};
pub use error::{GalleryError, GalleryResult, StoreError, StoreResult};
pub use gallery_loader::GalleryLoader;
pub use logging::init_tracing;
pub use object_store::{
    generate_object_key, guess_content_type, FileHandle, ObjectHandle, ObjectMetadata,
    ObjectStore, ProgressEvent, ProgressSender, StoredObject, UploadRecord,
};
pub use rest_store::RestObjectStore;
pub use s3_store::S3ObjectStore;
pub use session::{create_object_store, GallerySession, RendererState};
pub use upload_coordinator::{BatchOutcome, ProgressPublisher, UploadCoordinator};
