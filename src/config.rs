use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the gallery core
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object store configuration
    pub store: StoreConfig,
    /// Upload and gallery-load configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Client-side compression configuration
    #[serde(default)]
    pub compression: CompressionConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which object store backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreProvider {
    /// Authenticated SDK client for S3 and S3-compatible stores
    S3,
    /// Unsigned direct-upload REST API keyed by cloud name + preset
    Rest,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Selected backend
    pub provider: StoreProvider,
    /// SDK backend settings (required when provider = "s3")
    pub s3: Option<S3StoreConfig>,
    /// REST backend settings (required when provider = "rest")
    pub rest: Option<RestStoreConfig>,
}

/// SDK (S3-compatible) backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3StoreConfig {
    /// Bucket name
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, R2, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Base URL for public buckets or CDN fronting; when set, object URLs
    /// are `{public_base_url}/{key}` instead of presigned URLs
    pub public_base_url: Option<String>,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

impl S3StoreConfig {
    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.presigned_url_expiry_secs)
    }
}

/// REST (direct upload API) backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RestStoreConfig {
    /// Cloud name identifying the account
    pub cloud_name: String,
    /// Unsigned upload preset name
    pub upload_preset: String,
    /// Upload API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Delivery/listing base URL
    #[serde(default = "default_delivery_base_url")]
    pub delivery_base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl RestStoreConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Upload and gallery-load configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Logical namespace stored objects live under
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Concurrent upload tasks per batch
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,
    /// Concurrent URL/metadata fetches during gallery load
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

/// Client-side compression configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    /// Compress images before upload
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Target size per image in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: f64,
    /// Maximum width or height in pixels
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Compress batch members concurrently
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl CompressionConfig {
    /// Target size in bytes
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0) as u64
    }
}

// Default value functions
fn default_service_name() -> String {
    "guest-gallery".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    3600
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_api_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_delivery_base_url() -> String {
    "https://res.cloudinary.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_namespace() -> String {
    "uploads".to_string()
}

fn default_upload_concurrency() -> usize {
    8
}

fn default_fetch_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_max_size_mb() -> f64 {
    0.2
}

fn default_max_dimension() -> u32 {
    1920
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "guest-gallery")?
            .set_default("service.log_level", "info")?
            // Add config file if present
            .add_source(config::File::with_name("config/gallery").required(false))
            .add_source(config::File::with_name("/etc/guest-gallery/gallery").required(false))
            // Override with environment variables
            // GALLERY__STORE__S3__BUCKET -> store.s3.bucket
            .add_source(
                config::Environment::with_prefix("GALLERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            concurrency: default_upload_concurrency(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: default_max_size_mb(),
            max_dimension: default_max_dimension(),
            parallel: true,
        }
    }
}
