//! Pre-upload image compression.
//!
//! Guests upload straight from phone cameras, so payloads are shrunk before
//! they hit the store: downscale to a bounded edge length, then (for JPEG)
//! step the encoder quality down until the payload fits the size target.
//! Videos and other non-image payloads pass through untouched.

use crate::config::CompressionConfig;
use crate::error::{GalleryError, GalleryResult};
use crate::object_store::FileHandle;
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::{debug, instrument};

/// Compression adapter
///
/// Output must preserve the input's name, content type, and modification
/// time. A failure fails that file's upload; the original is never silently
/// passed through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, file: FileHandle) -> GalleryResult<FileHandle>;
}

/// Image compressor backed by the `image` crate.
///
/// Decoding and re-encoding are CPU-bound, so the work runs on the blocking
/// thread pool rather than the async runtime.
pub struct ImageCompressor {
    config: CompressionConfig,
}

impl ImageCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Compressor for ImageCompressor {
    #[instrument(skip(self, file), fields(name = %file.name, size_bytes = file.data.len()))]
    async fn compress(&self, file: FileHandle) -> GalleryResult<FileHandle> {
        if !file.content_type.starts_with("image/") {
            debug!(content_type = %file.content_type, "Non-image payload, passing through");
            return Ok(file);
        }

        let config = self.config.clone();
        let name = file.name.clone();
        tokio::task::spawn_blocking(move || compress_image(file, &config))
            .await
            .map_err(|e| GalleryError::compression_failed(&name, e.to_string()))?
    }
}

fn compress_image(file: FileHandle, config: &CompressionConfig) -> GalleryResult<FileHandle> {
    let target_bytes = config.max_size_bytes();

    let reader = ImageReader::new(Cursor::new(file.data.as_ref()))
        .with_guessed_format()
        .map_err(|e| GalleryError::compression_failed(&file.name, e.to_string()))?;
    let format = reader
        .format()
        .unwrap_or_else(|| format_from_content_type(&file.content_type));
    let image = reader
        .decode()
        .map_err(|e| GalleryError::compression_failed(&file.name, e.to_string()))?;

    let longest_edge = image.width().max(image.height());
    let needs_resize = longest_edge > config.max_dimension;

    // Already within bounds: keep the original bytes untouched.
    if !needs_resize && file.data.len() as u64 <= target_bytes {
        return Ok(file);
    }

    let image = if needs_resize {
        image.resize(
            config.max_dimension,
            config.max_dimension,
            FilterType::Lanczos3,
        )
    } else {
        image
    };

    let encoded = match format {
        ImageFormat::Jpeg => encode_jpeg_under(&image, target_bytes, &file.name)?,
        other => encode_as(&image, other, &file.name)?,
    };

    debug!(
        name = %file.name,
        before_bytes = file.data.len(),
        after_bytes = encoded.len(),
        resized = needs_resize,
        "Image compressed"
    );

    Ok(FileHandle {
        name: file.name,
        content_type: file.content_type,
        data: Bytes::from(encoded),
        modified_at: file.modified_at,
    })
}

/// Re-encode as JPEG, stepping quality down until under `target_bytes`.
/// Returns the lowest-quality attempt if even that stays over target.
fn encode_jpeg_under(
    image: &DynamicImage,
    target_bytes: u64,
    name: &str,
) -> GalleryResult<Vec<u8>> {
    // JPEG has no alpha channel.
    let image = DynamicImage::ImageRgb8(image.to_rgb8());

    let mut encoded = Vec::new();
    for quality in [85u8, 75, 65, 55, 45, 35] {
        encoded.clear();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut encoded), quality);
        image
            .write_with_encoder(encoder)
            .map_err(|e| GalleryError::compression_failed(name, e.to_string()))?;

        if encoded.len() as u64 <= target_bytes {
            break;
        }
    }

    Ok(encoded)
}

fn encode_as(image: &DynamicImage, format: ImageFormat, name: &str) -> GalleryResult<Vec<u8>> {
    let mut encoded = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut encoded), format)
        .map_err(|e| GalleryError::compression_failed(name, e.to_string()))?;
    Ok(encoded)
}

fn format_from_content_type(content_type: &str) -> ImageFormat {
    match content_type {
        "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
        "image/png" => ImageFormat::Png,
        "image/gif" => ImageFormat::Gif,
        "image/webp" => ImageFormat::WebP,
        _ => ImageFormat::Jpeg,
    }
}
