//! # Adaptive Image Compression
//!
//! Shrinks an image below a byte budget before it is uploaded.
//!
//! ## Algorithm
//!
//! 1. Assets already within `max_size_bytes` are returned untouched
//! 2. The raster is decoded and scaled by `min(max_width / w, max_height / h, 1)`
//!    (never upscaled, aspect ratio preserved)
//! 3. The raster is JPEG encoded at `initial_quality`
//! 4. While the result is over budget and quality is above 0.1, quality drops
//!    by 0.1 and the raster is encoded again
//!
//! The search has a numeric floor. When the floor is reached the smallest
//! encode is returned even if it is still over budget; the caller decides
//! whether that is acceptable.
//!
//! Quality is tracked in whole percent so that ten steps of 0.1 land exactly
//! on the floor.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::asset::{format_file_size, ImageAsset, JPEG_MIME};
use crate::error::ReduceError;

/// Upper bound on encodes per call: the initial quality plus eight steps.
pub const MAX_ENCODE_ATTEMPTS: usize = 9;

const QUALITY_STEP: u8 = 10;
const QUALITY_FLOOR: u8 = 10;

/// Per-invocation limits for [`reduce`].
///
/// # Example TOML
///
/// ```toml
/// [compression]
/// max_size_bytes = 921600
/// max_width = 1920
/// max_height = 1080
/// initial_quality = 0.8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressionConfig {
    /// Stop condition: encodes at or below this size are accepted
    pub max_size_bytes: usize,
    /// Maximum raster width after scaling
    pub max_width: u32,
    /// Maximum raster height after scaling
    pub max_height: u32,
    /// Starting lossy quality in `[0, 1]`
    pub initial_quality: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 1024 * 1024,
            max_width: 1920,
            max_height: 1080,
            initial_quality: 0.8,
        }
    }
}

/// One JPEG encode performed during the quality search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeAttempt {
    /// Quality in percent (80 means 0.8)
    pub quality: u8,
    /// Size of this encode
    pub size: usize,
    /// Size of the smallest encode so far; never grows between attempts
    pub kept_size: usize,
}

/// Result of a reduction with the search trace attached.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub asset: ImageAsset,
    /// Empty when the fast path returned the input untouched
    pub attempts: Vec<EncodeAttempt>,
    pub original_dimensions: Option<(u32, u32)>,
    pub output_dimensions: Option<(u32, u32)>,
}

impl Reduction {
    pub fn was_reencoded(&self) -> bool {
        !self.attempts.is_empty()
    }
}

/// Reduce `image` to fit `config`, returning only the resulting asset.
///
/// See [`reduce_with_trace`] for the algorithm and errors.
pub fn reduce(image: &ImageAsset, config: &CompressionConfig) -> Result<ImageAsset, ReduceError> {
    reduce_with_trace(image, config).map(|reduction| reduction.asset)
}

/// Reduce `image` to fit `config` and report every encode that was tried.
///
/// # Errors
/// - [`ReduceError::Decode`] if the bytes are not a decodable raster
/// - [`ReduceError::Encode`] if the JPEG encoder fails
pub fn reduce_with_trace(
    image: &ImageAsset,
    config: &CompressionConfig,
) -> Result<Reduction, ReduceError> {
    let original_size = image.byte_len();

    if original_size <= config.max_size_bytes {
        debug!(
            "Image already within budget: {} <= {}",
            format_file_size(original_size),
            format_file_size(config.max_size_bytes)
        );
        return Ok(Reduction {
            asset: image.clone(),
            attempts: Vec::new(),
            original_dimensions: None,
            output_dimensions: None,
        });
    }

    info!(
        "🗜️  Compressing image from {} to under {}",
        format_file_size(original_size),
        format_file_size(config.max_size_bytes)
    );

    let decoded =
        image::load_from_memory(image.bytes()).map_err(|e| ReduceError::Decode(e.to_string()))?;
    let original_dimensions = decoded.dimensions();

    let raster = fit_within(decoded, config.max_width, config.max_height);
    let output_dimensions = raster.dimensions();
    let rgb = raster.to_rgb8();

    let mut quality = initial_quality_percent(config.initial_quality);
    let mut attempts = Vec::with_capacity(MAX_ENCODE_ATTEMPTS);
    let mut encoded = encode_jpeg(&rgb, quality)?;
    attempts.push(EncodeAttempt {
        quality,
        size: encoded.len(),
        kept_size: encoded.len(),
    });

    while encoded.len() > config.max_size_bytes
        && quality > QUALITY_FLOOR
        && attempts.len() < MAX_ENCODE_ATTEMPTS
    {
        quality = quality.saturating_sub(QUALITY_STEP).max(1);
        debug!(
            "Image still {}, reducing quality to {:.1}",
            format_file_size(encoded.len()),
            f32::from(quality) / 100.0
        );

        let candidate = encode_jpeg(&rgb, quality)?;
        let size = candidate.len();

        if size <= encoded.len() {
            encoded = candidate;
        }

        attempts.push(EncodeAttempt {
            quality,
            size,
            kept_size: encoded.len(),
        });
    }

    info!(
        "✅ Image compressed to {} ({:.1}% reduction, {}x{} -> {}x{}, {} encode(s))",
        format_file_size(encoded.len()),
        (1.0 - encoded.len() as f64 / original_size as f64) * 100.0,
        original_dimensions.0,
        original_dimensions.1,
        output_dimensions.0,
        output_dimensions.1,
        attempts.len()
    );

    Ok(Reduction {
        asset: image.with_content(encoded, JPEG_MIME),
        attempts,
        original_dimensions: Some(original_dimensions),
        output_dimensions: Some(output_dimensions),
    })
}

/// Uniform scale factor that fits `(width, height)` inside the bounds, capped at 1.
pub fn scale_factor(width: u32, height: u32, max_width: u32, max_height: u32) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }

    let width_ratio = f64::from(max_width) / f64::from(width);
    let height_ratio = f64::from(max_height) / f64::from(height);

    width_ratio.min(height_ratio).min(1.0)
}

fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let scale = scale_factor(width, height, max_width, max_height);

    if scale >= 1.0 {
        return img;
    }

    let new_width = ((f64::from(width) * scale).round() as u32).clamp(1, width);
    let new_height = ((f64::from(height) * scale).round() as u32).clamp(1, height);

    img.resize_exact(new_width, new_height, FilterType::Triangle)
}

fn initial_quality_percent(quality: f32) -> u8 {
    let clamped = if quality.is_finite() {
        quality.clamp(0.01, 1.0)
    } else {
        0.8
    };
    (clamped * 100.0).round() as u8
}

fn encode_jpeg(rgb: &image::RgbImage, quality: u8) -> Result<Vec<u8>, ReduceError> {
    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| ReduceError::Encode(e.to_string()))?;
    }

    Ok(buffer)
}
