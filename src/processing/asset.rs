//! # Image Assets
//!
//! An [`ImageAsset`] is an in-memory image blob as selected by the user: raw
//! bytes, a MIME type and an optional file name. Assets are immutable; a new
//! selection replaces the previous asset wholesale.

use image::ImageFormat;
use std::path::Path;

use crate::error::AssetError;

/// MIME type of every asset produced by the size reducer.
pub const JPEG_MIME: &str = "image/jpeg";

/// Raw image bytes plus the metadata needed to upload them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    mime_type: String,
    file_name: Option<String>,
}

impl ImageAsset {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: Option<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name,
        }
    }

    /// Load an asset from disk, the way a file picker or camera capture hands
    /// one over.
    ///
    /// The MIME type is sniffed from the content first and from the file
    /// extension second.
    ///
    /// # Errors
    /// - [`AssetError::Io`] if the file cannot be read
    /// - [`AssetError::NotAnImage`] if the file is not recognisable as an image
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mime_type = image::guess_format(&bytes)
            .ok()
            .or_else(|| ImageFormat::from_path(path).ok())
            .and_then(mime_for_format)
            .ok_or_else(|| AssetError::NotAnImage(path.display().to_string()))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Ok(Self::new(bytes, mime_type, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Same identity, new content. Used by the reducer to swap in the
    /// re-encoded bytes.
    pub(crate) fn with_content(&self, bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            file_name: self.file_name.clone(),
        }
    }
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some(JPEG_MIME),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Avif => Some("image/avif"),
        _ => None,
    }
}

/// Human readable byte count, e.g. `1.50 MB`.
pub fn format_file_size(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD) as usize).min(UNITS.len() - 1);
    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    format!("{:.2} {}", size, UNITS[unit_index])
}
