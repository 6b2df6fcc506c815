//! # Image Processing
//!
//! In-memory image handling that happens before an upload: the asset type and
//! the adaptive size reducer.

pub mod asset;
pub mod compression;

// Re-export main items for convenience
pub use asset::{format_file_size, ImageAsset, JPEG_MIME};
pub use compression::{reduce, reduce_with_trace, CompressionConfig, EncodeAttempt, Reduction};
