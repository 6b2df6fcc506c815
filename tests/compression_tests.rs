use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

use plant_doctor::processing::compression::MAX_ENCODE_ATTEMPTS;
use plant_doctor::processing::{reduce, reduce_with_trace, CompressionConfig, ImageAsset, JPEG_MIME};

/// Uncompressed BMP of random pixels; noise keeps JPEG sizes large.
fn noisy_bmp(width: u32, height: u32, seed: u64) -> ImageAsset {
    let mut rng = StdRng::seed_from_u64(seed);
    let raster = RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]));

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(raster)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Bmp)
        .unwrap();

    ImageAsset::new(bytes, "image/bmp", Some("field-photo.bmp".to_string()))
}

fn dimensions(asset: &ImageAsset) -> (u32, u32) {
    let decoded = image::load_from_memory(asset.bytes()).unwrap();
    (decoded.width(), decoded.height())
}

#[test]
fn test_large_photo_is_scaled_and_reencoded() {
    let original = noisy_bmp(2000, 1200, 1);
    assert!(original.byte_len() > 6_000_000);

    let config = CompressionConfig {
        max_size_bytes: 921_600,
        ..CompressionConfig::default()
    };

    let reduction = reduce_with_trace(&original, &config).unwrap();
    let asset = &reduction.asset;

    // min(1920 / 2000, 1080 / 1200, 1) = 0.9
    assert_eq!(reduction.original_dimensions, Some((2000, 1200)));
    assert_eq!(reduction.output_dimensions, Some((1800, 1080)));
    assert_eq!(dimensions(asset), (1800, 1080));

    assert_eq!(asset.mime_type(), JPEG_MIME);
    assert_eq!(asset.file_name(), Some("field-photo.bmp"));

    let last = reduction.attempts.last().unwrap();
    assert!(asset.byte_len() <= config.max_size_bytes || last.quality == 10);
    assert!(reduction.attempts.len() <= MAX_ENCODE_ATTEMPTS);
}

#[test]
fn test_small_raster_is_not_upscaled() {
    let original = noisy_bmp(600, 400, 2);
    let config = CompressionConfig {
        max_size_bytes: 200_000,
        ..CompressionConfig::default()
    };

    let reduction = reduce_with_trace(&original, &config).unwrap();

    assert_eq!(reduction.output_dimensions, Some((600, 400)));
    assert_eq!(dimensions(&reduction.asset), (600, 400));
}

#[test]
fn test_quality_search_steps_down_and_keeps_smallest() {
    let original = noisy_bmp(500, 400, 3);
    let config = CompressionConfig {
        max_size_bytes: 1_000,
        ..CompressionConfig::default()
    };

    let reduction = reduce_with_trace(&original, &config).unwrap();
    let qualities: Vec<u8> = reduction.attempts.iter().map(|a| a.quality).collect();

    assert_eq!(qualities, vec![80, 70, 60, 50, 40, 30, 20, 10]);

    // Unreachable budget: the floor result comes back instead of an error.
    let smallest = reduction.attempts.iter().map(|a| a.size).min().unwrap();
    assert_eq!(reduction.asset.byte_len(), smallest);
    assert!(reduction.asset.byte_len() > config.max_size_bytes);
}

#[test]
fn test_each_step_shrinks_the_output() {
    let original = noisy_bmp(800, 600, 7);
    let config = CompressionConfig {
        max_size_bytes: 2_000,
        initial_quality: 1.0,
        ..CompressionConfig::default()
    };

    let reduction = reduce_with_trace(&original, &config).unwrap();
    let attempts = &reduction.attempts;
    assert!(attempts.len() > 1);

    // Lower quality on the same raster never produces a larger encode.
    assert!(attempts.windows(2).all(|w| w[1].size <= w[0].size));

    // The kept result never grows and ends as the returned asset.
    assert!(attempts.windows(2).all(|w| w[1].kept_size <= w[0].kept_size));
    assert!(attempts.iter().all(|a| a.kept_size <= a.size));
    assert_eq!(
        attempts.last().unwrap().kept_size,
        reduction.asset.byte_len()
    );
}

#[test]
fn test_encode_count_is_bounded() {
    let original = noisy_bmp(400, 300, 4);
    let config = CompressionConfig {
        max_size_bytes: 1_000,
        initial_quality: 1.0,
        ..CompressionConfig::default()
    };

    let reduction = reduce_with_trace(&original, &config).unwrap();

    assert_eq!(reduction.attempts.len(), MAX_ENCODE_ATTEMPTS);
    assert_eq!(reduction.attempts.first().unwrap().quality, 100);
    assert_eq!(reduction.attempts.last().unwrap().quality, 20);
}

#[test]
fn test_first_encode_within_budget_stops_search() {
    let original = noisy_bmp(300, 200, 5);
    let config = CompressionConfig {
        max_size_bytes: original.byte_len() - 1,
        ..CompressionConfig::default()
    };

    let reduction = reduce_with_trace(&original, &config).unwrap();

    // A q80 JPEG of 300x200 is far below the 180 KB bitmap.
    assert_eq!(reduction.attempts.len(), 1);
    assert!(reduction.asset.byte_len() <= config.max_size_bytes);
}

#[test]
fn test_reducing_twice_is_a_no_op() {
    let original = noisy_bmp(640, 480, 6);
    let config = CompressionConfig {
        max_size_bytes: 300_000,
        ..CompressionConfig::default()
    };

    let once = reduce(&original, &config).unwrap();
    assert!(once.byte_len() <= config.max_size_bytes);

    let twice = reduce(&once, &config).unwrap();
    assert_eq!(once, twice);
}
