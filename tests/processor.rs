//! Fixed mask loading and ResizeProcessor tests.

use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};
use lipsync_dataset::{
    DatasetError, ImageProcessor, MaskMode, ProcessorSettings, ResizeProcessor, load_fixed_mask,
};

fn settings(mask_image: RgbImage) -> ProcessorSettings {
    ProcessorSettings {
        resolution: mask_image.width(),
        mask: MaskMode::FixMask,
        mask_image: Arc::new(mask_image),
    }
}

/// Mask blanking the left half of a `size × size` frame.
fn left_half_mask(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, _| {
        if x < size / 2 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

// ── load_fixed_mask ──────────────────────────────────────────────

#[test]
fn missing_mask_path_blanks_lower_half() {
    let mask = load_fixed_mask(None, 16).expect("Default mask");
    assert_eq!(mask.dimensions(), (16, 16));
    for (_, y, pixel) in mask.enumerate_pixels() {
        let expected = if y < 8 { [255, 255, 255] } else { [0, 0, 0] };
        assert_eq!(pixel.0, expected, "row {y}");
    }
}

#[test]
fn default_mask_changes_masked_frames() {
    let mask = load_fixed_mask(None, 8).expect("Default mask");
    let mut processor = ResizeProcessor::new(&settings(mask));
    let frames = vec![RgbImage::from_pixel(8, 8, Rgb([90, 90, 90])); 2];

    let masked = processor
        .prepare_masks_and_masked_images(&frames, false)
        .expect("Processing failed");
    assert_ne!(masked.masked_pixel_values, masked.pixel_values);
    assert_eq!(masked.masked_pixel_values[0].get_pixel(3, 1).0, [90, 90, 90]);
    assert_eq!(masked.masked_pixel_values[0].get_pixel(3, 6).0, [0, 0, 0]);
}

#[test]
fn mask_image_is_resized_to_resolution() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("mask.png");
    GrayImage::from_pixel(64, 32, Luma([255]))
        .save(&path)
        .expect("Failed to write mask");

    let mask = load_fixed_mask(Some(&path), 24).expect("Failed to load mask");
    assert_eq!(mask.dimensions(), (24, 24));
}

#[test]
fn unreadable_mask_is_an_image_error() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("mask.png");
    std::fs::write(&path, b"not a png").expect("Failed to write mask");

    let result = load_fixed_mask(Some(&path), 24);
    assert!(matches!(result, Err(DatasetError::Image(_))));
}

// ── ResizeProcessor ──────────────────────────────────────────────

#[test]
fn masked_frames_blank_masked_region() {
    let mut processor = ResizeProcessor::new(&settings(left_half_mask(8)));
    let frames = vec![RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])); 3];

    let masked = processor
        .prepare_masks_and_masked_images(&frames, false)
        .expect("Processing failed");

    assert_eq!(masked.pixel_values, frames);
    assert_eq!(masked.masks.len(), 3);
    for frame in &masked.masked_pixel_values {
        assert_eq!(frame.get_pixel(0, 4).0, [0, 0, 0]);
        assert_eq!(frame.get_pixel(7, 4).0, [200, 100, 50]);
    }
    assert_eq!(masked.masks[0].get_pixel(0, 0).0, [0]);
    assert_eq!(masked.masks[0].get_pixel(7, 0).0, [255]);
}

#[test]
fn frames_are_resized_to_resolution() {
    let mut processor = ResizeProcessor::new(&settings(left_half_mask(16)));
    let frames = vec![RgbImage::from_pixel(40, 30, Rgb([10, 20, 30]))];

    let processed = processor.process_images(&frames).expect("Processing failed");
    assert_eq!(processed[0].dimensions(), (16, 16));
}

#[test]
fn affine_alignment_is_refused() {
    let mut processor = ResizeProcessor::new(&settings(left_half_mask(8)));
    let frames = vec![RgbImage::new(8, 8)];
    assert!(processor.prepare_masks_and_masked_images(&frames, true).is_err());
}
