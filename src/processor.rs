//! Image processing interface and the fixed mask.
//!
//! Face cropping, warping, and masking belong to an [`ImageProcessor`]. A
//! processor may wrap a stateful model that is unsafe to call from two
//! workers at once, so the dataset never shares one: a [`ProcessorFactory`]
//! builds one per worker from the same [`ProcessorSettings`].
//!
//! [`ResizeProcessor`] is a minimal processor that skips face alignment and
//! applies the fixed mask to whole frames.

use std::{path::Path, sync::Arc};

use image::{GrayImage, Luma, Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;

use crate::{configuration::MaskMode, error::DatasetError, media::FrameBatch};

/// Failure reported by an [`ImageProcessor`], e.g. no face detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProcessError(pub String);

/// Ground truth, masked ground truth, and masks for one frame batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedFrames {
    /// Processed frames.
    pub pixel_values: FrameBatch,
    /// Processed frames with the mask applied.
    pub masked_pixel_values: FrameBatch,
    /// Per-frame masks. 255 keeps a pixel, 0 blanks it.
    pub masks: Vec<GrayImage>,
}

/// Per-worker image processing resource.
pub trait ImageProcessor: Send {
    /// Produce ground truth, masked frames, and masks for `frames`.
    fn prepare_masks_and_masked_images(
        &mut self,
        frames: &FrameBatch,
        affine_transform: bool,
    ) -> Result<MaskedFrames, ProcessError>;

    /// Produce processed frames without masking.
    fn process_images(&mut self, frames: &FrameBatch) -> Result<FrameBatch, ProcessError>;
}

/// Everything a processor needs at construction.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Output side length in pixels.
    pub resolution: u32,
    /// Masking strategy.
    pub mask: MaskMode,
    /// Fixed mask, already resized to `resolution`.
    pub mask_image: Arc<RgbImage>,
}

/// Builds one [`ImageProcessor`] per worker.
///
/// Any `Fn(&ProcessorSettings) -> Result<P, DatasetError>` closure is a
/// factory.
pub trait ProcessorFactory: Send + Sync {
    /// Processor type produced.
    type Processor: ImageProcessor;

    /// Build a fresh processor.
    fn create(&self, settings: &ProcessorSettings) -> Result<Self::Processor, DatasetError>;
}

impl<F, P> ProcessorFactory for F
where
    F: Fn(&ProcessorSettings) -> Result<P, DatasetError> + Send + Sync,
    P: ImageProcessor,
{
    type Processor = P;

    fn create(&self, settings: &ProcessorSettings) -> Result<P, DatasetError> {
        self(settings)
    }
}

/// Load the fixed mask at `resolution × resolution`.
///
/// The image is converted to RGB and resized with a Lanczos filter. Without a
/// path the mask keeps the upper half of the frame and blanks the lower half,
/// where the mouth sits in an aligned face crop.
pub fn load_fixed_mask(path: Option<&Path>, resolution: u32) -> Result<RgbImage, DatasetError> {
    match path {
        Some(path) => {
            log::debug!("Loading fixed mask from {}", path.display());
            let image = image::open(path)?.to_rgb8();
            Ok(image::imageops::resize(
                &image,
                resolution,
                resolution,
                FilterType::Lanczos3,
            ))
        }
        None => Ok(RgbImage::from_fn(resolution, resolution, |_, y| {
            if y < resolution / 2 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })),
    }
}

/// Resizes whole frames and applies the fixed mask.
///
/// Has no face landmarks, so affine alignment is refused.
#[derive(Debug, Clone)]
pub struct ResizeProcessor {
    resolution: u32,
    mask: GrayImage,
}

impl ResizeProcessor {
    /// Build from the dataset's processor settings.
    pub fn new(settings: &ProcessorSettings) -> Self {
        let mask = image::imageops::grayscale(settings.mask_image.as_ref());
        Self {
            resolution: settings.resolution,
            mask,
        }
    }

    /// [`ProcessorFactory`] entry point.
    pub fn create(settings: &ProcessorSettings) -> Result<Self, DatasetError> {
        Ok(Self::new(settings))
    }

    fn resize(&self, frame: &RgbImage) -> RgbImage {
        if frame.dimensions() == (self.resolution, self.resolution) {
            return frame.clone();
        }
        image::imageops::resize(frame, self.resolution, self.resolution, FilterType::Triangle)
    }

    fn apply_mask(&self, frame: &RgbImage) -> RgbImage {
        let mut masked = frame.clone();
        for (x, y, pixel) in masked.enumerate_pixels_mut() {
            let Luma([keep]) = *self.mask.get_pixel(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = ((*channel as u16 * keep as u16) / 255) as u8;
            }
        }
        masked
    }
}

impl ImageProcessor for ResizeProcessor {
    fn prepare_masks_and_masked_images(
        &mut self,
        frames: &FrameBatch,
        affine_transform: bool,
    ) -> Result<MaskedFrames, ProcessError> {
        if affine_transform {
            return Err(ProcessError(
                "affine alignment needs face landmarks, which ResizeProcessor does not detect"
                    .to_string(),
            ));
        }

        let pixel_values: FrameBatch = frames.iter().map(|frame| self.resize(frame)).collect();
        let masked_pixel_values = pixel_values
            .iter()
            .map(|frame| self.apply_mask(frame))
            .collect();
        let masks = vec![self.mask.clone(); pixel_values.len()];

        Ok(MaskedFrames {
            pixel_values,
            masked_pixel_values,
            masks,
        })
    }

    fn process_images(&mut self, frames: &FrameBatch) -> Result<FrameBatch, ProcessError> {
        Ok(frames.iter().map(|frame| self.resize(frame)).collect())
    }
}
