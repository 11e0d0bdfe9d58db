//! # lipsync-dataset
//!
//! Training-sample assembly for audio-conditioned lip-sync models.
//!
//! `lipsync-dataset` turns a list of talking-head videos into training
//! samples: a window of consecutive frames (the ground truth), the same
//! frames with the mouth region masked, a reference window from elsewhere in
//! the same video, and optionally the slice of the audio spectrogram that
//! lines up with the ground-truth frames.
//!
//! Decoding, spectrogram extraction, and face processing are pluggable
//! ([`MediaBackend`], [`SpectrogramExtractor`], [`ImageProcessor`]). The
//! crate owns the parts in between: window sampling, audio-visual alignment,
//! the on-disk spectrogram cache, per-worker resources, and the retry loop
//! that skips broken videos.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn main() -> Result<(), lipsync_dataset::DatasetError> {
//! use lipsync_dataset::{
//!     FfmpegBackend, ResizeProcessor, Spectrogram, TrainingConfig, UnetDataset,
//! };
//!
//! let config = TrainingConfig::from_json_file("configs/unet.json")?;
//! let extractor = |samples: &[f32]| {
//!     // Plug a real mel filterbank in here.
//!     let cols = samples.len() / 200;
//!     Spectrogram::new(80, cols, vec![0.0; 80 * cols])
//! };
//!
//! let dataset = UnetDataset::new(config, FfmpegBackend::new()?, extractor, ResizeProcessor::create)?;
//! let sample = dataset.get_item(0)?;
//! println!("{} frames from {}", sample.gt.len(), sample.video_path.display());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ffmpeg"))]
//! # fn main() {}
//! ```
//!
//! ## Features
//!
//! - **Window sampling**: a positive window and a non-overlapping negative
//!   window per sample
//! - **Audio alignment**: 80 spectrogram columns per second, mapped from
//!   frame indices at the configured frame rate
//! - **Spectrogram cache**: one file per video, written atomically, deleted
//!   and rebuilt when corrupt
//! - **Self-healing retries**: failed attempts are logged and another video
//!   is drawn, with an optional attempt cap
//! - **Per-worker resources**: each worker owns its image processor and
//!   random number generator
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | `WorkerPool` fetches batches on a rayon thread pool (default) |
//! | `ffmpeg` | `FfmpegBackend` decodes videos and audio with FFmpeg |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! The `ffmpeg` feature needs the FFmpeg development libraries installed on
//! your system.

pub mod alignment;
pub mod configuration;
#[cfg(feature = "ffmpeg")]
mod conversion;
pub mod dataset;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod index;
pub mod media;
pub mod mel_cache;
#[cfg(feature = "rayon")]
pub mod pool;
pub mod processor;
pub mod registry;
pub mod spectrogram;
pub mod window;

pub use alignment::{AudioAligner, mel_window_length};
pub use configuration::{DataConfig, MaskMode, ModelConfig, RunConfig, TrainingConfig};
pub use dataset::{Sample, UnetDataset};
pub use error::DatasetError;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegBackend, FfmpegVideo};
pub use index::{DatasetIndex, VIDEO_EXTENSION};
pub use media::{DecodeContext, FrameBatch, MediaBackend, RewindGuard, VideoReader};
pub use mel_cache::{MEL_CACHE_SUFFIX, SpectrogramCache};
#[cfg(feature = "rayon")]
pub use pool::WorkerPool;
pub use processor::{
    ImageProcessor, MaskedFrames, ProcessError, ProcessorFactory, ProcessorSettings,
    ResizeProcessor, load_fixed_mask,
};
pub use registry::{WorkerId, WorkerRegistry, WorkerSlot, current_worker_id, set_current_worker_id};
pub use spectrogram::{MEL_COLUMNS_PER_SECOND, MelWindow, Spectrogram, SpectrogramExtractor};
pub use window::{FrameWindows, WindowSampler};
