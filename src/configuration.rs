//! Dataset configuration.
//!
//! [`TrainingConfig`] mirrors the sections of a training run's configuration
//! file that the dataset consumes: `data`, `model`, and `run`. It can be
//! deserialized from JSON or assembled with the `with_*` builder methods.
//!
//! # Example
//!
//! ```
//! use lipsync_dataset::{MaskMode, TrainingConfig};
//!
//! let config = TrainingConfig::new()
//!     .with_train_fileslist("data/train.txt")
//!     .with_num_frames(16)
//!     .with_mask(MaskMode::FixMask)
//!     .with_audio(true)
//!     .with_mel_cache_dir("cache/mel");
//!
//! assert!(config.load_audio_data());
//! assert_eq!(config.mel_window_length().unwrap(), 52);
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{alignment, error::DatasetError};

/// How the image processor masks the ground-truth and reference frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMode {
    /// A fixed mask image is applied to every frame. Reference frames are
    /// masked the same way as the ground truth.
    #[default]
    FixMask,
    /// The mouth region is masked.
    Mouth,
    /// The whole face is masked.
    Face,
    /// The eye region is masked.
    Eye,
}

impl Display for MaskMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MaskMode::FixMask => write!(f, "fix_mask"),
            MaskMode::Mouth => write!(f, "mouth"),
            MaskMode::Face => write!(f, "face"),
            MaskMode::Eye => write!(f, "eye"),
        }
    }
}

impl FromStr for MaskMode {
    type Err = DatasetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fix_mask" => Ok(MaskMode::FixMask),
            "mouth" => Ok(MaskMode::Mouth),
            "face" => Ok(MaskMode::Face),
            "eye" => Ok(MaskMode::Eye),
            other => Err(DatasetError::Configuration(format!(
                "unknown mask mode {other:?}"
            ))),
        }
    }
}

/// The `data` section: where videos come from and how samples are shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory scanned for `.mp4` files when no file list is given.
    pub train_data_dir: PathBuf,
    /// File with one video path per line. Takes precedence when non-empty.
    pub train_fileslist: PathBuf,
    /// Side length in pixels of processed frames.
    pub resolution: u32,
    /// Frames per window. Only 16 and 5 are supported.
    pub num_frames: usize,
    /// Sample rate the audio track is decoded at.
    pub audio_sample_rate: u32,
    /// Frame rate used to align frames with spectrogram columns.
    pub video_fps: f64,
    /// Masking strategy handed to the image processor.
    pub mask: MaskMode,
    /// Image used as the fixed mask. `None` blanks the lower half of each frame.
    pub mask_image_path: Option<PathBuf>,
    /// Directory holding cached spectrograms.
    pub audio_mel_cache_dir: PathBuf,
    /// Cap on sample attempts per request. `None` retries forever.
    pub max_attempts: Option<usize>,
    /// Base seed for per-worker random number generators.
    pub seed: Option<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_data_dir: PathBuf::new(),
            train_fileslist: PathBuf::new(),
            resolution: 256,
            num_frames: 16,
            audio_sample_rate: 16_000,
            video_fps: 25.0,
            mask: MaskMode::FixMask,
            mask_image_path: None,
            audio_mel_cache_dir: PathBuf::new(),
            max_attempts: None,
            seed: None,
        }
    }
}

/// The `model` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Whether the model consumes audio features.
    pub add_audio_layer: bool,
}

/// The `run` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Whether the sync loss is enabled for this run.
    pub use_syncnet: bool,
}

/// Complete configuration consumed by [`UnetDataset`](crate::UnetDataset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Data options.
    pub data: DataConfig,
    /// Model options.
    pub model: ModelConfig,
    /// Run options.
    pub run: RunConfig,
}

impl TrainingConfig {
    /// Create a configuration with default settings.
    ///
    /// Defaults: 16 frames, 256 px, 25 fps, 16 kHz audio, fixed mask, audio
    /// disabled, unbounded retries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a JSON string. Omitted fields keep their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DatasetError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Set the file list.
    #[must_use]
    pub fn with_train_fileslist<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data.train_fileslist = path.into();
        self
    }

    /// Set the directory scanned when no file list is configured.
    #[must_use]
    pub fn with_train_data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data.train_data_dir = path.into();
        self
    }

    /// Set the window length in frames.
    #[must_use]
    pub fn with_num_frames(mut self, num_frames: usize) -> Self {
        self.data.num_frames = num_frames;
        self
    }

    /// Set the processed frame resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.data.resolution = resolution;
        self
    }

    /// Set the video frame rate used for alignment.
    #[must_use]
    pub fn with_video_fps(mut self, fps: f64) -> Self {
        self.data.video_fps = fps;
        self
    }

    /// Set the audio decoding sample rate.
    #[must_use]
    pub fn with_audio_sample_rate(mut self, sample_rate: u32) -> Self {
        self.data.audio_sample_rate = sample_rate;
        self
    }

    /// Set the mask mode.
    #[must_use]
    pub fn with_mask(mut self, mask: MaskMode) -> Self {
        self.data.mask = mask;
        self
    }

    /// Set the image loaded as the fixed mask.
    #[must_use]
    pub fn with_mask_image<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data.mask_image_path = Some(path.into());
        self
    }

    /// Set the spectrogram cache directory.
    #[must_use]
    pub fn with_mel_cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data.audio_mel_cache_dir = path.into();
        self
    }

    /// Enable or disable audio loading. Sets both `model.add_audio_layer`
    /// and `run.use_syncnet`.
    #[must_use]
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.model.add_audio_layer = enabled;
        self.run.use_syncnet = enabled;
        self
    }

    /// Cap the number of sample attempts per request.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.data.max_attempts = Some(attempts);
        self
    }

    /// Seed the per-worker random number generators.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.data.seed = Some(seed);
        self
    }

    /// Returns `true` if audio windows are loaded for every sample.
    pub fn load_audio_data(&self) -> bool {
        self.model.add_audio_layer && self.run.use_syncnet
    }

    /// Number of spectrogram columns aligned with one window.
    ///
    /// # Errors
    ///
    /// [`DatasetError::Configuration`] for unsupported window lengths.
    pub fn mel_window_length(&self) -> Result<usize, DatasetError> {
        alignment::mel_window_length(self.data.num_frames)
    }

    /// Check the options that can be checked without touching the file
    /// system. Path sources are checked when the index is resolved.
    pub fn validate(&self) -> Result<(), DatasetError> {
        self.mel_window_length()?;

        if self.data.resolution == 0 {
            return Err(DatasetError::Configuration(
                "resolution must be greater than zero".to_string(),
            ));
        }
        if !(self.data.video_fps > 0.0) {
            return Err(DatasetError::Configuration(format!(
                "video_fps must be positive, got {}",
                self.data.video_fps
            )));
        }
        if self.load_audio_data() {
            if self.data.audio_sample_rate == 0 {
                return Err(DatasetError::Configuration(
                    "audio_sample_rate must be greater than zero".to_string(),
                ));
            }
            if self.data.audio_mel_cache_dir.as_os_str().is_empty() {
                return Err(DatasetError::Configuration(
                    "audio_mel_cache_dir is required when audio loading is enabled".to_string(),
                ));
            }
        }
        if self.data.max_attempts == Some(0) {
            return Err(DatasetError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
