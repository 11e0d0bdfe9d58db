//! Error types for the `lipsync-dataset` crate.
//!
//! This module defines [`DatasetError`], the unified error type returned by
//! every fallible operation in the crate. Most variants describe a failure of
//! a single sample attempt; the dataset's retry loop swallows those and picks
//! another video. Configuration problems surface at construction; only an
//! uninitialised worker or an exhausted retry cap ever reaches the caller of
//! [`UnetDataset::get_item`](crate::UnetDataset::get_item).

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

use crate::registry::WorkerId;

/// The unified error type for all dataset operations.
///
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    /// The configuration is invalid. Raised at construction, never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The file list could not be read.
    #[error("Failed to read file list at {path}: {source}")]
    ManifestRead {
        /// Path of the manifest.
        path: PathBuf,
        /// Underlying I/O error.
        source: IoError,
    },

    /// The training data directory could not be listed.
    #[error("Failed to scan data directory {path}: {source}")]
    DirectoryScan {
        /// Directory that was scanned.
        path: PathBuf,
        /// Underlying I/O error.
        source: IoError,
    },

    /// The video has too few frames to hold a positive and a negative window.
    #[error("Video {path} has {frame_count} frames, at least {required} are needed")]
    VideoTooShort {
        /// Offending video.
        path: PathBuf,
        /// Decoded frame count.
        frame_count: usize,
        /// Minimum frame count (three windows).
        required: usize,
    },

    /// The video or its audio track could not be decoded.
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// Offending video.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The image processor rejected a frame batch (e.g. no face detected).
    #[error("Failed to process frames of {path}: {reason}")]
    Processing {
        /// Offending video.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The spectrogram extractor failed.
    #[error("Spectrogram extraction failed: {0}")]
    Spectrogram(String),

    /// A spectrogram cache file exists but could not be loaded.
    #[error("Corrupt spectrogram cache file {path}: {reason}")]
    CacheCorruption {
        /// Cache file path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The cropped mel window is shorter than the configured length.
    #[error("Mel window has {actual} columns, expected {expected}")]
    AudioWindowMismatch {
        /// Configured window length.
        expected: usize,
        /// Columns actually available.
        actual: usize,
    },

    /// A sample was requested on a worker whose resources were never created.
    #[error("Worker {0} has not been initialised")]
    WorkerNotInitialized(WorkerId),

    /// The configured attempt cap was reached without producing a sample.
    #[error("No valid sample after {attempts} attempts (last error: {last_error})")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// Description of the final failure.
        last_error: String,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// A configuration file could not be parsed.
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),
}

impl DatasetError {
    /// Returns `true` if the error only invalidates the current sample
    /// attempt. Setup errors return `false`; the retry loop still contains
    /// them when a collaborator raises one mid-attempt, but logs them at
    /// `error` level.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DatasetError::Configuration(_)
                | DatasetError::ManifestRead { .. }
                | DatasetError::DirectoryScan { .. }
                | DatasetError::WorkerNotInitialized(_)
                | DatasetError::RetriesExhausted { .. }
        )
    }

    /// Short name of the failure kind, used in retry log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            DatasetError::Configuration(_) => "Configuration",
            DatasetError::ManifestRead { .. } => "ManifestRead",
            DatasetError::DirectoryScan { .. } => "DirectoryScan",
            DatasetError::VideoTooShort { .. } => "VideoTooShort",
            DatasetError::Decode { .. } => "Decode",
            DatasetError::Processing { .. } => "Processing",
            DatasetError::Spectrogram(_) => "Spectrogram",
            DatasetError::CacheCorruption { .. } => "CacheCorruption",
            DatasetError::AudioWindowMismatch { .. } => "AudioWindowMismatch",
            DatasetError::WorkerNotInitialized(_) => "WorkerNotInitialized",
            DatasetError::RetriesExhausted { .. } => "RetriesExhausted",
            DatasetError::Io(_) => "Io",
            DatasetError::Image(_) => "Image",
            DatasetError::Json(_) => "Json",
            #[cfg(feature = "ffmpeg")]
            DatasetError::Ffmpeg(_) => "Ffmpeg",
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for DatasetError {
    fn from(error: ffmpeg_next::Error) -> Self {
        DatasetError::Ffmpeg(error.to_string())
    }
}
