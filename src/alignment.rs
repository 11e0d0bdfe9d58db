//! Audio-visual alignment.
//!
//! Maps the first frame of a positive window to the spectrogram columns that
//! cover the same stretch of time:
//!
//! ```text
//! start_col = floor(80 * start_frame / fps)
//! end_col   = start_col + mel_window_length(num_frames)
//! ```

use std::ops::Range;

use crate::{
    error::DatasetError,
    spectrogram::{MEL_COLUMNS_PER_SECOND, MelWindow, Spectrogram},
};

/// Spectrogram columns that accompany a window of `num_frames` frames.
///
/// # Errors
///
/// [`DatasetError::Configuration`] for anything other than 16 or 5 frames.
pub fn mel_window_length(num_frames: usize) -> Result<usize, DatasetError> {
    match num_frames {
        16 => Ok(52),
        5 => Ok(16),
        other => Err(DatasetError::Configuration(format!(
            "only 16 and 5 frames are supported, got {other}"
        ))),
    }
}

/// Crops spectrograms to the columns aligned with a frame window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioAligner {
    video_fps: f64,
    mel_window_length: usize,
}

impl AudioAligner {
    /// Create an aligner for windows of `num_frames` at `video_fps`.
    pub fn new(num_frames: usize, video_fps: f64) -> Result<Self, DatasetError> {
        if !(video_fps > 0.0) {
            return Err(DatasetError::Configuration(format!(
                "video_fps must be positive, got {video_fps}"
            )));
        }
        Ok(Self {
            video_fps,
            mel_window_length: mel_window_length(num_frames)?,
        })
    }

    /// Columns per aligned window.
    pub fn mel_window_length(&self) -> usize {
        self.mel_window_length
    }

    /// First spectrogram column of the frame at `start_index`.
    pub fn start_column(&self, start_index: usize) -> usize {
        (MEL_COLUMNS_PER_SECOND * (start_index as f64 / self.video_fps)) as usize
    }

    /// Column range aligned with the window starting at `start_index`.
    pub fn column_range(&self, start_index: usize) -> Range<usize> {
        let start = self.start_column(start_index);
        start..start + self.mel_window_length
    }

    /// Slice `spectrogram` to the window starting at `start_index`.
    ///
    /// The result is truncated when the spectrogram is too short; callers
    /// compare its width against [`mel_window_length`](Self::mel_window_length).
    pub fn crop(&self, spectrogram: &Spectrogram, start_index: usize) -> MelWindow {
        let columns = self.column_range(start_index);
        spectrogram.slice_columns(columns.start, columns.end)
    }

    /// Like [`crop`](Self::crop), but rejects truncated windows.
    ///
    /// # Errors
    ///
    /// [`DatasetError::AudioWindowMismatch`] if fewer columns are available.
    pub fn crop_exact(
        &self,
        spectrogram: &Spectrogram,
        start_index: usize,
    ) -> Result<MelWindow, DatasetError> {
        let window = self.crop(spectrogram, start_index);
        if window.cols() != self.mel_window_length {
            return Err(DatasetError::AudioWindowMismatch {
                expected: self.mel_window_length,
                actual: window.cols(),
            });
        }
        Ok(window)
    }
}
