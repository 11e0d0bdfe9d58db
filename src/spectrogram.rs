//! Spectrogram matrices and the extractor interface.
//!
//! A [`Spectrogram`] is a dense `rows × cols` matrix of `f32` (mel bins by
//! time columns, row-major). The extractor that produces it is external to
//! this crate; it only has to honour a fixed hop rate of
//! [`MEL_COLUMNS_PER_SECOND`] columns per second of audio.

use crate::error::DatasetError;

/// Spectrogram columns per second of audio produced by the extractor.
pub const MEL_COLUMNS_PER_SECOND: f64 = 80.0;

/// Full-length time-frequency matrix for one video's audio track.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Spectrogram {
    /// Wrap row-major `data` of shape `rows × cols`.
    ///
    /// # Errors
    ///
    /// [`DatasetError::Spectrogram`] if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, DatasetError> {
        if data.len() != rows * cols {
            return Err(DatasetError::Spectrogram(format!(
                "expected {rows}x{cols} = {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Number of frequency bins.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of time columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Copy columns `[start, end)` into a single-channel [`MelWindow`].
    ///
    /// Columns past the end of the spectrogram are dropped, not padded, so
    /// the window may come back narrower than requested.
    pub fn slice_columns(&self, start: usize, end: usize) -> MelWindow {
        let end = end.min(self.cols);
        let start = start.min(end);
        let width = end - start;

        let mut data = Vec::with_capacity(self.rows * width);
        for row in 0..self.rows {
            let offset = row * self.cols;
            data.extend_from_slice(&self.data[offset + start..offset + end]);
        }

        MelWindow {
            rows: self.rows,
            cols: width,
            data,
        }
    }
}

/// Spectrogram slice aligned with a positive window, shaped `[1, rows, cols]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MelWindow {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl MelWindow {
    /// Shape including the leading channel axis.
    pub fn shape(&self) -> [usize; 3] {
        [1, self.rows, self.cols]
    }

    /// Number of frequency bins.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of time columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Turns raw mono audio samples into a [`Spectrogram`].
///
/// Implementations must produce [`MEL_COLUMNS_PER_SECOND`] columns per second
/// of audio at the sample rate the dataset decodes with. Any
/// `Fn(&[f32]) -> Result<Spectrogram, DatasetError>` closure is an extractor.
pub trait SpectrogramExtractor: Send + Sync {
    /// Compute the spectrogram of `samples`.
    fn melspectrogram(&self, samples: &[f32]) -> Result<Spectrogram, DatasetError>;
}

impl<F> SpectrogramExtractor for F
where
    F: Fn(&[f32]) -> Result<Spectrogram, DatasetError> + Send + Sync,
{
    fn melspectrogram(&self, samples: &[f32]) -> Result<Spectrogram, DatasetError> {
        self(samples)
    }
}
