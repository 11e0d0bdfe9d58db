//! Video and audio decoding interfaces.
//!
//! Decoding is delegated to a [`MediaBackend`]. A backend opens a
//! [`VideoReader`] per sample attempt, bound to the worker that requested
//! it, and decodes the full audio track on demand. The `ffmpeg` feature
//! provides [`FfmpegBackend`](crate::FfmpegBackend); tests and other runtimes
//! plug in their own.

use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use image::RgbImage;

use crate::{error::DatasetError, registry::WorkerId};

/// Decoded frames, in the order they were requested.
pub type FrameBatch = Vec<RgbImage>;

/// Execution context a decoder is bound to.
///
/// Decoders are not shared between workers; the context tells the backend
/// which worker it is decoding for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DecodeContext {
    /// Worker performing the decode.
    pub worker_id: WorkerId,
}

impl DecodeContext {
    /// Context for `worker_id`.
    pub fn new(worker_id: WorkerId) -> Self {
        Self { worker_id }
    }
}

/// An opened video, positioned somewhere in its frame sequence.
pub trait VideoReader {
    /// Total number of decodable frames.
    fn frame_count(&self) -> usize;

    /// Decode the frames at `indices`, returned in the same order.
    fn get_batch(&mut self, indices: &[usize]) -> Result<FrameBatch, DatasetError>;

    /// Reposition the reader at `frame`.
    fn seek(&mut self, frame: usize) -> Result<(), DatasetError>;
}

/// Opens videos and decodes audio tracks.
pub trait MediaBackend: Send + Sync {
    /// Reader type produced by [`open_video`](Self::open_video).
    type Video: VideoReader;

    /// Open the video at `path` for the worker in `context`.
    fn open_video(&self, path: &Path, context: DecodeContext) -> Result<Self::Video, DatasetError>;

    /// Decode the whole audio track of `path` as mono samples at
    /// `sample_rate`.
    fn read_audio(
        &self,
        path: &Path,
        context: DecodeContext,
        sample_rate: u32,
    ) -> Result<Vec<f32>, DatasetError>;
}

/// Owns a [`VideoReader`] and rewinds it to frame 0 when dropped.
///
/// Rewinding before release bounds native buffer growth when the same
/// process opens many videos. The rewind runs on every exit path, success or
/// failure; a failed rewind is logged and otherwise ignored.
pub struct RewindGuard<V: VideoReader> {
    reader: V,
    path: PathBuf,
}

impl<V: VideoReader> RewindGuard<V> {
    /// Guard `reader`, opened from `path`.
    pub fn new(reader: V, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
        }
    }
}

impl<V: VideoReader> Deref for RewindGuard<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.reader
    }
}

impl<V: VideoReader> DerefMut for RewindGuard<V> {
    fn deref_mut(&mut self) -> &mut V {
        &mut self.reader
    }
}

impl<V: VideoReader> Drop for RewindGuard<V> {
    fn drop(&mut self) {
        if let Err(error) = self.reader.seek(0) {
            log::warn!("Failed to rewind {}: {error}", self.path.display());
        }
    }
}
