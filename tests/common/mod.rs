//! In-memory collaborators shared by the integration tests.
//!
//! Synthetic frames encode their own frame index: every pixel of frame `i`
//! has the value `i % 250 + 1`. Zero-valued frames stand for footage without
//! a detectable face.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use image::{Rgb, RgbImage};
use lipsync_dataset::{
    DatasetError, DecodeContext, FrameBatch, ImageProcessor, MaskedFrames, MediaBackend,
    ProcessError, ProcessorSettings, ResizeProcessor, Spectrogram, VideoReader,
};

/// Side length of synthetic frames and of the processed output.
pub const FRAME_SIZE: u32 = 8;

/// Audio samples per spectrogram column at 16 kHz.
pub const SAMPLES_PER_COLUMN: usize = 200;

/// Pixel value of synthetic frame `index`.
pub fn frame_value(index: usize) -> u8 {
    (index % 250 + 1) as u8
}

/// Frame index encoded in a synthetic frame.
pub fn frame_index(frame: &RgbImage) -> usize {
    frame.get_pixel(0, 0).0[0] as usize - 1
}

/// How a synthetic video behaves.
#[derive(Debug, Clone, Copy)]
pub struct VideoSpec {
    pub frame_count: usize,
    pub audio_seconds: f64,
    pub faceless: bool,
}

/// Counters shared between a backend and the readers it opened.
#[derive(Debug, Default)]
pub struct BackendCounters {
    pub opens: AtomicUsize,
    pub rewinds: AtomicUsize,
    pub audio_reads: AtomicUsize,
}

/// Media backend serving synthetic videos from a path table. Paths missing
/// from the table fail to open.
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    videos: HashMap<PathBuf, VideoSpec>,
    pub counters: Arc<BackendCounters>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A video with a face and `frame_count / 25` seconds of audio.
    pub fn with_video<P: Into<PathBuf>>(self, path: P, frame_count: usize) -> Self {
        self.with_spec(
            path,
            VideoSpec {
                frame_count,
                audio_seconds: frame_count as f64 / 25.0,
                faceless: false,
            },
        )
    }

    pub fn with_spec<P: Into<PathBuf>>(mut self, path: P, spec: VideoSpec) -> Self {
        self.videos.insert(path.into(), spec);
        self
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn rewinds(&self) -> usize {
        self.counters.rewinds.load(Ordering::SeqCst)
    }

    pub fn audio_reads(&self) -> usize {
        self.counters.audio_reads.load(Ordering::SeqCst)
    }
}

impl MediaBackend for SyntheticBackend {
    type Video = SyntheticReader;

    fn open_video(&self, path: &Path, _context: DecodeContext) -> Result<SyntheticReader, DatasetError> {
        let spec = self.videos.get(path).ok_or_else(|| DatasetError::Decode {
            path: path.to_path_buf(),
            reason: "No such file or directory".to_string(),
        })?;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(SyntheticReader {
            spec: *spec,
            position: 0,
            counters: Arc::clone(&self.counters),
        })
    }

    fn read_audio(
        &self,
        path: &Path,
        _context: DecodeContext,
        sample_rate: u32,
    ) -> Result<Vec<f32>, DatasetError> {
        let spec = self.videos.get(path).ok_or_else(|| DatasetError::Decode {
            path: path.to_path_buf(),
            reason: "no audio stream".to_string(),
        })?;
        self.counters.audio_reads.fetch_add(1, Ordering::SeqCst);
        let count = (spec.audio_seconds * sample_rate as f64).round() as usize;
        Ok(vec![0.25; count])
    }
}

/// Reader over one synthetic video.
#[derive(Debug)]
pub struct SyntheticReader {
    spec: VideoSpec,
    pub position: usize,
    counters: Arc<BackendCounters>,
}

impl VideoReader for SyntheticReader {
    fn frame_count(&self) -> usize {
        self.spec.frame_count
    }

    fn get_batch(&mut self, indices: &[usize]) -> Result<FrameBatch, DatasetError> {
        let frames = indices
            .iter()
            .map(|&index| {
                let value = if self.spec.faceless { 0 } else { frame_value(index) };
                RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb([value, value, value]))
            })
            .collect();
        self.position = indices.last().map_or(self.position, |last| last + 1);
        Ok(frames)
    }

    fn seek(&mut self, frame: usize) -> Result<(), DatasetError> {
        if frame == 0 {
            self.counters.rewinds.fetch_add(1, Ordering::SeqCst);
        }
        self.position = frame;
        Ok(())
    }
}

/// Extractor producing `rows × (samples / 200)` matrices whose value at
/// column `c` is `c`, so a cropped window reveals where it was cut.
#[derive(Debug)]
pub struct ColumnExtractor {
    pub rows: usize,
    pub calls: Arc<AtomicUsize>,
}

impl ColumnExtractor {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl lipsync_dataset::SpectrogramExtractor for ColumnExtractor {
    fn melspectrogram(&self, samples: &[f32]) -> Result<Spectrogram, DatasetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        column_spectrogram(self.rows, samples.len() / SAMPLES_PER_COLUMN)
    }
}

/// A `rows × cols` spectrogram whose value at column `c` is `c`.
pub fn column_spectrogram(rows: usize, cols: usize) -> Result<Spectrogram, DatasetError> {
    let data = (0..rows)
        .flat_map(|_| (0..cols).map(|col| col as f32))
        .collect();
    Spectrogram::new(rows, cols, data)
}

/// Call counts recorded by [`RecordingProcessor`]s.
#[derive(Debug, Default)]
pub struct ProcessorCalls {
    pub created: AtomicUsize,
    pub prepare: AtomicUsize,
    pub process: AtomicUsize,
}

/// Wraps [`ResizeProcessor`], counts calls, and rejects faceless frames.
#[derive(Debug)]
pub struct RecordingProcessor {
    inner: ResizeProcessor,
    calls: Arc<ProcessorCalls>,
}

impl RecordingProcessor {
    /// A factory closure sharing `calls` with every processor it builds.
    pub fn factory(
        calls: Arc<ProcessorCalls>,
    ) -> impl Fn(&ProcessorSettings) -> Result<RecordingProcessor, DatasetError> + Send + Sync {
        move |settings: &ProcessorSettings| {
            calls.created.fetch_add(1, Ordering::SeqCst);
            Ok(RecordingProcessor {
                inner: ResizeProcessor::new(settings),
                calls: Arc::clone(&calls),
            })
        }
    }

    fn detect_face(frames: &FrameBatch) -> Result<(), ProcessError> {
        if frames.iter().any(|frame| frame.get_pixel(0, 0).0[0] == 0) {
            return Err(ProcessError("Face not detected".to_string()));
        }
        Ok(())
    }
}

impl ImageProcessor for RecordingProcessor {
    fn prepare_masks_and_masked_images(
        &mut self,
        frames: &FrameBatch,
        affine_transform: bool,
    ) -> Result<MaskedFrames, ProcessError> {
        self.calls.prepare.fetch_add(1, Ordering::SeqCst);
        Self::detect_face(frames)?;
        self.inner.prepare_masks_and_masked_images(frames, affine_transform)
    }

    fn process_images(&mut self, frames: &FrameBatch) -> Result<FrameBatch, ProcessError> {
        self.calls.process.fetch_add(1, Ordering::SeqCst);
        Self::detect_face(frames)?;
        self.inner.process_images(frames)
    }
}

/// Write `paths` to `<directory>/fileslist.txt`, one per line.
pub fn write_fileslist(directory: &Path, paths: &[&str]) -> PathBuf {
    let fileslist = directory.join("fileslist.txt");
    std::fs::write(&fileslist, paths.join("\n")).expect("Failed to write file list");
    fileslist
}

/// Install a test logger; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
