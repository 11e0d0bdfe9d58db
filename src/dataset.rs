//! Training sample assembly.
//!
//! [`UnetDataset`] turns a list of raw videos into training samples. Each
//! request runs the same pipeline until it succeeds:
//!
//! ```text
//! SELECT -> DECODE -> SAMPLE_WINDOWS -> [AUDIO] -> PROCESS -> DONE
//!    ^________________________|____________|___________|
//!                  any failure: log, rewind, pick again
//! ```
//!
//! The requested index is ignored: every attempt draws a fresh video
//! uniformly at random, so one corrupt file only costs a retry. Ordering is
//! therefore never reproducible across runs unless a seed is configured.

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::Arc,
};

use image::GrayImage;
use rand::Rng;

use crate::{
    alignment::AudioAligner,
    configuration::{MaskMode, TrainingConfig},
    error::DatasetError,
    index::DatasetIndex,
    media::{DecodeContext, FrameBatch, MediaBackend, RewindGuard, VideoReader},
    mel_cache::SpectrogramCache,
    processor::{
        ImageProcessor, ProcessError, ProcessorFactory, ProcessorSettings, load_fixed_mask,
    },
    registry::{self, WorkerId, WorkerRegistry, WorkerSlot},
    spectrogram::{MelWindow, SpectrogramExtractor},
    window::{FrameWindows, WindowSampler},
};

/// One training sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Processed frames of the positive window.
    pub gt: FrameBatch,
    /// Positive window with the mask applied.
    pub masked_gt: FrameBatch,
    /// Processed frames of the negative (reference) window.
    pub reference: FrameBatch,
    /// Masks of the positive window.
    pub mask: Vec<GrayImage>,
    /// Aligned spectrogram window, `None` when audio loading is disabled.
    pub mel: Option<MelWindow>,
    /// Video the sample was drawn from.
    pub video_path: PathBuf,
    /// First frame of the positive window.
    pub start_idx: usize,
}

/// Pipeline stage an attempt failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Decode,
    SampleWindows,
    Audio,
    Process,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Stage::Decode => write!(f, "decode"),
            Stage::SampleWindows => write!(f, "sample_windows"),
            Stage::Audio => write!(f, "audio"),
            Stage::Process => write!(f, "process"),
        }
    }
}

/// A failed attempt, tagged with where it failed.
struct AttemptFailure {
    stage: Stage,
    error: DatasetError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, AttemptFailure>;
}

impl<T> AtStage<T> for Result<T, DatasetError> {
    fn at(self, stage: Stage) -> Result<T, AttemptFailure> {
        self.map_err(|error| AttemptFailure { stage, error })
    }
}

/// Lip-sync training dataset.
///
/// Generic over the decoder ([`MediaBackend`]), the spectrogram extractor,
/// and the factory building each worker's [`ImageProcessor`].
///
/// # Example
///
/// ```no_run
/// use lipsync_dataset::{ResizeProcessor, Spectrogram, TrainingConfig, UnetDataset};
/// # use lipsync_dataset::{DatasetError, DecodeContext, FrameBatch, MediaBackend, VideoReader};
/// # use std::path::Path;
/// # struct Backend;
/// # struct Reader;
/// # impl VideoReader for Reader {
/// #     fn frame_count(&self) -> usize { 0 }
/// #     fn get_batch(&mut self, _: &[usize]) -> Result<FrameBatch, DatasetError> { Ok(Vec::new()) }
/// #     fn seek(&mut self, _: usize) -> Result<(), DatasetError> { Ok(()) }
/// # }
/// # impl MediaBackend for Backend {
/// #     type Video = Reader;
/// #     fn open_video(&self, _: &Path, _: DecodeContext) -> Result<Reader, DatasetError> { Ok(Reader) }
/// #     fn read_audio(&self, _: &Path, _: DecodeContext, _: u32) -> Result<Vec<f32>, DatasetError> { Ok(Vec::new()) }
/// # }
///
/// let config = TrainingConfig::new()
///     .with_train_fileslist("data/train.txt")
///     .with_num_frames(16);
/// let extractor = |_: &[f32]| Spectrogram::new(80, 0, Vec::new());
/// let dataset = UnetDataset::new(config, Backend, extractor, ResizeProcessor::create)?;
///
/// let sample = dataset.get_item(0)?;
/// assert_eq!(sample.gt.len(), 16);
/// # Ok::<(), DatasetError>(())
/// ```
pub struct UnetDataset<B, X, F>
where
    B: MediaBackend,
    X: SpectrogramExtractor,
    F: ProcessorFactory,
{
    index: DatasetIndex,
    config: TrainingConfig,
    sampler: WindowSampler,
    aligner: AudioAligner,
    mel_cache: Option<SpectrogramCache>,
    backend: B,
    extractor: X,
    factory: F,
    settings: ProcessorSettings,
    workers: WorkerRegistry<F::Processor>,
}

impl<B, X, F> Debug for UnetDataset<B, X, F>
where
    B: MediaBackend,
    X: SpectrogramExtractor,
    F: ProcessorFactory,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("UnetDataset")
            .field("len", &self.index.len())
            .field("num_frames", &self.sampler.num_frames())
            .field("mel_window_length", &self.aligner.mel_window_length())
            .field("load_audio_data", &self.mel_cache.is_some())
            .field("mask", &self.settings.mask)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl<B, X, F> UnetDataset<B, X, F>
where
    B: MediaBackend,
    X: SpectrogramExtractor,
    F: ProcessorFactory,
{
    /// Build a dataset, resolving the video index from the configured file
    /// list or data directory.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Configuration`] for invalid options, including
    ///   both path sources empty and unsupported `num_frames`.
    /// - [`DatasetError::ManifestRead`] / [`DatasetError::DirectoryScan`]
    ///   if the path source cannot be read.
    /// - Any error from loading the fixed mask, creating the cache
    ///   directory, or building worker 0's processor.
    pub fn new(config: TrainingConfig, backend: B, extractor: X, factory: F) -> Result<Self, DatasetError> {
        config.validate()?;
        let index = DatasetIndex::resolve(&config.data.train_fileslist, &config.data.train_data_dir)?;
        Self::with_index(index, config, backend, extractor, factory)
    }

    /// Build a dataset over an index resolved elsewhere. The configured path
    /// sources are ignored.
    pub fn with_index(
        index: DatasetIndex,
        config: TrainingConfig,
        backend: B,
        extractor: X,
        factory: F,
    ) -> Result<Self, DatasetError> {
        config.validate()?;
        if index.is_empty() {
            return Err(DatasetError::Configuration(
                "dataset index is empty".to_string(),
            ));
        }

        let data = &config.data;
        let sampler = WindowSampler::new(data.num_frames);
        let aligner = AudioAligner::new(data.num_frames, data.video_fps)?;

        let mask_image = load_fixed_mask(data.mask_image_path.as_deref(), data.resolution)?;
        let settings = ProcessorSettings {
            resolution: data.resolution,
            mask: data.mask,
            mask_image: Arc::new(mask_image),
        };

        let mel_cache = if config.load_audio_data() {
            Some(SpectrogramCache::new(&data.audio_mel_cache_dir)?)
        } else {
            None
        };

        // Worker 0 serves callers that never run a worker init hook.
        let workers = WorkerRegistry::new(data.seed);
        workers.register(0, factory.create(&settings)?);

        log::debug!(
            "Built dataset: {} videos, {} frames per window, audio {}",
            index.len(),
            data.num_frames,
            if mel_cache.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            index,
            config,
            sampler,
            aligner,
            mel_cache,
            backend,
            extractor,
            factory,
            settings,
            workers,
        })
    }

    /// Number of videos in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the index is empty (never, once constructed).
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The resolved video index.
    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    /// The configuration the dataset was built with.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Spectrogram columns per sample.
    pub fn mel_window_length(&self) -> usize {
        self.aligner.mel_window_length()
    }

    /// The spectrogram cache, when audio loading is enabled.
    pub fn mel_cache(&self) -> Option<&SpectrogramCache> {
        self.mel_cache.as_ref()
    }

    /// Number of workers with resources.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Worker init hook: bind the calling thread to `worker_id` and give the
    /// worker its own processor and random number generator.
    ///
    /// Call once from every worker thread before it requests samples.
    pub fn init_worker(&self, worker_id: WorkerId) -> Result<(), DatasetError> {
        registry::set_current_worker_id(worker_id);
        let processor = self.factory.create(&self.settings)?;
        self.workers.register(worker_id, processor);
        Ok(())
    }

    /// Produce one sample on the calling thread's worker.
    ///
    /// `_index` is ignored; each attempt draws a random video. Every failing
    /// attempt is logged and retried, whatever error the backend, extractor,
    /// or processor raised, so this only returns an error when the worker
    /// was never initialised or `max_attempts` is exhausted.
    pub fn get_item(&self, _index: usize) -> Result<Sample, DatasetError> {
        let worker_id = registry::current_worker_id();
        self.workers
            .with_slot(worker_id, |slot| self.sample_until_valid(worker_id, slot))?
    }

    fn sample_until_valid(
        &self,
        worker_id: WorkerId,
        slot: &mut WorkerSlot<F::Processor>,
    ) -> Result<Sample, DatasetError> {
        let max_attempts = self.config.data.max_attempts;
        let mut attempts = 0usize;

        loop {
            attempts += 1;

            // SELECT
            let position = slot.rng.gen_range(0..self.index.len());
            let path = &self.index.paths()[position];

            let failure = match self.attempt(path, worker_id, slot) {
                Ok(sample) => return Ok(sample),
                Err(failure) => failure,
            };

            // Whatever a collaborator raised, it only costs this attempt.
            self.log_failure(path, &failure);

            if max_attempts.is_some_and(|max| attempts >= max) {
                log::error!(
                    "Giving up after {attempts} attempts on worker {worker_id}: {}",
                    failure.error
                );
                return Err(DatasetError::RetriesExhausted {
                    attempts,
                    last_error: failure.error.to_string(),
                });
            }
        }
    }

    fn attempt(
        &self,
        path: &Path,
        worker_id: WorkerId,
        slot: &mut WorkerSlot<F::Processor>,
    ) -> Result<Sample, AttemptFailure> {
        let context = DecodeContext::new(worker_id);

        // DECODE
        let reader = self.backend.open_video(path, context).at(Stage::Decode)?;
        let mut video = RewindGuard::new(reader, path);
        let frame_count = video.frame_count();

        // SAMPLE_WINDOWS
        let windows = self
            .sampler
            .sample(frame_count, &mut slot.rng)
            .ok_or_else(|| DatasetError::VideoTooShort {
                path: path.to_path_buf(),
                frame_count,
                required: self.sampler.min_frame_count(),
            })
            .at(Stage::SampleWindows)?;
        let (continuous_frames, ref_frames) =
            self.read_windows(&mut *video, path, &windows).at(Stage::Decode)?;

        // AUDIO
        let mel = match &self.mel_cache {
            Some(cache) => Some(
                self.mel_window(cache, path, context, windows.start_index)
                    .at(Stage::Audio)?,
            ),
            None => None,
        };

        // PROCESS
        let sample = self
            .process(&mut slot.processor, path, &continuous_frames, &ref_frames)
            .at(Stage::Process)?;

        drop(video);
        Ok(Sample {
            mel,
            start_idx: windows.start_index,
            ..sample
        })
    }

    fn read_windows(
        &self,
        video: &mut B::Video,
        path: &Path,
        windows: &FrameWindows,
    ) -> Result<(FrameBatch, FrameBatch), DatasetError> {
        let positive = video.get_batch(&windows.positive)?;
        let negative = video.get_batch(&windows.negative)?;

        let expected = self.sampler.num_frames();
        for batch in [&positive, &negative] {
            if batch.len() != expected {
                return Err(DatasetError::Decode {
                    path: path.to_path_buf(),
                    reason: format!("decoder returned {} of {expected} frames", batch.len()),
                });
            }
        }
        Ok((positive, negative))
    }

    fn mel_window(
        &self,
        cache: &SpectrogramCache,
        path: &Path,
        context: DecodeContext,
        start_index: usize,
    ) -> Result<MelWindow, DatasetError> {
        let spectrogram = cache.get_or_compute(path, || {
            let samples = self
                .backend
                .read_audio(path, context, self.config.data.audio_sample_rate)?;
            self.extractor.melspectrogram(&samples)
        })?;
        self.aligner.crop_exact(&spectrogram, start_index)
    }

    fn process(
        &self,
        processor: &mut F::Processor,
        path: &Path,
        continuous_frames: &FrameBatch,
        ref_frames: &FrameBatch,
    ) -> Result<Sample, DatasetError> {
        let to_error = |error: ProcessError| DatasetError::Processing {
            path: path.to_path_buf(),
            reason: error.0,
        };

        let masked = processor
            .prepare_masks_and_masked_images(continuous_frames, false)
            .map_err(to_error)?;

        let reference = match self.settings.mask {
            MaskMode::FixMask => {
                processor
                    .prepare_masks_and_masked_images(ref_frames, false)
                    .map_err(to_error)?
                    .pixel_values
            }
            _ => processor.process_images(ref_frames).map_err(to_error)?,
        };

        Ok(Sample {
            gt: masked.pixel_values,
            masked_gt: masked.masked_pixel_values,
            reference,
            mask: masked.masks,
            mel: None,
            video_path: path.to_path_buf(),
            start_idx: 0,
        })
    }

    fn log_failure(&self, path: &Path, failure: &AttemptFailure) {
        let error = &failure.error;
        match error {
            DatasetError::VideoTooShort { .. } | DatasetError::AudioWindowMismatch { .. } => {
                log::debug!("Skipping {} at {}: {error}", path.display(), failure.stage);
            }
            _ if !error.is_retryable() => log::error!(
                "{} raised at {} for {}, retrying: {error}",
                error.kind(),
                failure.stage,
                path.display()
            ),
            _ => match &self.mel_cache {
                Some(cache) if failure.stage == Stage::Audio => log::warn!(
                    "{} - {error} - {} (cache {})",
                    error.kind(),
                    path.display(),
                    cache.cache_path(path).display()
                ),
                _ => log::warn!("{} - {error} - {}", error.kind(), path.display()),
            },
        }
    }
}
