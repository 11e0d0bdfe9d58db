//! Parallel sample fetching.
//!
//! [`WorkerPool`] runs a dataset on a dedicated [`rayon`] thread pool. Each
//! pool thread is a worker: its start handler calls
//! [`UnetDataset::init_worker`] so the thread owns a private image processor
//! and random number generator before it serves any request. Pool thread `i`
//! becomes worker `i + 1`; worker 0 stays with the thread that built the
//! dataset.

use std::sync::Arc;

use ::rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{IntoParallelIterator, ParallelIterator},
};

use crate::{
    dataset::{Sample, UnetDataset},
    error::DatasetError,
    media::MediaBackend,
    processor::ProcessorFactory,
    spectrogram::SpectrogramExtractor,
};

/// A dataset plus the threads that sample from it.
pub struct WorkerPool<B, X, F>
where
    B: MediaBackend,
    X: SpectrogramExtractor,
    F: ProcessorFactory,
{
    dataset: Arc<UnetDataset<B, X, F>>,
    pool: Option<ThreadPool>,
    num_workers: usize,
}

impl<B, X, F> WorkerPool<B, X, F>
where
    B: MediaBackend + 'static,
    X: SpectrogramExtractor + 'static,
    F: ProcessorFactory + 'static,
{
    /// Start `num_workers` worker threads. With zero workers every sample is
    /// produced on the calling thread.
    pub fn new(dataset: Arc<UnetDataset<B, X, F>>, num_workers: usize) -> Result<Self, DatasetError> {
        if num_workers == 0 {
            return Ok(Self {
                dataset,
                pool: None,
                num_workers,
            });
        }

        let handler_dataset = Arc::clone(&dataset);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|index| format!("lipsync-worker-{}", index + 1))
            .start_handler(move |index| {
                if let Err(error) = handler_dataset.init_worker(index + 1) {
                    log::error!("Failed to initialise worker {}: {error}", index + 1);
                }
            })
            .build()
            .map_err(|error| {
                DatasetError::Configuration(format!("failed to start worker pool: {error}"))
            })?;

        log::debug!("Started {num_workers} dataset workers");
        Ok(Self {
            dataset,
            pool: Some(pool),
            num_workers,
        })
    }

    /// Number of worker threads (0 for inline sampling).
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// The shared dataset.
    pub fn dataset(&self) -> &Arc<UnetDataset<B, X, F>> {
        &self.dataset
    }

    /// Fetch `batch_size` samples, spread across the workers.
    ///
    /// Fails only if a sample request fails (uninitialised worker or an
    /// exhausted attempt cap).
    pub fn fetch_batch(&self, batch_size: usize) -> Result<Vec<Sample>, DatasetError> {
        let dataset = &self.dataset;
        match &self.pool {
            Some(pool) => pool.install(|| {
                (0..batch_size)
                    .into_par_iter()
                    .map(|index| dataset.get_item(index))
                    .collect()
            }),
            None => (0..batch_size).map(|index| dataset.get_item(index)).collect(),
        }
    }
}
