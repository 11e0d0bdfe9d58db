//! Worker-local resources.
//!
//! Each worker owns exactly one image processor and one random number
//! generator. Worker 0 is registered when the dataset is built, which covers
//! single-threaded use; every other worker registers its own slot from its
//! init hook ([`UnetDataset::init_worker`](crate::UnetDataset::init_worker)).
//! Lookups are keyed by the worker id of the calling thread, so a slot is
//! only ever used by the worker it belongs to.

use std::{
    cell::Cell,
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use rand::{SeedableRng, rngs::StdRng};

use crate::error::DatasetError;

/// Identifier of a concurrent worker. `0` is the default, single-threaded
/// worker.
pub type WorkerId = usize;

thread_local! {
    static CURRENT_WORKER: Cell<WorkerId> = const { Cell::new(0) };
}

/// Worker id bound to the calling thread (0 unless set).
pub fn current_worker_id() -> WorkerId {
    CURRENT_WORKER.with(Cell::get)
}

/// Bind the calling thread to `worker_id`.
pub fn set_current_worker_id(worker_id: WorkerId) {
    CURRENT_WORKER.with(|current| current.set(worker_id));
}

/// Resources owned by a single worker.
#[derive(Debug)]
pub struct WorkerSlot<P> {
    /// The worker's image processor.
    pub processor: P,
    /// The worker's random number generator.
    pub rng: StdRng,
}

/// Map from worker id to that worker's [`WorkerSlot`].
pub struct WorkerRegistry<P> {
    slots: RwLock<HashMap<WorkerId, Arc<Mutex<WorkerSlot<P>>>>>,
    seed: Option<u64>,
}

impl<P> WorkerRegistry<P> {
    /// Empty registry. With a `seed`, worker `w` draws from a generator
    /// seeded with `seed + w`; otherwise generators are seeded from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            seed,
        }
    }

    /// Install `processor` for `worker_id`, replacing any previous slot.
    pub fn register(&self, worker_id: WorkerId, processor: P) {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker_id as u64)),
            None => StdRng::from_entropy(),
        };
        let slot = Arc::new(Mutex::new(WorkerSlot { processor, rng }));

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.insert(worker_id, slot).is_some() {
            log::debug!("Replaced resources of worker {worker_id}");
        } else {
            log::debug!("Registered resources for worker {worker_id}");
        }
    }

    /// Returns `true` if `worker_id` has a slot.
    pub fn contains(&self, worker_id: WorkerId) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&worker_id)
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `operation` with exclusive access to the slot of `worker_id`.
    ///
    /// # Errors
    ///
    /// [`DatasetError::WorkerNotInitialized`] if the worker has no slot.
    pub fn with_slot<R>(
        &self,
        worker_id: WorkerId,
        operation: impl FnOnce(&mut WorkerSlot<P>) -> R,
    ) -> Result<R, DatasetError> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&worker_id)
            .cloned()
            .ok_or(DatasetError::WorkerNotInitialized(worker_id))?;

        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(operation(&mut *slot))
    }
}
