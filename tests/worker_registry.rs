//! WorkerRegistry and worker id tests.

use lipsync_dataset::{DatasetError, WorkerRegistry, current_worker_id, set_current_worker_id};
use rand::Rng;

#[test]
fn register_and_lookup() {
    let registry = WorkerRegistry::new(Some(1));
    assert!(registry.is_empty());

    registry.register(0, "processor-0".to_string());
    registry.register(2, "processor-2".to_string());

    assert_eq!(registry.len(), 2);
    assert!(registry.contains(2));
    assert!(!registry.contains(1));

    let name = registry
        .with_slot(2, |slot| slot.processor.clone())
        .expect("Worker 2 is registered");
    assert_eq!(name, "processor-2");
}

#[test]
fn missing_worker_is_reported() {
    let registry: WorkerRegistry<()> = WorkerRegistry::new(None);
    let error = registry.with_slot(4, |_| ()).expect_err("Worker 4 is missing");
    assert!(matches!(error, DatasetError::WorkerNotInitialized(4)));
}

#[test]
fn slots_are_mutable() {
    let registry = WorkerRegistry::new(None);
    registry.register(0, 0usize);

    for _ in 0..5 {
        registry
            .with_slot(0, |slot| slot.processor += 1)
            .expect("Worker 0 is registered");
    }
    let count = registry.with_slot(0, |slot| slot.processor).unwrap();
    assert_eq!(count, 5);
}

#[test]
fn reregistering_replaces_slot() {
    let registry = WorkerRegistry::new(None);
    registry.register(1, "old");
    registry.register(1, "new");

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.with_slot(1, |slot| slot.processor).unwrap(), "new");
}

// ── Seeding ──────────────────────────────────────────────────────

fn draws(registry: &WorkerRegistry<()>, worker_id: usize) -> Vec<u64> {
    registry
        .with_slot(worker_id, |slot| (0..8).map(|_| slot.rng.r#gen::<u64>()).collect())
        .expect("Worker is registered")
}

#[test]
fn seeded_generators_are_reproducible_per_worker() {
    let first = WorkerRegistry::new(Some(42));
    let second = WorkerRegistry::new(Some(42));
    for registry in [&first, &second] {
        registry.register(0, ());
        registry.register(1, ());
    }

    assert_eq!(draws(&first, 0), draws(&second, 0));
    assert_eq!(draws(&first, 1), draws(&second, 1));
}

#[test]
fn workers_get_distinct_streams() {
    let registry = WorkerRegistry::new(Some(42));
    registry.register(0, ());
    registry.register(1, ());

    assert_ne!(draws(&registry, 0), draws(&registry, 1));
}

// ── Thread binding ───────────────────────────────────────────────

#[test]
fn worker_id_is_thread_local() {
    std::thread::spawn(|| {
        assert_eq!(current_worker_id(), 0);
        set_current_worker_id(6);
        assert_eq!(current_worker_id(), 6);
    })
    .join()
    .expect("Thread panicked");

    std::thread::spawn(|| assert_eq!(current_worker_id(), 0))
        .join()
        .expect("Thread panicked");
}
