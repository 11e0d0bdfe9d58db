//! SpectrogramCache tests.

use std::{cell::Cell, path::Path};

use lipsync_dataset::{DatasetError, MEL_CACHE_SUFFIX, Spectrogram, SpectrogramCache, mel_cache};

fn ramp(rows: usize, cols: usize) -> Spectrogram {
    let data = (0..rows * cols).map(|value| value as f32 * 0.5).collect();
    Spectrogram::new(rows, cols, data).expect("Shape matches data")
}

// ── Paths ────────────────────────────────────────────────────────

#[test]
fn cache_path_uses_video_stem() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = SpectrogramCache::new(temporary_directory.path()).expect("Failed to open cache");

    let path = cache.cache_path(Path::new("/data/clips/speaker_01.mp4"));
    assert_eq!(path, temporary_directory.path().join("speaker_01_mel.bin"));
    assert!(
        path.to_string_lossy().ends_with(MEL_CACHE_SUFFIX),
        "{}",
        path.display()
    );
}

#[test]
fn new_creates_missing_directory() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let directory = temporary_directory.path().join("nested").join("mel");

    let cache = SpectrogramCache::new(&directory).expect("Failed to open cache");
    assert!(directory.is_dir());
    assert_eq!(cache.directory(), directory.as_path());
}

// ── get_or_compute ───────────────────────────────────────────────

#[test]
fn second_lookup_is_served_from_disk() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = SpectrogramCache::new(temporary_directory.path()).expect("Failed to open cache");
    let video = Path::new("clip.mp4");
    let computations = Cell::new(0);

    let compute = || {
        computations.set(computations.get() + 1);
        Ok(ramp(4, 30))
    };
    let cold = cache.get_or_compute(video, compute).expect("Cold lookup failed");
    let warm = cache
        .get_or_compute(video, || {
            computations.set(computations.get() + 1);
            Ok(ramp(1, 1))
        })
        .expect("Warm lookup failed");

    assert_eq!(computations.get(), 1);
    assert_eq!(cold, warm);
    assert!(cache.cache_path(video).is_file());
}

#[test]
fn corrupt_entry_is_replaced() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = SpectrogramCache::new(temporary_directory.path()).expect("Failed to open cache");
    let video = Path::new("clip.mp4");
    let cache_path = cache.cache_path(video);

    let mut truncated = mel_cache::encode(&ramp(4, 30));
    truncated.truncate(truncated.len() - 3);
    std::fs::write(&cache_path, truncated).expect("Failed to write cache file");

    let recovered = cache
        .get_or_compute(video, || Ok(ramp(4, 30)))
        .expect("Recovery failed");
    assert_eq!(recovered, ramp(4, 30));
    assert_eq!(cache.load(&cache_path).expect("Entry was rewritten"), ramp(4, 30));
}

#[test]
fn compute_errors_leave_no_entry() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = SpectrogramCache::new(temporary_directory.path()).expect("Failed to open cache");
    let video = Path::new("clip.mp4");

    let result = cache.get_or_compute(video, || {
        Err(DatasetError::Spectrogram("extractor crashed".to_string()))
    });
    assert!(matches!(result, Err(DatasetError::Spectrogram(_))));
    assert!(!cache.cache_path(video).exists());
}

#[test]
fn store_leaves_no_temporary_files() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = SpectrogramCache::new(temporary_directory.path()).expect("Failed to open cache");

    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        cache
            .get_or_compute(Path::new(name), || Ok(ramp(2, 8)))
            .expect("Lookup failed");
    }

    let entries = std::fs::read_dir(temporary_directory.path())
        .expect("Failed to list cache")
        .count();
    assert_eq!(entries, 3);
}

#[test]
fn load_reports_corruption() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = SpectrogramCache::new(temporary_directory.path()).expect("Failed to open cache");
    let cache_path = temporary_directory.path().join("junk_mel.bin");
    std::fs::write(&cache_path, b"garbage").expect("Failed to write cache file");

    let error = cache.load(&cache_path).expect_err("Garbage must not load");
    assert!(matches!(error, DatasetError::CacheCorruption { .. }));
    assert!(error.is_retryable());
}

// ── File format ──────────────────────────────────────────────────

#[test]
fn encoded_header_layout() {
    let bytes = mel_cache::encode(&ramp(2, 3));
    assert_eq!(&bytes[0..4], b"MELC");
    assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1);
    assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 2);
    assert_eq!(u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 3);
    assert_eq!(bytes.len(), 16 + 6 * 4);
}

#[test]
fn decode_rejects_malformed_input() {
    let valid = mel_cache::encode(&ramp(2, 3));

    let mut bad_magic = valid.clone();
    bad_magic[0] = b'X';
    assert!(mel_cache::decode(&bad_magic).unwrap_err().contains("magic"));

    let mut bad_version = valid.clone();
    bad_version[4] = 9;
    assert!(mel_cache::decode(&bad_version).unwrap_err().contains("version"));

    let mut extra = valid.clone();
    extra.push(0);
    assert!(mel_cache::decode(&extra).is_err());

    assert!(mel_cache::decode(&valid[..10]).is_err());
    assert_eq!(mel_cache::decode(&valid).unwrap(), ramp(2, 3));
}
