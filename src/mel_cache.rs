//! On-disk spectrogram cache.
//!
//! Computing a spectrogram means decoding a video's whole audio track, so
//! each result is persisted once per source file and reused by every worker.
//! The directory is shared without locks: concurrent writers of the same key
//! compute identical values and the last rename wins. A file that fails to
//! load is deleted and recomputed on the spot.
//!
//! Cache file format (`<stem>_mel.bin`, little-endian):
//!
//! ```text
//!   magic:   [u8; 4] = b"MELC"
//!   version: u32     = 1
//!   rows:    u32
//!   cols:    u32
//!   data:    [f32; rows * cols]   (row-major)
//! ```

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{error::DatasetError, spectrogram::Spectrogram};

const MAGIC: &[u8; 4] = b"MELC";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// Appended to a video's file stem to name its cache file.
pub const MEL_CACHE_SUFFIX: &str = "_mel.bin";

/// Per-video spectrogram cache rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrogramCache {
    directory: PathBuf,
}

impl SpectrogramCache {
    /// Open the cache at `directory`, creating it if absent.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Self, DatasetError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Cache directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Cache file for `video_path`: its file stem plus [`MEL_CACHE_SUFFIX`],
    /// inside the cache directory.
    pub fn cache_path(&self, video_path: &Path) -> PathBuf {
        let stem = video_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.directory.join(format!("{stem}{MEL_CACHE_SUFFIX}"))
    }

    /// Return the cached spectrogram for `video_path`, or compute, persist,
    /// and return it.
    ///
    /// An unreadable cache file is logged, deleted, and recomputed. Errors
    /// from `compute` and from writing the new entry are returned as-is.
    pub fn get_or_compute<F>(&self, video_path: &Path, compute: F) -> Result<Spectrogram, DatasetError>
    where
        F: FnOnce() -> Result<Spectrogram, DatasetError>,
    {
        let cache_path = self.cache_path(video_path);

        if cache_path.is_file() {
            match self.load(&cache_path) {
                Ok(spectrogram) => {
                    log::debug!("Spectrogram cache hit: {}", cache_path.display());
                    return Ok(spectrogram);
                }
                Err(error) => {
                    log::warn!("{} - {error} - {}", error.kind(), cache_path.display());
                    remove_stale(&cache_path)?;
                }
            }
        }

        let spectrogram = compute()?;
        self.store(&cache_path, &spectrogram)?;
        Ok(spectrogram)
    }

    /// Load a cache file.
    ///
    /// # Errors
    ///
    /// [`DatasetError::CacheCorruption`] if the file cannot be read or does
    /// not hold a well-formed spectrogram.
    pub fn load(&self, cache_path: &Path) -> Result<Spectrogram, DatasetError> {
        let corruption = |reason: String| DatasetError::CacheCorruption {
            path: cache_path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(cache_path).map_err(|error| corruption(error.to_string()))?;
        decode(&bytes).map_err(corruption)
    }

    /// Write `spectrogram` to `cache_path` through a temporary file in the
    /// cache directory, renamed into place once complete.
    pub fn store(&self, cache_path: &Path, spectrogram: &Spectrogram) -> Result<(), DatasetError> {
        let mut file = NamedTempFile::new_in(&self.directory)?;
        file.write_all(&encode(spectrogram))?;
        file.as_file().sync_all()?;
        file.persist(cache_path).map_err(|error| error.error)?;

        log::debug!(
            "Cached {}x{} spectrogram at {}",
            spectrogram.rows(),
            spectrogram.cols(),
            cache_path.display()
        );
        Ok(())
    }
}

fn remove_stale(cache_path: &Path) -> Result<(), DatasetError> {
    match fs::remove_file(cache_path) {
        Ok(()) => Ok(()),
        // Another worker already removed it.
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Serialize a spectrogram in the cache file format.
pub fn encode(spectrogram: &Spectrogram) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + spectrogram.data().len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(spectrogram.rows() as u32).to_le_bytes());
    bytes.extend_from_slice(&(spectrogram.cols() as u32).to_le_bytes());
    for value in spectrogram.data() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Parse the cache file format. The error string says what was wrong.
pub fn decode(bytes: &[u8]) -> Result<Spectrogram, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err("bad magic".to_string());
    }

    let read_u32 = |offset: usize| {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    };

    let version = read_u32(4);
    if version != VERSION {
        return Err(format!("unsupported version {version}"));
    }
    let rows = read_u32(8) as usize;
    let cols = read_u32(12) as usize;

    let expected = rows
        .checked_mul(cols)
        .and_then(|count| count.checked_mul(4))
        .ok_or_else(|| format!("dimensions {rows}x{cols} overflow"))?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != expected {
        return Err(format!(
            "expected {expected} data bytes for {rows}x{cols}, found {}",
            payload.len()
        ));
    }

    let data = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Spectrogram::new(rows, cols, data).map_err(|error| error.to_string())
}
