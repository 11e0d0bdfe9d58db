//! Dataset index construction.
//!
//! [`DatasetIndex`] is the ordered, read-only list of video paths a dataset
//! samples from. It is resolved once, either from a file list (one path per
//! line) or by scanning a directory for `.mp4` files. Nothing is checked
//! beyond that: missing or broken videos are discovered when sampled.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::error::DatasetError;

/// File extension kept by directory scans.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Ordered list of video paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetIndex {
    paths: Vec<PathBuf>,
}

impl DatasetIndex {
    /// Resolve the index from a file list or a directory.
    ///
    /// A non-empty `fileslist` wins. Otherwise `data_dir` is scanned.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Configuration`] if both sources are empty or the
    ///   resolved index holds no paths.
    /// - [`DatasetError::ManifestRead`] / [`DatasetError::DirectoryScan`] if
    ///   the source cannot be read.
    pub fn resolve(fileslist: &Path, data_dir: &Path) -> Result<Self, DatasetError> {
        let index = if !fileslist.as_os_str().is_empty() {
            Self::from_fileslist(fileslist)?
        } else if !data_dir.as_os_str().is_empty() {
            Self::from_directory(data_dir)?
        } else {
            return Err(DatasetError::Configuration(
                "train_data_dir and train_fileslist cannot both be empty".to_string(),
            ));
        };

        if index.is_empty() {
            return Err(DatasetError::Configuration(format!(
                "no videos found (file list {:?}, data dir {:?})",
                fileslist, data_dir
            )));
        }
        Ok(index)
    }

    /// Read one path per line, trailing whitespace stripped, order kept.
    ///
    /// Blank lines are kept as empty paths; they fail at sample time like
    /// any other unopenable entry.
    pub fn from_fileslist(path: &Path) -> Result<Self, DatasetError> {
        let to_error = |source| DatasetError::ManifestRead {
            path: path.to_path_buf(),
            source,
        };

        let reader = BufReader::new(File::open(path).map_err(to_error)?);
        let mut paths = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(to_error)?;
            paths.push(PathBuf::from(line.trim_end()));
        }

        log::debug!("Read {} video paths from {}", paths.len(), path.display());
        Ok(Self { paths })
    }

    /// List `directory` and keep the `.mp4` entries, in listing order.
    pub fn from_directory(directory: &Path) -> Result<Self, DatasetError> {
        let to_error = |source| DatasetError::DirectoryScan {
            path: directory.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(directory).map_err(to_error)? {
            let entry = entry.map_err(to_error)?;
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|extension| extension == VIDEO_EXTENSION)
            {
                paths.push(path);
            }
        }

        log::debug!(
            "Found {} videos in {}",
            paths.len(),
            directory.display()
        );
        Ok(Self { paths })
    }

    /// Build an index from paths already in memory.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of videos.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if the index holds no videos.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Path at `position`.
    pub fn get(&self, position: usize) -> Option<&Path> {
        self.paths.get(position).map(PathBuf::as_path)
    }

    /// All paths, in index order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}
