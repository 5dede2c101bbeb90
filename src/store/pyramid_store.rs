//! All level files of one pyramid, plus band completion tracking.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, warn};

use super::backend::StoreBackend;
use super::tile_store::TileStore;
use crate::error::IoError;
use crate::pyramid::PyramidLevel;

static NEXT_PYRAMID_ID: AtomicU64 = AtomicU64::new(0);

/// The tile stores of every level, owned by one builder.
///
/// Files live in a private subdirectory of the scratch directory so that
/// concurrent builders never share a file. The subdirectory is removed by
/// [`remove_files`](Self::remove_files) and on drop unless `keep_files` was
/// requested.
pub struct PyramidStore {
    directory: PathBuf,
    stores: Vec<TileStore>,
    /// Completion flag per level per band (tile row)
    bands: Vec<Vec<AtomicBool>>,
    keep_files: bool,
    removed: AtomicBool,
}

impl PyramidStore {
    /// Create one level file per entry of `levels`.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError`] if the directory or any level file cannot be
    /// created. Files created before the failure are removed.
    pub fn create(
        scratch: &Path,
        levels: &[PyramidLevel],
        backend: StoreBackend,
        keep_files: bool,
    ) -> Result<Self, IoError> {
        let id = NEXT_PYRAMID_ID.fetch_add(1, Ordering::Relaxed);
        let directory = scratch.join(format!("pyramid-{}-{}", std::process::id(), id));
        std::fs::create_dir_all(&directory).map_err(|e| IoError::Create {
            path: directory.clone(),
            message: e.to_string(),
        })?;

        let mut pyramid = Self {
            directory,
            stores: Vec::with_capacity(levels.len()),
            bands: levels
                .iter()
                .map(|level| (0..level.rows).map(|_| AtomicBool::new(false)).collect())
                .collect(),
            keep_files: false,
            removed: AtomicBool::new(false),
        };

        for level in levels {
            let path = pyramid.directory.join(format!("level_{}.tiles", level.index));
            // On error `pyramid` drops and removes the partial directory
            let store = TileStore::create(&path, *level, backend)?;
            pyramid.stores.push(store);
        }

        pyramid.keep_files = keep_files;
        debug!(
            levels = levels.len(),
            directory = %pyramid.directory.display(),
            backend = %backend,
            "Created pyramid store"
        );
        Ok(pyramid)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn level_count(&self) -> usize {
        self.stores.len()
    }

    pub fn store(&self, level: usize) -> Option<&TileStore> {
        self.stores.get(level)
    }

    pub fn stores(&self) -> &[TileStore] {
        &self.stores
    }

    /// Whether band `band` of `level` has been completely written.
    #[inline]
    pub fn band_ready(&self, level: usize, band: u32) -> bool {
        self.bands
            .get(level)
            .and_then(|bands| bands.get(band as usize))
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Publish band `band` of `level`. All tile writes for the band must be
    /// complete.
    #[inline]
    pub fn mark_band(&self, level: usize, band: u32) {
        if let Some(flag) = self.bands.get(level).and_then(|b| b.get(band as usize)) {
            flag.store(true, Ordering::Release);
        }
    }

    /// Number of completed bands across all levels.
    pub fn bands_ready(&self) -> usize {
        self.bands
            .iter()
            .flatten()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// Flush every level file.
    pub fn flush_all(&self) -> Result<(), IoError> {
        for store in &self.stores {
            store.flush()?;
        }
        Ok(())
    }

    /// Total size of all level files.
    pub fn bytes_on_disk(&self) -> u64 {
        self.stores.iter().map(|s| s.file_size()).sum()
    }

    pub fn files_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Delete the level files. Safe to call more than once.
    pub fn remove_files(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        match std::fs::remove_dir_all(&self.directory) {
            Ok(()) => debug!(directory = %self.directory.display(), "Removed pyramid files"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                directory = %self.directory.display(),
                error = %e,
                "Failed to remove pyramid files"
            ),
        }
    }
}

impl Drop for PyramidStore {
    fn drop(&mut self) {
        if !self.keep_files {
            // Close files and unmap before unlinking
            self.stores.clear();
            self.remove_files();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
