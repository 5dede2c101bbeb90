use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use super::backend::{open_backend, StoreBackend, TileBackend};
use crate::error::{IoError, TileError};
use crate::pyramid::PyramidLevel;

/// Granularity of level file sizes.
///
/// 64 KiB covers the page size of every supported platform and the Windows
/// mapping granularity.
pub const MAP_ALIGNMENT: u64 = 64 * 1024;

/// Round `bytes` up to a multiple of [`MAP_ALIGNMENT`].
pub fn align_to_map(bytes: u64) -> u64 {
    bytes.div_ceil(MAP_ALIGNMENT) * MAP_ALIGNMENT
}

/// One pyramid level's tiles in a single backing file.
///
/// ```text
/// ┌────────┬────────┬─────┬──────────────────┬─────────────────┐
/// │ (0, 0) │ (1, 0) │ ... │ (cols-1, rows-1) │ reserved region │
/// └────────┴────────┴─────┴──────────────────┴─────────────────┘
///   tile_bytes each, row-major                 unused, rounds the file
///                                              to MAP_ALIGNMENT
/// ```
pub struct TileStore {
    level: PyramidLevel,
    backend: Box<dyn TileBackend>,
}

impl TileStore {
    /// Create (or truncate) the level file at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Backing file location
    /// * `level` - Geometry of the level stored in this file
    /// * `backend` - Mapped or positioned access
    ///
    /// # Errors
    ///
    /// Returns an [`IoError`] if the file cannot be created, extended or mapped.
    pub fn create(path: &Path, level: PyramidLevel, backend: StoreBackend) -> Result<Self, IoError> {
        let size = align_to_map(level.grid_bytes());
        let backend = open_backend(backend, path, size)?;
        debug!(
            level = level.index,
            cols = level.cols,
            rows = level.rows,
            size,
            path = %path.display(),
            "Created tile store"
        );
        Ok(Self { level, backend })
    }

    pub fn level(&self) -> &PyramidLevel {
        &self.level
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.backend.size()
    }

    /// Bytes past the tile grid that only round the file size.
    pub fn reserved(&self) -> u64 {
        self.file_size() - self.level.grid_bytes()
    }

    pub fn tile_bytes(&self) -> usize {
        self.level.tile_bytes()
    }

    /// File offset of tile (`col`, `row`); coordinates are not checked.
    #[inline]
    pub fn tile_offset(&self, col: u32, row: u32) -> u64 {
        let index = row as u64 * self.level.cols as u64 + col as u64;
        index * self.level.tile_bytes() as u64
    }

    /// Check tile coordinates against the grid.
    pub fn check_tile(&self, col: u32, row: u32) -> Result<(), TileError> {
        if col >= self.level.cols || row >= self.level.rows {
            return Err(TileError::TileOutOfBounds {
                level: self.level.index,
                col,
                row,
                cols: self.level.cols,
                rows: self.level.rows,
            });
        }
        Ok(())
    }

    /// Read one tile for display.
    pub fn read_tile(&self, col: u32, row: u32) -> Result<Bytes, TileError> {
        self.check_tile(col, row)?;
        let mut buf = vec![0u8; self.tile_bytes()];
        self.backend.read_at(self.tile_offset(col, row), &mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Read one tile into `buf` (exactly `tile_bytes` long).
    pub fn read_tile_into(&self, col: u32, row: u32, buf: &mut [u8]) -> Result<(), IoError> {
        self.region_check(col, row, buf.len())?;
        self.backend.read_at(self.tile_offset(col, row), buf)
    }

    /// Write one whole tile. Returns the bytes written.
    pub fn write_tile(&self, col: u32, row: u32, data: &[u8]) -> Result<u64, IoError> {
        self.region_check(col, row, data.len())?;
        self.backend.write_at(self.tile_offset(col, row), data)?;
        Ok(data.len() as u64)
    }

    pub fn flush(&self) -> Result<(), IoError> {
        self.backend.flush()
    }

    fn region_check(&self, col: u32, row: u32, len: usize) -> Result<(), IoError> {
        if col >= self.level.cols || row >= self.level.rows || len != self.tile_bytes() {
            return Err(IoError::RangeOutOfBounds {
                offset: self.tile_offset(col, row),
                len: len as u64,
                size: self.file_size(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
