use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::BuildStatus;
use crate::decode::SourceImage;
use crate::error::{BuildError, TileError};
use crate::format::Orientation;
use crate::pyramid::PyramidLevel;
use crate::store::PyramidStore;

// =============================================================================
// BuildStats
// =============================================================================

/// Progress and timing of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub status: BuildStatus,
    /// Unix time of the first supplied chunk, in milliseconds
    pub started_at_ms: Option<u64>,
    /// Unix time the build reached a terminal status, in milliseconds
    pub finished_at_ms: Option<u64>,
    /// Wall time from start to finish (or to now while running)
    pub elapsed_ms: Option<u64>,
    pub bytes_supplied: u64,
    pub scanlines: u64,
    pub tiles_written: u64,
    /// Flushes forced by memory pressure
    pub flushes: u64,
}

// =============================================================================
// TiledImage
// =============================================================================

struct ImageState {
    status: BuildStatus,
    failure: Option<BuildError>,
    source: Option<SourceImage>,
    orientation: Option<Orientation>,
    levels: Vec<PyramidLevel>,
    pyramid: Option<Arc<PyramidStore>>,
    started: Option<(SystemTime, Instant)>,
    finished_at: Option<SystemTime>,
    elapsed: Option<Duration>,
}

/// Query side of a pyramid build.
///
/// Shared between the builder and any number of viewer threads. Geometry is
/// available once the JPEG header has been parsed; tiles become readable band
/// by band as the build progresses. A failed or cancelled build serves no
/// tiles.
pub struct TiledImage {
    state: RwLock<ImageState>,
    cancelled: AtomicBool,
    bytes_supplied: AtomicU64,
    scanlines: AtomicU64,
    tiles_written: AtomicU64,
    flushes: AtomicU64,
}

impl TiledImage {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(ImageState {
                status: BuildStatus::NotStarted,
                failure: None,
                source: None,
                orientation: None,
                levels: Vec::new(),
                pyramid: None,
                started: None,
                finished_at: None,
                elapsed: None,
            }),
            cancelled: AtomicBool::new(false),
            bytes_supplied: AtomicU64::new(0),
            scanlines: AtomicU64::new(0),
            tiles_written: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ImageState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ImageState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn status(&self) -> BuildStatus {
        self.read_state().status
    }

    /// The error that failed the build, if it failed.
    pub fn failure(&self) -> Option<BuildError> {
        self.read_state().failure.clone()
    }

    /// Display (post-orientation) size, once the header is known.
    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.read_state()
            .levels
            .first()
            .map(|level| (level.width, level.height))
    }

    /// Orientation applied to the stored pixels.
    pub fn orientation(&self) -> Option<Orientation> {
        self.read_state().orientation
    }

    pub fn level_count(&self) -> usize {
        self.read_state().levels.len()
    }

    pub fn level(&self, index: usize) -> Option<PyramidLevel> {
        self.read_state().levels.get(index).copied()
    }

    pub fn levels(&self) -> Vec<PyramidLevel> {
        self.read_state().levels.clone()
    }

    /// Header information reported by the decoder.
    pub fn source(&self) -> Option<SourceImage> {
        self.read_state().source.clone()
    }

    /// Decoder-reported properties (dimensions, JFIF and EXIF tags, comments).
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.read_state()
            .source
            .as_ref()
            .map(|source| source.properties.clone())
            .unwrap_or_default()
    }

    /// Directory holding the level files, while they exist.
    pub fn directory(&self) -> Option<PathBuf> {
        self.read_state()
            .pyramid
            .as_ref()
            .map(|pyramid| pyramid.directory().to_path_buf())
    }

    /// Read one finished tile.
    ///
    /// # Errors
    ///
    /// - [`TileError::Unavailable`] before the header is parsed and after a
    ///   failure or cancellation
    /// - [`TileError::InvalidLevel`] / [`TileError::TileOutOfBounds`] for
    ///   coordinates outside the pyramid
    /// - [`TileError::BandNotReady`] while the tile's row is still being built
    pub fn tile(&self, level: usize, col: u32, row: u32) -> Result<Bytes, TileError> {
        let pyramid = {
            let state = self.read_state();
            match (state.status, state.pyramid.as_ref()) {
                (BuildStatus::Decoding | BuildStatus::Finished, Some(pyramid)) => {
                    Arc::clone(pyramid)
                }
                (status, _) => return Err(TileError::Unavailable { status }),
            }
        };

        let store = pyramid.store(level).ok_or(TileError::InvalidLevel {
            level,
            levels: pyramid.level_count(),
        })?;
        store.check_tile(col, row)?;
        if !pyramid.band_ready(level, row) {
            return Err(TileError::BandNotReady { level, row });
        }
        store.read_tile(col, row)
    }

    /// Whether tile row `row` of `level` can be read.
    pub fn tile_ready(&self, level: usize, row: u32) -> bool {
        self.read_state()
            .pyramid
            .as_ref()
            .is_some_and(|pyramid| pyramid.band_ready(level, row))
    }

    pub fn stats(&self) -> BuildStats {
        let state = self.read_state();
        let elapsed = state
            .elapsed
            .or_else(|| state.started.map(|(_, at)| at.elapsed()));
        BuildStats {
            status: state.status,
            started_at_ms: state.started.map(|(at, _)| unix_ms(at)),
            finished_at_ms: state.finished_at.map(unix_ms),
            elapsed_ms: elapsed.map(|d| d.as_millis() as u64),
            bytes_supplied: self.bytes_supplied.load(Ordering::Relaxed),
            scanlines: self.scanlines.load(Ordering::Relaxed),
            tiles_written: self.tiles_written.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Stop the build and discard its tiles.
    ///
    /// Takes effect immediately for queries; the builder notices at its next
    /// batch of rows and stops decoding. Has no effect on a finished or
    /// failed build.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if self.terminate(BuildStatus::Cancelled, None) {
            debug!("Build cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // =========================================================================
    // Builder side
    // =========================================================================

    pub(crate) fn mark_started(&self) {
        let mut state = self.write_state();
        if state.status == BuildStatus::NotStarted {
            state.status = BuildStatus::Decoding;
            state.started = Some((SystemTime::now(), Instant::now()));
        }
    }

    /// Make the header and the (still empty) pyramid visible to queries.
    pub(crate) fn publish_header(
        &self,
        source: SourceImage,
        orientation: Orientation,
        levels: Vec<PyramidLevel>,
        pyramid: Arc<PyramidStore>,
    ) {
        let mut state = self.write_state();
        if state.status.is_terminal() {
            return;
        }
        state.source = Some(source);
        state.orientation = Some(orientation);
        state.levels = levels;
        state.pyramid = Some(pyramid);
    }

    pub(crate) fn add_supplied(&self, bytes: usize) {
        self.bytes_supplied.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_scanlines(&self, rows: u32) {
        self.scanlines.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_write_stats(&self, tiles_written: u64, flushes: u64) {
        self.tiles_written.store(tiles_written, Ordering::Relaxed);
        self.flushes.store(flushes, Ordering::Relaxed);
    }

    /// Returns false if the build had already ended.
    pub(crate) fn finish(&self) -> bool {
        let mut state = self.write_state();
        if state.status != BuildStatus::Decoding {
            return false;
        }
        state.status = BuildStatus::Finished;
        stamp_finish(&mut state);
        true
    }

    /// Record `error` and discard the tiles. Returns false if the build had
    /// already ended.
    pub(crate) fn fail(&self, error: BuildError) -> bool {
        self.terminate(BuildStatus::Failed, Some(error))
    }

    fn terminate(&self, status: BuildStatus, failure: Option<BuildError>) -> bool {
        let pyramid = {
            let mut state = self.write_state();
            if state.status.is_terminal() {
                return false;
            }
            state.status = status;
            state.failure = failure;
            stamp_finish(&mut state);
            state.pyramid.take()
        };
        if let Some(pyramid) = pyramid {
            pyramid.remove_files();
        }
        true
    }
}

impl std::fmt::Debug for TiledImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("TiledImage")
            .field("status", &state.status)
            .field("levels", &state.levels.len())
            .field("orientation", &state.orientation)
            .finish()
    }
}

fn stamp_finish(state: &mut ImageState) {
    state.finished_at = Some(SystemTime::now());
    state.elapsed = state.started.map(|(_, at)| at.elapsed());
}

fn unix_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
