//! Scanlines to tiles.
//!
//! The compositor receives decoded RGBA rows in stored order and turns them
//! into display-oriented tiles on every pyramid level:
//!
//! ```text
//!  decoded rows ──► in-memory strip (one band of stored rows)
//!                        │ band full (or end of stream)
//!                        ▼
//!                  scatter through the orientation into level 0 tiles
//!                        │ display bands complete
//!                        ▼
//!                  2x2 mosaic downsample into level 1, 2, ...
//! ```
//!
//! A child band is produced once both of its parent bands are complete, so
//! levels fill in as soon as the image data under them exists. Bands are
//! published through [`PyramidStore::mark_band`] only after all their tile
//! writes have returned.

use std::sync::Arc;

use tracing::{debug, trace};

use super::downsample::{downsample_mosaic, Mosaic};
use super::planner::{PyramidLevel, BYTES_PER_PIXEL};
use crate::error::IoError;
use crate::format::{Orientation, RowFlow};
use crate::store::{BackpressureController, PyramidStore, TileStore};

const BPP: usize = BYTES_PER_PIXEL as usize;

/// Write totals of one compositor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    /// Stored rows received
    pub rows_received: u32,
    /// Bytes written to tiles
    pub bytes_written: u64,
    /// Tiles written on all levels
    pub tiles_written: u64,
    /// Pressure-triggered flushes
    pub flushes: u64,
}

/// Builds the tile pyramid from decoded scanlines.
pub struct Compositor {
    pyramid: Arc<PyramidStore>,
    levels: Vec<PyramidLevel>,
    /// Stored (pre-orientation) dimensions
    source_width: u32,
    source_height: u32,
    orientation: Orientation,
    backpressure: BackpressureController,

    /// First stored row of the band being collected
    band_start: u32,
    /// Rows of that band in `strip` so far
    band_rows: u32,
    /// Stored rows scattered into level 0
    rows_scattered: u32,

    strip: Vec<u8>,
    tile: Vec<u8>,
    parents: [Vec<u8>; 4],

    bytes_written: u64,
    tiles_written: u64,
}

impl Compositor {
    /// Create a compositor over `pyramid`.
    ///
    /// # Arguments
    ///
    /// * `pyramid` - Level stores; level 0 must be the display-oriented size of
    ///   the source
    /// * `source_width`, `source_height` - Stored image dimensions
    /// * `orientation` - Transform from stored to display coordinates
    /// * `backpressure` - Accounting for every write
    pub fn new(
        pyramid: Arc<PyramidStore>,
        source_width: u32,
        source_height: u32,
        orientation: Orientation,
        backpressure: BackpressureController,
    ) -> Self {
        let levels: Vec<PyramidLevel> = pyramid.stores().iter().map(|s| *s.level()).collect();
        debug_assert!(!levels.is_empty());
        debug_assert_eq!(
            (levels[0].width, levels[0].height),
            orientation.display_size(source_width, source_height)
        );

        let td = levels[0].tile_dimension as usize;
        let tile_bytes = levels[0].tile_bytes();
        Self {
            pyramid,
            levels,
            source_width,
            source_height,
            orientation,
            backpressure,
            band_start: 0,
            band_rows: 0,
            rows_scattered: 0,
            strip: vec![0u8; td * source_width as usize * BPP],
            tile: vec![0u8; tile_bytes],
            parents: std::array::from_fn(|_| vec![0u8; tile_bytes]),
            bytes_written: 0,
            tiles_written: 0,
        }
    }

    pub fn pyramid(&self) -> &Arc<PyramidStore> {
        &self.pyramid
    }

    pub fn stats(&self) -> CompositorStats {
        CompositorStats {
            rows_received: self.band_start + self.band_rows,
            bytes_written: self.bytes_written,
            tiles_written: self.tiles_written,
            flushes: self.backpressure.flushes(),
        }
    }

    /// Whether every stored row has been received.
    pub fn is_complete(&self) -> bool {
        self.band_start + self.band_rows >= self.source_height
    }

    fn tile_dimension(&self) -> u32 {
        self.levels[0].tile_dimension
    }

    fn stride(&self) -> usize {
        self.source_width as usize * BPP
    }

    /// Append `count` decoded rows starting at stored row `first_row`.
    ///
    /// Rows must arrive in order and `rgba` must hold exactly `count` rows of
    /// `source_width` RGBA pixels. Rows past the image height are ignored.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError`] if a tile write or a pressure flush fails.
    pub fn push_rows(&mut self, first_row: u32, count: u32, rgba: &[u8]) -> Result<(), IoError> {
        let stride = self.stride();
        debug_assert_eq!(first_row, self.band_start + self.band_rows);
        debug_assert_eq!(rgba.len(), count as usize * stride);

        let td = self.tile_dimension();
        let count = count.min(self.source_height.saturating_sub(first_row));
        let mut done = 0u32;

        while done < count {
            let take = (td - self.band_rows).min(count - done);
            let src = &rgba[done as usize * stride..(done + take) as usize * stride];
            let offset = self.band_rows as usize * stride;
            self.strip[offset..offset + src.len()].copy_from_slice(src);

            self.band_rows += take;
            done += take;

            if self.band_rows == td {
                self.scatter_band()?;
            }
        }
        Ok(())
    }

    /// Scatter the last partial band, complete every level and flush.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError`] if a write or the final flush fails.
    pub fn finish(&mut self) -> Result<(), IoError> {
        if self.band_rows > 0 {
            self.scatter_band()?;
        }
        self.complete_level0(true)?;
        self.pyramid.flush_all()?;
        self.backpressure.release();
        debug!(
            levels = self.levels.len(),
            bytes = self.bytes_written,
            tiles = self.tiles_written,
            flushes = self.backpressure.flushes(),
            "Pyramid complete"
        );
        Ok(())
    }

    fn level0_store(&self) -> Result<&TileStore, IoError> {
        level_store(&self.pyramid, 0)
    }

    fn account(&mut self, bytes: u64) -> Result<(), IoError> {
        self.bytes_written += bytes;
        let pyramid = &self.pyramid;
        self.backpressure.record_write(bytes, || pyramid.flush_all())?;
        Ok(())
    }

    // =========================================================================
    // Level 0
    // =========================================================================

    fn scatter_band(&mut self) -> Result<(), IoError> {
        let rows = self.band_rows;
        let len = rows as usize * self.stride();

        let strip = std::mem::take(&mut self.strip);
        let mut tile = std::mem::take(&mut self.tile);
        let result = self.scatter_strip(&strip[..len], &mut tile);
        self.strip = strip;
        self.tile = tile;
        result?;

        trace!(
            first_row = self.band_start,
            rows,
            "Scattered band into level 0"
        );
        self.rows_scattered += rows;
        self.band_start += rows;
        self.band_rows = 0;

        self.complete_level0(false)
    }

    /// Copy the band's rows into every level 0 tile they cover.
    fn scatter_strip(&mut self, strip: &[u8], tile: &mut [u8]) -> Result<(), IoError> {
        let (w, h) = (self.source_width, self.source_height);
        let y0 = self.band_start;
        let y1 = y0 + self.band_rows;
        let stride = self.stride();
        let orientation = self.orientation;
        let td = self.tile_dimension();
        let tdu = td as usize;

        // Axis-aligned transforms map the band onto a display rectangle
        let corners = [(0, y0), (w - 1, y0), (0, y1 - 1), (w - 1, y1 - 1)]
            .map(|(x, y)| orientation.to_display(x, y, w, h));
        let min_x = corners.iter().map(|c| c.0).min().unwrap_or(0);
        let max_x = corners.iter().map(|c| c.0).max().unwrap_or(0);
        let min_y = corners.iter().map(|c| c.1).min().unwrap_or(0);
        let max_y = corners.iter().map(|c| c.1).max().unwrap_or(0);

        for tile_row in min_y / td..=max_y / td {
            for tile_col in min_x / td..=max_x / td {
                let (tx, ty) = (tile_col * td, tile_row * td);
                let dx0 = min_x.max(tx);
                let dx1 = max_x.min(tx + td - 1);
                let dy0 = min_y.max(ty);
                let dy1 = max_y.min(ty + td - 1);

                let store = self.level0_store()?;
                if orientation.row_flow() == RowFlow::TopDown {
                    // Band and tile row coincide; the band covers the tile
                    tile.fill(0);
                } else {
                    store.read_tile_into(tile_col, tile_row, tile)?;
                }

                if orientation == Orientation::Identity {
                    let n = (dx1 - dx0 + 1) as usize * BPP;
                    for dy in dy0..=dy1 {
                        let src = (dy - y0) as usize * stride + dx0 as usize * BPP;
                        let dst = ((dy - ty) as usize * tdu + (dx0 - tx) as usize) * BPP;
                        tile[dst..dst + n].copy_from_slice(&strip[src..src + n]);
                    }
                } else {
                    for dy in dy0..=dy1 {
                        let row = (dy - ty) as usize * tdu;
                        for dx in dx0..=dx1 {
                            let (sx, sy) = orientation.to_stored(dx, dy, w, h);
                            let src = (sy - y0) as usize * stride + sx as usize * BPP;
                            let dst = (row + (dx - tx) as usize) * BPP;
                            tile[dst..dst + BPP].copy_from_slice(&strip[src..src + BPP]);
                        }
                    }
                }

                let written = store.write_tile(tile_col, tile_row, tile)?;
                self.tiles_written += 1;
                self.account(written)?;
            }
        }
        Ok(())
    }

    /// Publish level 0 bands whose display rows are all scattered, then
    /// cascade each into the smaller levels.
    fn complete_level0(&mut self, at_end: bool) -> Result<(), IoError> {
        let level = self.levels[0];
        let td = level.tile_dimension;
        let height = level.height;
        let scattered = self.rows_scattered;
        let flow = self.orientation.row_flow();

        for band in 0..level.rows {
            if self.pyramid.band_ready(0, band) {
                continue;
            }
            let complete = at_end
                || match flow {
                    RowFlow::TopDown => ((band + 1) * td).min(height) <= scattered,
                    RowFlow::BottomUp => band * td >= height.saturating_sub(scattered),
                    RowFlow::Columns => scattered >= self.source_height,
                };
            if complete {
                self.pyramid.mark_band(0, band);
                debug!(level = 0, band, "Band complete");
                self.cascade(0, band)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Reduced levels
    // =========================================================================

    /// Produce child bands above `band` of `level` for as long as both of
    /// their parent bands are ready.
    fn cascade(&mut self, mut level: usize, mut band: u32) -> Result<(), IoError> {
        while level + 1 < self.levels.len() {
            let parent_rows = self.levels[level].rows;
            let child_band = band / 2;
            let first = child_band * 2;

            let parents_ready = self.pyramid.band_ready(level, first)
                && (first + 1 >= parent_rows || self.pyramid.band_ready(level, first + 1));
            if !parents_ready || self.pyramid.band_ready(level + 1, child_band) {
                break;
            }

            self.produce_band(level + 1, child_band)?;
            self.pyramid.mark_band(level + 1, child_band);
            debug!(level = level + 1, band = child_band, "Band complete");

            level += 1;
            band = child_band;
        }
        Ok(())
    }

    /// Downsample every tile of band `band` of `level` from its parent level.
    fn produce_band(&mut self, level: usize, band: u32) -> Result<(), IoError> {
        let parent = self.levels[level - 1];
        let child = self.levels[level];
        let td = child.tile_dimension;
        let valid_height = parent.height.saturating_sub(2 * band * td).min(2 * td);

        let mut out = std::mem::take(&mut self.tile);
        let mut parents = std::mem::take(&mut self.parents);
        let result = self.produce_tiles(&parent, &child, band, valid_height, &mut parents, &mut out);
        self.tile = out;
        self.parents = parents;
        result
    }

    fn produce_tiles(
        &mut self,
        parent: &PyramidLevel,
        child: &PyramidLevel,
        band: u32,
        valid_height: u32,
        parents: &mut [Vec<u8>; 4],
        out: &mut [u8],
    ) -> Result<(), IoError> {
        let td = child.tile_dimension;
        let pyramid = Arc::clone(&self.pyramid);
        let parent_store = level_store(&pyramid, parent.index)?;
        let child_store = level_store(&pyramid, child.index)?;

        for col in 0..child.cols {
            let mut present = [false; 4];
            for (quadrant, buf) in parents.iter_mut().enumerate() {
                let pc = 2 * col + (quadrant as u32 & 1);
                let pr = 2 * band + (quadrant as u32 >> 1);
                if pc < parent.cols && pr < parent.rows {
                    parent_store.read_tile_into(pc, pr, buf)?;
                    present[quadrant] = true;
                }
            }

            let mosaic: Mosaic<'_> = std::array::from_fn(|q| {
                if present[q] {
                    Some(parents[q].as_slice())
                } else {
                    None
                }
            });
            let valid_width = parent.width.saturating_sub(2 * col * td).min(2 * td);
            downsample_mosaic(
                &mosaic,
                td as usize,
                valid_width as usize,
                valid_height as usize,
                out,
            );

            let written = child_store.write_tile(col, band, out)?;
            self.tiles_written += 1;
            self.account(written)?;
        }
        Ok(())
    }
}

fn level_store(pyramid: &PyramidStore, level: usize) -> Result<&TileStore, IoError> {
    pyramid.store(level).ok_or_else(|| IoError::Access {
        path: pyramid.directory().to_path_buf(),
        message: format!("missing level {level}"),
    })
}

// =============================================================================
// Tests
// =============================================================================
