//! Pyramid geometry.
//!
//! Level 0 is the full (display-oriented) image. Each following level halves
//! both axes, rounding up, until the stop condition of the [`LevelPolicy`].
//!
//! ```text
//! 600x400  ─►  300x200  ─►  150x100      viewport 200x200, tile 256
//!  3x2 tiles    2x1 tiles    1x1 tile
//! ```

use serde::Serialize;

use crate::error::GeometryError;

/// Upper bound on pyramid depth. 32 halvings reduce any `u32` extent to 1.
pub const MAX_LEVELS: usize = 32;

/// Smallest supported tile side.
pub const MIN_TILE_DIMENSION: u32 = 8;

/// Largest supported tile side.
pub const MAX_TILE_DIMENSION: u32 = 4096;

/// Bytes per stored pixel (RGBA).
pub const BYTES_PER_PIXEL: u32 = 4;

/// How many levels to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelPolicy {
    /// Reduce until a level fits inside the viewport.
    Viewport { width: u32, height: u32 },
    /// Build exactly this many levels.
    Count(usize),
}

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PyramidLevel {
    /// 0 = full resolution
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Tile grid columns
    pub cols: u32,
    /// Tile grid rows (bands)
    pub rows: u32,
    pub tile_dimension: u32,
}

impl PyramidLevel {
    pub fn new(index: usize, width: u32, height: u32, tile_dimension: u32) -> Self {
        Self {
            index,
            width,
            height,
            cols: width.div_ceil(tile_dimension),
            rows: height.div_ceil(tile_dimension),
            tile_dimension,
        }
    }

    /// Bytes in one tile.
    #[inline]
    pub fn tile_bytes(&self) -> usize {
        (self.tile_dimension * self.tile_dimension * BYTES_PER_PIXEL) as usize
    }

    /// Bytes in one padded pixel row (whole tiles).
    #[inline]
    pub fn bytes_per_row(&self) -> u64 {
        self.cols as u64 * self.tile_dimension as u64 * BYTES_PER_PIXEL as u64
    }

    #[inline]
    pub fn tile_count(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }

    /// Size of the tile area in bytes.
    #[inline]
    pub fn grid_bytes(&self) -> u64 {
        self.tile_count() * self.tile_bytes() as u64
    }

    /// Dimensions of the next smaller level.
    #[inline]
    pub fn halved(&self) -> (u32, u32) {
        (self.width.div_ceil(2), self.height.div_ceil(2))
    }

    /// Whether the level fits inside a `width` x `height` viewport.
    #[inline]
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width <= width && self.height <= height
    }
}

/// Check that `tile_dimension` is a power of two in the supported range.
pub fn validate_tile_dimension(tile_dimension: u32) -> Result<(), GeometryError> {
    if tile_dimension.is_power_of_two()
        && (MIN_TILE_DIMENSION..=MAX_TILE_DIMENSION).contains(&tile_dimension)
    {
        Ok(())
    } else {
        Err(GeometryError::InvalidTileDimension(tile_dimension))
    }
}

/// Compute pyramid levels for a `width` x `height` image.
///
/// # Errors
///
/// Returns a [`GeometryError`] for a zero-sized image or viewport, a level
/// count outside `1..=MAX_LEVELS`, or an unsupported tile dimension.
pub fn plan_levels(
    width: u32,
    height: u32,
    tile_dimension: u32,
    policy: LevelPolicy,
) -> Result<Vec<PyramidLevel>, GeometryError> {
    if width == 0 || height == 0 {
        return Err(GeometryError::ZeroDimension { width, height });
    }
    validate_tile_dimension(tile_dimension)?;

    let mut levels = vec![PyramidLevel::new(0, width, height, tile_dimension)];

    match policy {
        LevelPolicy::Viewport {
            width: vw,
            height: vh,
        } => {
            if vw == 0 || vh == 0 {
                return Err(GeometryError::InvalidViewport {
                    width: vw,
                    height: vh,
                });
            }
            loop {
                let last = levels[levels.len() - 1];
                if last.fits(vw, vh) || levels.len() == MAX_LEVELS {
                    break;
                }
                let (w, h) = last.halved();
                levels.push(PyramidLevel::new(levels.len(), w, h, tile_dimension));
            }
        }
        LevelPolicy::Count(count) => {
            if count == 0 || count > MAX_LEVELS {
                return Err(GeometryError::InvalidLevelCount {
                    count,
                    max: MAX_LEVELS,
                });
            }
            while levels.len() < count {
                let (w, h) = levels[levels.len() - 1].halved();
                levels.push(PyramidLevel::new(levels.len(), w, h, tile_dimension));
            }
        }
    }

    Ok(levels)
}

// =============================================================================
// Tests
// =============================================================================
