//! Tile pyramid construction.
//!
//! - [`planner`]: level geometry for an image and a [`LevelPolicy`]
//! - [`compositor`]: decoded rows into level 0 tiles, then reduced levels
//! - [`downsample`]: the 2x2 box filter between levels

pub mod compositor;
pub mod downsample;
pub mod planner;

pub use compositor::{Compositor, CompositorStats};
pub use downsample::{downsample_mosaic, Mosaic};
pub use planner::{
    plan_levels, validate_tile_dimension, LevelPolicy, PyramidLevel, BYTES_PER_PIXEL, MAX_LEVELS,
    MAX_TILE_DIMENSION, MIN_TILE_DIMENSION,
};
