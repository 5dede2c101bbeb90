//! Configuration for pyramid builds.
//!
//! [`TilerConfig`] is the library-side configuration handed to a builder. The
//! [`Cli`] type parses the same settings for the `jpeg-pyramid` binary from
//! command-line arguments and environment variables.
//!
//! # Environment Variables
//!
//! - `JPYR_OUTPUT_DIR` - Directory for level files (default: system temp dir)
//! - `JPYR_TILE_SIZE` - Tile side in pixels (default: 256)
//! - `JPYR_LEVELS` - Explicit level count (overrides the viewport)
//! - `JPYR_VIEWPORT_WIDTH` / `JPYR_VIEWPORT_HEIGHT` - Target viewport (default: 1024x768)
//! - `JPYR_ORIENTATION` - Orientation override, 0 = from EXIF (default: 0)
//! - `JPYR_BACKEND` - `mapped` or `positioned` (default: mapped)
//! - `JPYR_FLUSH_THRESHOLD` - Fraction of available memory (default: 0.5)
//! - `JPYR_CHUNK_SIZE` - Bytes per read from the input (default: 64 KiB)
//! - `JPYR_KEEP_FILES` - Keep level files after the process exits

use std::path::PathBuf;

use clap::Parser;

use crate::error::GeometryError;
use crate::io::DEFAULT_CHUNK_SIZE;
use crate::pyramid::{validate_tile_dimension, LevelPolicy, MAX_LEVELS};
use crate::store::{StoreBackend, DEFAULT_FLUSH_THRESHOLD};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile side in pixels.
pub const DEFAULT_TILE_DIMENSION: u32 = 256;

/// Default viewport width used to stop reducing levels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;

/// Default viewport height used to stop reducing levels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Default depth of the chunk queue in front of a background builder.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// TilerConfig
// =============================================================================

/// Settings for one pyramid build.
#[derive(Debug, Clone, PartialEq)]
pub struct TilerConfig {
    /// When to stop adding reduced levels
    pub level_policy: LevelPolicy,
    /// 0 = use the file's EXIF orientation; 1-8 force a code
    pub orientation: u8,
    /// Tile side in pixels (power of two)
    pub tile_dimension: u32,
    /// Level file access
    pub backend: StoreBackend,
    /// Parent directory for level files
    pub output_dir: PathBuf,
    /// Leave level files in place when the builder is dropped
    pub keep_files: bool,
    /// Chunks queued ahead of a background builder
    pub channel_capacity: usize,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            level_policy: LevelPolicy::Viewport {
                width: DEFAULT_VIEWPORT_WIDTH,
                height: DEFAULT_VIEWPORT_HEIGHT,
            },
            orientation: 0,
            tile_dimension: DEFAULT_TILE_DIMENSION,
            backend: StoreBackend::default(),
            output_dir: std::env::temp_dir(),
            keep_files: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl TilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce until a level fits inside `width` x `height`.
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.level_policy = LevelPolicy::Viewport { width, height };
        self
    }

    /// Build exactly `count` levels.
    pub fn with_level_count(mut self, count: usize) -> Self {
        self.level_policy = LevelPolicy::Count(count);
        self
    }

    pub fn with_orientation(mut self, code: u8) -> Self {
        self.orientation = code;
        self
    }

    pub fn with_tile_dimension(mut self, tile_dimension: u32) -> Self {
        self.tile_dimension = tile_dimension;
        self
    }

    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Check the settings that do not depend on the image.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] for an unsupported tile dimension, a zero
    /// viewport, a level count outside `1..=MAX_LEVELS`, or an orientation
    /// override above 8.
    pub fn validate(&self) -> Result<(), GeometryError> {
        validate_tile_dimension(self.tile_dimension)?;

        match self.level_policy {
            LevelPolicy::Viewport { width, height } if width == 0 || height == 0 => {
                return Err(GeometryError::InvalidViewport { width, height });
            }
            LevelPolicy::Count(count) if count == 0 || count > MAX_LEVELS => {
                return Err(GeometryError::InvalidLevelCount {
                    count,
                    max: MAX_LEVELS,
                });
            }
            _ => {}
        }

        if self.orientation > 8 {
            return Err(GeometryError::InvalidOrientation(self.orientation));
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// jpeg-pyramid - Build a disk-backed tile pyramid from a JPEG.
///
/// Decodes the input incrementally, writes one tile file per zoom level and
/// prints a JSON summary of the result.
#[derive(Parser, Debug, Clone)]
#[command(name = "jpeg-pyramid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JPEG file to tile.
    pub input: PathBuf,

    // =========================================================================
    // Output
    // =========================================================================
    /// Directory that receives the level files.
    ///
    /// Each build writes into its own subdirectory.
    #[arg(short, long, env = "JPYR_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Keep the level files after the build.
    #[arg(long, default_value_t = false, env = "JPYR_KEEP_FILES")]
    pub keep_files: bool,

    /// Level file access.
    #[arg(long, value_enum, default_value_t = StoreBackend::Mapped, env = "JPYR_BACKEND")]
    pub backend: StoreBackend,

    // =========================================================================
    // Pyramid
    // =========================================================================
    /// Tile side in pixels (power of two, 8-4096).
    #[arg(long, default_value_t = DEFAULT_TILE_DIMENSION, env = "JPYR_TILE_SIZE")]
    pub tile_size: u32,

    /// Build exactly this many levels instead of reducing to the viewport.
    #[arg(long, env = "JPYR_LEVELS")]
    pub levels: Option<usize>,

    /// Viewport width the smallest level must fit.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_WIDTH, env = "JPYR_VIEWPORT_WIDTH")]
    pub viewport_width: u32,

    /// Viewport height the smallest level must fit.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_HEIGHT, env = "JPYR_VIEWPORT_HEIGHT")]
    pub viewport_height: u32,

    /// Orientation override: 0 reads EXIF, 1-8 force a code.
    #[arg(long, default_value_t = 0, env = "JPYR_ORIENTATION")]
    pub orientation: u8,

    // =========================================================================
    // Resources
    // =========================================================================
    /// Fraction of available memory that may hold unflushed tile data.
    #[arg(long, default_value_t = DEFAULT_FLUSH_THRESHOLD, env = "JPYR_FLUSH_THRESHOLD")]
    pub flush_threshold: f32,

    /// Bytes read from the input per chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "JPYR_CHUNK_SIZE")]
    pub chunk_size: usize,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.flush_threshold > 0.0 && self.flush_threshold <= 1.0) {
            return Err("flush_threshold must be in (0, 1]".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        self.tiler_config().validate().map_err(|e| e.to_string())
    }

    /// The library configuration these arguments describe.
    pub fn tiler_config(&self) -> TilerConfig {
        let mut config = TilerConfig::new()
            .with_tile_dimension(self.tile_size)
            .with_orientation(self.orientation)
            .with_backend(self.backend)
            .with_keep_files(self.keep_files);

        config = match self.levels {
            Some(count) => config.with_level_count(count),
            None => config.with_viewport(self.viewport_width, self.viewport_height),
        };
        if let Some(ref dir) = self.output_dir {
            config = config.with_output_dir(dir);
        }
        config
    }
}

// =============================================================================
// Tests
// =============================================================================
