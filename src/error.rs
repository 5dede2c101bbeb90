use std::path::PathBuf;

use thiserror::Error;

use crate::builder::BuildStatus;

/// Errors raised while planning pyramid geometry.
///
/// These are caller programming errors and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Image width or height is zero
    #[error("Invalid image dimensions: {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    /// Target viewport has a zero axis
    #[error("Invalid viewport: {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    /// Explicit level count is zero or above the supported maximum
    #[error("Invalid level count {count}: must be between 1 and {max}")]
    InvalidLevelCount { count: usize, max: usize },

    /// Tile dimension is not a supported power of two
    #[error("Invalid tile dimension {0}: must be a power of two between 8 and 4096")]
    InvalidTileDimension(u32),

    /// Orientation override outside 0-8
    #[error("Invalid orientation {0}: must be 0 (auto) or an EXIF code 1-8")]
    InvalidOrientation(u8),
}

/// Errors raised by the incremental JPEG decoder.
///
/// Any of these moves the builder to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before a complete frame header and scan header arrived
    #[error("End of input before JPEG header ({received} bytes received)")]
    MissingHeader { received: u64 },

    /// Stream does not start with SOI
    #[error("Not a JPEG stream: expected FFD8, got {0:02X}{1:02X}")]
    NotJpeg(u8, u8),

    /// A marker segment is malformed
    #[error("Invalid {segment} segment: {message}")]
    InvalidSegment {
        segment: &'static str,
        message: String,
    },

    /// Frame type or parameters the row decoder cannot handle
    #[error("Unsupported JPEG: {reason}")]
    Unsupported { reason: String },

    /// Entropy-coded data is corrupt
    #[error("Corrupt scan data at row {row}: {message}")]
    CorruptData { row: u32, message: String },

    /// Input ended before every scanline was decoded
    #[error("Truncated JPEG: decoded {decoded} of {expected} scanlines")]
    Truncated { decoded: u32, expected: u32 },

    /// Whole-image fallback decoder rejected the stream
    #[error("Image decode failed: {message}")]
    Fallback { message: String },
}

/// I/O errors from the tile store.
///
/// The underlying `std::io::Error` is flattened to a message so the error can be
/// cloned into the builder's failure slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// Backing file could not be created or opened
    #[error("Failed to create {path}: {message}")]
    Create { path: PathBuf, message: String },

    /// Backing file could not be extended to its final size
    #[error("Failed to extend {path} to {size} bytes: {message}")]
    Extend {
        path: PathBuf,
        size: u64,
        message: String,
    },

    /// Memory mapping failed
    #[error("Failed to map {path}: {message}")]
    Map { path: PathBuf, message: String },

    /// Read or write outside the file's extent
    #[error("Range out of bounds: {len} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds { offset: u64, len: u64, size: u64 },

    /// Positioned read or write failed
    #[error("I/O error on {path}: {message}")]
    Access { path: PathBuf, message: String },

    /// Flush to stable storage failed
    #[error("Failed to flush {path}: {message}")]
    Flush { path: PathBuf, message: String },

    /// Input source could not be read
    #[error("Source error: {0}")]
    Source(String),
}

/// Errors returned by tile queries.
///
/// These are local to the query and never fail the builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Level index is beyond the pyramid
    #[error("Invalid level {level}: pyramid has {levels} levels")]
    InvalidLevel { level: usize, levels: usize },

    /// Tile coordinates are outside the level's grid
    #[error("Tile ({col}, {row}) out of bounds for level {level} (grid is {cols}x{rows})")]
    TileOutOfBounds {
        level: usize,
        col: u32,
        row: u32,
        cols: u32,
        rows: u32,
    },

    /// Band has not been fully produced yet
    #[error("Tile row {row} of level {level} is not complete")]
    BandNotReady { level: usize, row: u32 },

    /// Builder has no tiles to serve (not started, failed or cancelled)
    #[error("No tiles available: builder is {status}")]
    Unavailable { status: BuildStatus },

    /// Store read failed
    #[error("Tile read failed: {0}")]
    Io(#[from] IoError),
}

/// Errors returned by the builder's write API.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Pyramid geometry could not be planned
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Compressed data could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Tile store failure
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Builder already reached a terminal status
    #[error("Builder is {status}; further input is rejected")]
    Closed { status: BuildStatus },

    /// Background worker ended abnormally
    #[error("Builder worker stopped: {message}")]
    Worker { message: String },
}

impl BuildError {
    /// Whether this error came from the decoder (as opposed to the tile store).
    pub fn is_decode(&self) -> bool {
        matches!(self, BuildError::Decode(_))
    }
}
