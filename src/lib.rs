//! # jpeg-pyramid
//!
//! Incremental JPEG decoding into a disk-backed tile pyramid.
//!
//! Bytes of a large JPEG are pushed in as they arrive, from a file or a
//! network stream. Scanlines are decoded as soon as enough compressed data is
//! buffered and composited into fixed-size RGBA tiles on several zoom levels.
//! Each level lives in its own file, accessed through a memory map or
//! positioned I/O, so a viewer can read finished tiles while decoding
//! continues.
//!
//! ## Features
//!
//! - **Incremental decoding**: baseline and extended sequential JPEG decoded
//!   one MCU row at a time, resumable at any chunk boundary
//! - **Orientation**: all eight EXIF orientations applied while tiling
//! - **Tile pyramid**: reduced levels produced band by band with a rounded
//!   2x2 box filter
//! - **Backpressure**: unflushed writes bounded by a fraction of available
//!   memory across all builders in the process
//!
//! ## Architecture
//!
//! - [`decode`] - Push-driven JPEG decoder and its resumable cursor
//! - [`mod@format`] - Marker framing, EXIF and orientation transforms
//! - [`pyramid`] - Level planning, tile compositing and downsampling
//! - [`store`] - Level files, storage backends and backpressure
//! - [`builder`] - Builder façade, query side and background worker
//! - [`io`] - Byte sources that feed a builder
//! - [`config`] - Library configuration and CLI arguments
//!
//! ## Example
//!
//! ```rust,no_run
//! use jpeg_pyramid::{build_from_file, TilerConfig};
//!
//! let config = TilerConfig::new().with_viewport(1024, 768).with_tile_dimension(256);
//! let image = build_from_file(config, "photo.jpg".as_ref())?;
//!
//! println!("{:?} in {} levels", image.image_size(), image.level_count());
//! let tile = image.tile(0, 0, 0)?;
//! assert_eq!(tile.len(), 256 * 256 * 4);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod config;
pub mod decode;
pub mod error;
pub mod format;
pub mod io;
pub mod pyramid;
pub mod store;

// Re-export commonly used types
pub use builder::{
    build_from_file, spawn_builder, BuildStats, BuildStatus, BuilderHandle, PyramidBuilder,
    TiledImage,
};
pub use config::{Cli, TilerConfig, DEFAULT_TILE_DIMENSION};
pub use decode::{DecodeCursor, DecoderPhase, JpegDecoder, Progress, ScanlineSink, SourceImage};
pub use error::{BuildError, DecodeError, GeometryError, IoError, TileError};
pub use format::{Orientation, ALL_ORIENTATIONS};
pub use io::{pump_source, ByteSource, ChannelSource, FileSource, MemorySource, DEFAULT_CHUNK_SIZE};
pub use pyramid::{plan_levels, LevelPolicy, PyramidLevel, MAX_LEVELS};
pub use store::{
    flush_threshold, set_flush_threshold, BackpressureController, StoreBackend,
    DEFAULT_FLUSH_THRESHOLD,
};
