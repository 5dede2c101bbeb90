//! Incremental JPEG decoding.
//!
//! Baseline and extended sequential streams with one or three components are
//! decoded one MCU row at a time as bytes arrive. Everything else the `image`
//! crate can read (progressive, multi-scan, CMYK) is buffered and decoded at
//! end of input.
//!
//! - [`bits`] / [`huffman`]: entropy decoding with suspension on short input
//! - [`idct`] / [`color`]: block reconstruction and RGBA conversion
//! - [`header`]: marker segments up to the first scan
//! - [`scan`]: one MCU row from the entropy-coded segment
//! - [`decoder`]: the push-driven state machine tying them together

pub mod bits;
pub mod color;
pub mod cursor;
pub mod decoder;
pub mod fallback;
pub mod header;
pub mod huffman;
pub mod idct;
pub mod scan;

pub use bits::BitState;
pub use color::ColorModel;
pub use cursor::DecodeCursor;
pub use decoder::{
    DecoderPhase, Flow, JpegDecoder, Progress, ScanlineSink, SourceImage, MIN_HEADER_BYTES,
};
pub use scan::EntropyState;
