//! Whole-image decoding for streams the row decoder cannot walk sequentially.
//!
//! Progressive and multi-scan JPEGs spread each pixel's data across several
//! scans, so no scanline is final until the last scan arrives. These streams
//! are buffered in full and handed to the `image` crate once input ends.

use image::{ImageFormat, RgbaImage};

use crate::error::DecodeError;

/// Decode a complete JPEG stream to RGBA.
pub fn decode_buffered(data: &[u8]) -> Result<RgbaImage, DecodeError> {
    image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map(|img| img.to_rgba8())
        .map_err(|e| DecodeError::Fallback {
            message: e.to_string(),
        })
}
