//! Test utilities for integration tests.
//!
//! This module provides helper functions for creating test JPEG streams with
//! various layouts (gradients, solid colors, EXIF orientation, restart
//! intervals) and for driving and inspecting whole pyramid builds.

use std::path::Path;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma, Rgb, RgbImage};

use jpeg_pyramid::store::{BackpressureController, FixedMemory, OutstandingWrites};
use jpeg_pyramid::{BuildStatus, PyramidBuilder, TiledImage, TilerConfig};

// =============================================================================
// Test JPEG Creation
// =============================================================================

/// Create a test grayscale JPEG image.
pub fn create_test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| {
        let val = ((x + y) % 256) as u8;
        Luma([val])
    });

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Create a test RGB JPEG image.
pub fn create_test_rgb_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x % 256) as u8;
        let g = (y % 256) as u8;
        let b = ((x + y) % 256) as u8;
        Rgb([r, g, b])
    });

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Create a JPEG filled with a single color.
pub fn create_solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 100);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Create a JPEG whose left half is `left` and right half is `right`.
///
/// Keep `width` a multiple of 32 so the seam falls on an MCU boundary.
pub fn create_split_jpeg(width: u32, height: u32, left: [u8; 3], right: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb(left)
        } else {
            Rgb(right)
        }
    });

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 100);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Create a progressive (SOF2) RGB JPEG.
///
/// `subsampled` selects 4:2:0 chroma, otherwise 4:4:4.
pub fn create_progressive_jpeg(width: u32, height: u32, subsampled: bool) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3 % 256) as u8, (y * 4 % 256) as u8, ((x * y) % 256) as u8])
    });

    let mut buf = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, 90);
    encoder.set_progressive(true);
    encoder.set_sampling_factor(if subsampled {
        jpeg_encoder::SamplingFactor::F_2_2
    } else {
        jpeg_encoder::SamplingFactor::F_1_1
    });
    encoder
        .encode(
            img.as_raw(),
            width as u16,
            height as u16,
            jpeg_encoder::ColorType::Rgb,
        )
        .unwrap();
    buf
}

// =============================================================================
// EXIF Orientation
// =============================================================================

/// Insert an EXIF APP1 segment carrying `orientation` right after SOI.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert!(is_valid_jpeg(jpeg));

    // Little-endian TIFF header with a single IFD0 entry
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(b"II");
    payload.extend_from_slice(&42u16.to_le_bytes());
    payload.extend_from_slice(&8u32.to_le_bytes());
    payload.extend_from_slice(&1u16.to_le_bytes());
    payload.extend_from_slice(&0x0112u16.to_le_bytes()); // Orientation
    payload.extend_from_slice(&3u16.to_le_bytes()); // SHORT
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(&orientation.to_le_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&0u32.to_le_bytes());

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

// =============================================================================
// Restart Intervals
// =============================================================================

/// Pixel value of every sample in [`create_restart_jpeg`] output.
pub const RESTART_GRAY: u8 = 129;

/// Create a grayscale baseline JPEG with a restart marker every `interval`
/// blocks.
///
/// The image is `blocks_wide * 8` by `blocks_high * 8` pixels, every pixel
/// [`RESTART_GRAY`]. Only DC coefficients are coded: the first block of each
/// interval codes a difference of +1 and the rest code 0, so any decoder that
/// fails to reset its DC prediction at a marker produces brighter pixels.
/// A comment segment pads the header past the decoder's header threshold so
/// the scan itself arrives in later chunks.
pub fn create_restart_jpeg(blocks_wide: u16, blocks_high: u16, interval: u16) -> Vec<u8> {
    assert!(interval > 0);
    let mut out = vec![0xFF, 0xD8];

    out.extend_from_slice(&[0xFF, 0xFE, 0x02, 0x5A]);
    out.extend(std::iter::repeat(b'.').take(0x258));

    // Quantization: every step 8
    out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    out.extend([8u8; 64]);

    // SOF0, one component, 1x1 sampling
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
    out.extend_from_slice(&(blocks_high * 8).to_be_bytes());
    out.extend_from_slice(&(blocks_wide * 8).to_be_bytes());
    out.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);

    // DC table: "0" -> size 0, "10" -> size 1
    out.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x15, 0x00, 1, 1]);
    out.extend([0u8; 14]);
    out.extend([0, 1]);
    // AC table: "0" -> EOB
    out.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x10, 1]);
    out.extend([0u8; 15]);
    out.push(0x00);

    out.extend_from_slice(&[0xFF, 0xDD, 0x00, 0x04]);
    out.extend_from_slice(&interval.to_be_bytes());

    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);

    let total = blocks_wide as u32 * blocks_high as u32;
    let mut bits = BitWriter::default();
    let mut marker = 0u8;
    for block in 0..total {
        if block > 0 && block % interval as u32 == 0 {
            bits.flush_into(&mut out);
            out.extend_from_slice(&[0xFF, 0xD0 + marker]);
            marker = (marker + 1) % 8;
        }
        if block % interval as u32 == 0 {
            // DC size 1, value bit 1, EOB
            bits.push(&[1, 0, 1, 0]);
        } else {
            // DC size 0, EOB
            bits.push(&[0, 0]);
        }
    }
    bits.flush_into(&mut out);

    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// MSB-first bit packer with 1-padding and 0xFF stuffing.
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    filled: u8,
}

impl BitWriter {
    fn push(&mut self, bits: &[u8]) {
        for &bit in bits {
            self.current = (self.current << 1) | bit;
            self.filled += 1;
            if self.filled == 8 {
                self.emit();
            }
        }
    }

    fn emit(&mut self) {
        self.bytes.push(self.current);
        if self.current == 0xFF {
            self.bytes.push(0x00);
        }
        self.current = 0;
        self.filled = 0;
    }

    fn flush_into(&mut self, out: &mut Vec<u8>) {
        while self.filled != 0 {
            self.push(&[1]);
        }
        out.append(&mut self.bytes);
    }
}

// =============================================================================
// Build Helpers
// =============================================================================

/// Backpressure that never forces a flush and stays off the global counter.
pub fn quiet_backpressure() -> BackpressureController {
    BackpressureController::with_probe(
        Arc::new(OutstandingWrites::new(0.5)),
        Box::new(FixedMemory(1 << 40)),
    )
}

/// Configuration writing into `dir` with small tiles.
pub fn test_config(dir: &Path) -> TilerConfig {
    TilerConfig::new()
        .with_output_dir(dir)
        .with_tile_dimension(32)
}

/// Run a build synchronously, supplying `data` in chunks of `chunk` bytes.
pub fn build_in_chunks(config: TilerConfig, data: &[u8], chunk: usize) -> Arc<TiledImage> {
    build_with(config, quiet_backpressure(), data, chunk)
}

/// As [`build_in_chunks`], with an explicit backpressure controller.
pub fn build_with(
    config: TilerConfig,
    backpressure: BackpressureController,
    data: &[u8],
    chunk: usize,
) -> Arc<TiledImage> {
    let mut builder = PyramidBuilder::new(config)
        .unwrap()
        .with_backpressure(backpressure);
    for piece in data.chunks(chunk.max(1)) {
        if builder.supply(piece).unwrap() == BuildStatus::Finished {
            break;
        }
    }
    assert_eq!(builder.end_of_input().unwrap(), BuildStatus::Finished);
    builder.image()
}

/// Stitch every tile of `level` into one RGBA buffer of the level's size.
pub fn assemble_level(image: &TiledImage, level: usize) -> (u32, u32, Vec<u8>) {
    let info = image.level(level).unwrap();
    let td = info.tile_dimension as usize;
    let width = info.width as usize;
    let mut pixels = vec![0u8; width * info.height as usize * 4];

    for row in 0..info.rows {
        for col in 0..info.cols {
            let tile = image.tile(level, col, row).unwrap();
            assert_eq!(tile.len(), td * td * 4);
            let x0 = col as usize * td;
            let y0 = row as usize * td;
            let w = td.min(width - x0);
            let h = td.min(info.height as usize - y0);
            for y in 0..h {
                let src = &tile[y * td * 4..(y * td + w) * 4];
                let dst = ((y0 + y) * width + x0) * 4;
                pixels[dst..dst + w * 4].copy_from_slice(src);
            }
        }
    }
    (info.width, info.height, pixels)
}

/// RGBA of pixel (`x`, `y`) in a buffer `width` pixels wide.
pub fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

/// Whether two colors differ by at most `tolerance` per RGB channel.
pub fn close_to(actual: [u8; 4], expected: [u8; 3], tolerance: i32) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(&a, &e)| (a as i32 - e as i32).abs() <= tolerance)
}

// =============================================================================
// Validation Helpers
// =============================================================================

/// Check if data starts with JPEG SOI marker and ends with EOI.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

/// Number of level files under a pyramid directory.
pub fn level_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "tiles"))
                .count()
        })
        .unwrap_or(0)
}
