//! EXIF metadata extraction from APP1 segments.
//!
//! An EXIF APP1 payload is the six bytes `Exif\0\0` followed by a miniature
//! TIFF file: a byte-order mark, the magic number 42, and an offset to IFD0.
//! Only the handful of tags that matter to a tiling viewer are extracted:
//! the orientation code and a few descriptive ASCII strings that are surfaced
//! as image properties.
//!
//! All offsets inside the TIFF structure are relative to the start of the
//! byte-order mark, not to the start of the JPEG file.

use std::collections::BTreeMap;

use serde_json::Value;

/// Identifier at the start of an EXIF APP1 payload.
pub const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

/// IFD0 tag holding the orientation code (SHORT, 1-8).
pub const TAG_ORIENTATION: u16 = 0x0112;

/// IFD0 tag pointing at the EXIF sub-IFD.
const TAG_EXIF_IFD: u16 = 0x8769;

/// Maximum number of entries read from one IFD.
const MAX_IFD_ENTRIES: usize = 512;

/// ASCII tags surfaced as properties, with their property names.
const ASCII_TAGS: &[(u16, &str)] = &[
    (0x010E, "ImageDescription"),
    (0x010F, "Make"),
    (0x0110, "Model"),
    (0x0131, "Software"),
    (0x0132, "DateTime"),
    (0x013B, "Artist"),
    (0x9003, "DateTimeOriginal"),
];

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order of the embedded TIFF structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from a byte slice using this byte order.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([bytes[0], bytes[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            ByteOrder::BigEndian => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

// =============================================================================
// ExifData
// =============================================================================

/// Tags extracted from an EXIF payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifData {
    /// Orientation code, if present and in range 1-8
    pub orientation: Option<u8>,

    /// Descriptive tags keyed by property name
    pub tags: BTreeMap<String, Value>,
}

/// Parse an APP1 payload.
///
/// Returns `None` if the payload is not EXIF or its TIFF header is malformed.
/// Individual bad entries are skipped rather than failing the whole parse;
/// metadata problems must never prevent the image from decoding.
pub fn parse_exif(payload: &[u8]) -> Option<ExifData> {
    if payload.len() < EXIF_HEADER.len() + 8 || &payload[..6] != EXIF_HEADER {
        return None;
    }
    let tiff = &payload[6..];

    let byte_order = match &tiff[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return None,
    };
    if byte_order.read_u16(&tiff[2..4]) != 42 {
        return None;
    }
    let ifd0 = byte_order.read_u32(&tiff[4..8]) as usize;

    let mut data = ExifData::default();
    let exif_ifd = read_ifd(tiff, ifd0, byte_order, &mut data);
    if let Some(offset) = exif_ifd {
        read_ifd(tiff, offset, byte_order, &mut data);
    }

    if let Some(orientation) = data.orientation {
        data.tags
            .insert("Orientation".to_string(), Value::from(orientation));
    }

    Some(data)
}

/// Read one IFD, recording known tags. Returns the EXIF sub-IFD offset if the
/// IFD points at one.
fn read_ifd(tiff: &[u8], offset: usize, order: ByteOrder, data: &mut ExifData) -> Option<usize> {
    if offset + 2 > tiff.len() {
        return None;
    }
    let count = (order.read_u16(&tiff[offset..offset + 2]) as usize).min(MAX_IFD_ENTRIES);
    let mut sub_ifd = None;

    for i in 0..count {
        let entry = offset + 2 + i * 12;
        if entry + 12 > tiff.len() {
            break;
        }
        let tag = order.read_u16(&tiff[entry..entry + 2]);
        let field_type = order.read_u16(&tiff[entry + 2..entry + 4]);
        let value_count = order.read_u32(&tiff[entry + 4..entry + 8]) as usize;
        let value = &tiff[entry + 8..entry + 12];

        match tag {
            TAG_ORIENTATION if field_type == 3 => {
                let code = order.read_u16(value);
                if (1..=8).contains(&code) {
                    data.orientation = Some(code as u8);
                }
            }
            TAG_EXIF_IFD if field_type == 4 || field_type == 13 => {
                sub_ifd = Some(order.read_u32(value) as usize);
            }
            _ if field_type == 2 => {
                if let Some((_, name)) = ASCII_TAGS.iter().find(|(t, _)| *t == tag) {
                    if let Some(text) = read_ascii(tiff, value, value_count, order) {
                        data.tags.insert(name.to_string(), Value::String(text));
                    }
                }
            }
            _ => {}
        }
    }

    sub_ifd
}

/// Read an ASCII value, inline when it fits in four bytes.
fn read_ascii(tiff: &[u8], value: &[u8], count: usize, order: ByteOrder) -> Option<String> {
    let bytes = if count <= 4 {
        &value[..count]
    } else {
        let start = order.read_u32(value) as usize;
        let end = start.checked_add(count)?;
        tiff.get(start..end)?
    };

    let text: String = String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// =============================================================================
// Tests
// =============================================================================
