//! JPEG marker definitions and segment framing.
//!
//! A JPEG stream is a sequence of marker segments. Every marker is `0xFF`
//! followed by a code byte; most markers carry a big-endian 2-byte length
//! (which includes the length bytes themselves) and a payload. The exceptions
//! are SOI, EOI, TEM and the restart markers RST0..RST7, which stand alone.
//!
//! The decoder consumes segments one at a time from a partially filled buffer,
//! so the framing helpers here never assume the whole segment has arrived:
//! [`peek_segment`] reports `Incomplete` rather than failing.

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image
pub const SOI: u8 = 0xD8;

/// End Of Image
pub const EOI: u8 = 0xD9;

/// Start Of Frame, baseline DCT
pub const SOF0: u8 = 0xC0;

/// Start Of Frame, extended sequential DCT
pub const SOF1: u8 = 0xC1;

/// Start Of Frame, progressive DCT
pub const SOF2: u8 = 0xC2;

/// Define Huffman Table
pub const DHT: u8 = 0xC4;

/// Define Arithmetic Coding conditioning
pub const DAC: u8 = 0xCC;

/// Define Quantization Table
pub const DQT: u8 = 0xDB;

/// Define Restart Interval
pub const DRI: u8 = 0xDD;

/// Start Of Scan
pub const SOS: u8 = 0xDA;

/// First restart marker
pub const RST0: u8 = 0xD0;

/// Last restart marker
pub const RST7: u8 = 0xD7;

/// Application segment 0 (JFIF)
pub const APP0: u8 = 0xE0;

/// Application segment 1 (EXIF)
pub const APP1: u8 = 0xE1;

/// Application segment 14 (Adobe)
pub const APP14: u8 = 0xEE;

/// Comment
pub const COM: u8 = 0xFE;

/// Temporary private use marker (standalone)
pub const TEM: u8 = 0x01;

/// Returns true for markers that carry no length field.
#[inline]
pub fn is_standalone(marker: u8) -> bool {
    marker == SOI || marker == EOI || marker == TEM || is_restart(marker)
}

/// Returns true for RST0..RST7.
#[inline]
pub fn is_restart(marker: u8) -> bool {
    (RST0..=RST7).contains(&marker)
}

/// Returns true for any Start Of Frame marker (C0-CF except DHT, JPG and DAC).
#[inline]
pub fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && marker != DHT && marker != 0xC8 && marker != DAC
}

/// Human-readable name for a marker, used in error messages and logs.
pub fn marker_name(marker: u8) -> &'static str {
    match marker {
        SOI => "SOI",
        EOI => "EOI",
        SOF0 => "SOF0",
        SOF1 => "SOF1",
        SOF2 => "SOF2",
        DHT => "DHT",
        DQT => "DQT",
        DRI => "DRI",
        SOS => "SOS",
        APP0 => "APP0",
        APP1 => "APP1",
        APP14 => "APP14",
        COM => "COM",
        m if is_restart(m) => "RST",
        m if is_sof(m) => "SOF",
        0xE2..=0xEF => "APPn",
        _ => "marker",
    }
}

// =============================================================================
// Segment Framing
// =============================================================================

/// Result of looking for the next marker segment in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPeek {
    /// Not enough bytes buffered to frame the segment.
    Incomplete,

    /// A complete segment.
    ///
    /// `payload` is the byte range of the payload (after the length field) and
    /// `next` is the offset of the byte following the segment.
    Segment {
        marker: u8,
        payload: (usize, usize),
        next: usize,
    },

    /// Bytes at the position are not a marker.
    NotMarker(u8),
}

/// Frame the marker segment starting at `pos`.
///
/// Fill bytes (`0xFF` repeated before the marker code) are skipped, as the JPEG
/// standard permits. Standalone markers yield an empty payload.
pub fn peek_segment(data: &[u8], pos: usize) -> SegmentPeek {
    if pos >= data.len() {
        return SegmentPeek::Incomplete;
    }
    if data[pos] != 0xFF {
        return SegmentPeek::NotMarker(data[pos]);
    }

    // Skip fill bytes
    let mut code_pos = pos + 1;
    while code_pos < data.len() && data[code_pos] == 0xFF {
        code_pos += 1;
    }
    if code_pos >= data.len() {
        return SegmentPeek::Incomplete;
    }

    let marker = data[code_pos];
    if marker == 0x00 {
        return SegmentPeek::NotMarker(0xFF);
    }
    if is_standalone(marker) {
        return SegmentPeek::Segment {
            marker,
            payload: (code_pos + 1, code_pos + 1),
            next: code_pos + 1,
        };
    }

    if code_pos + 3 > data.len() {
        return SegmentPeek::Incomplete;
    }
    let length = u16::from_be_bytes([data[code_pos + 1], data[code_pos + 2]]) as usize;
    let start = code_pos + 3;
    // A length below 2 is corrupt; treat it as an empty payload and let the
    // segment parser reject it.
    let end = code_pos + 1 + length.max(2);
    if end > data.len() {
        return SegmentPeek::Incomplete;
    }

    SegmentPeek::Segment {
        marker,
        payload: (start, end),
        next: end,
    }
}

/// Check whether `data` starts with the JPEG SOI marker.
pub fn has_soi(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == SOI
}

// =============================================================================
// Tests
// =============================================================================
