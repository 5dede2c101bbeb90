//! Marker segment parsing up to the first scan.
//!
//! [`HeaderState`] accumulates frame parameters, quantization and Huffman
//! tables, and descriptive metadata one segment at a time. It never sees
//! entropy-coded data.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, trace};

use super::color::ColorModel;
use super::huffman::HuffmanTable;
use crate::error::DecodeError;
use crate::format::exif::parse_exif;
use crate::format::jpeg::{
    is_sof, marker_name, APP0, APP1, APP14, COM, DHT, DQT, DRI, EOI, SOF0, SOF1, SOF2, SOS,
};

// =============================================================================
// Frame
// =============================================================================

/// Coding process declared by the SOF marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Baseline,
    ExtendedSequential,
    Progressive,
    /// Lossless, hierarchical or arithmetic-coded frames (SOF marker code)
    Other(u8),
}

impl FrameKind {
    fn from_marker(marker: u8) -> Self {
        match marker {
            SOF0 => FrameKind::Baseline,
            SOF1 => FrameKind::ExtendedSequential,
            SOF2 => FrameKind::Progressive,
            other => FrameKind::Other(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Baseline => "baseline",
            FrameKind::ExtendedSequential => "extended",
            FrameKind::Progressive => "progressive",
            FrameKind::Other(_) => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    /// Horizontal sampling factor
    pub h: usize,
    /// Vertical sampling factor
    pub v: usize,
    /// Quantization table selector
    pub tq: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub precision: u8,
    pub width: u32,
    pub height: u32,
    pub components: Vec<Component>,
    pub max_h: usize,
    pub max_v: usize,
}

/// Component selection and table assignment for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    /// `(frame component index, DC table, AC table)`
    pub components: Vec<(usize, usize, usize)>,
    /// Spectral selection start and end
    pub ss: u8,
    pub se: u8,
    /// Successive approximation high and low
    pub ah: u8,
    pub al: u8,
}

impl ScanHeader {
    /// Whether the scan carries every component with full spectra in one pass.
    pub fn is_single_pass(&self, frame: &Frame) -> bool {
        self.components.len() == frame.components.len()
            && self.ss == 0
            && self.se == 63
            && self.ah == 0
            && self.al == 0
    }
}

/// What the decoder should do after a segment.
#[derive(Debug)]
pub enum SegmentOutcome {
    Continue,
    StartOfScan(ScanHeader),
    EndOfImage,
}

// =============================================================================
// HeaderState
// =============================================================================

#[derive(Debug, Default)]
pub struct HeaderState {
    pub frame: Option<Frame>,
    /// Quantization tables in zigzag order
    pub quant: [Option<[u16; 64]>; 4],
    pub dc_tables: [Option<HuffmanTable>; 4],
    pub ac_tables: [Option<HuffmanTable>; 4],
    pub restart_interval: u16,
    pub orientation: Option<u8>,
    pub adobe_transform: Option<u8>,
    pub properties: BTreeMap<String, Value>,
}

impl HeaderState {
    /// Apply one marker segment.
    pub fn apply(&mut self, marker: u8, payload: &[u8]) -> Result<SegmentOutcome, DecodeError> {
        trace!(marker = marker_name(marker), len = payload.len(), "JPEG segment");
        match marker {
            DQT => self.parse_dqt(payload)?,
            DHT => self.parse_dht(payload)?,
            DRI => self.parse_dri(payload)?,
            APP0 => self.parse_jfif(payload),
            APP1 => self.parse_app1(payload),
            APP14 => self.parse_adobe(payload),
            COM => self.parse_comment(payload),
            SOS => return Ok(SegmentOutcome::StartOfScan(self.parse_sos(payload)?)),
            EOI => return Ok(SegmentOutcome::EndOfImage),
            m if is_sof(m) => self.parse_sof(m, payload)?,
            _ => {}
        }
        Ok(SegmentOutcome::Continue)
    }

    /// Color interpretation of the frame's components.
    pub fn color_model(&self) -> Option<ColorModel> {
        let frame = self.frame.as_ref()?;
        match frame.components.len() {
            1 => Some(ColorModel::Grayscale),
            3 => {
                let ids: Vec<u8> = frame.components.iter().map(|c| c.id).collect();
                if self.adobe_transform == Some(0) || ids == b"RGB" {
                    Some(ColorModel::Rgb)
                } else {
                    Some(ColorModel::YCbCr)
                }
            }
            _ => None,
        }
    }

    fn parse_dqt(&mut self, mut data: &[u8]) -> Result<(), DecodeError> {
        let invalid = |message: String| DecodeError::InvalidSegment {
            segment: "DQT",
            message,
        };

        while !data.is_empty() {
            let precision = data[0] >> 4;
            let id = (data[0] & 0x0F) as usize;
            if id > 3 {
                return Err(invalid(format!("table id {id}")));
            }
            let entry_size = if precision == 0 { 1 } else { 2 };
            let needed = 1 + 64 * entry_size;
            if data.len() < needed {
                return Err(invalid("table truncated".into()));
            }

            let mut table = [0u16; 64];
            for (i, value) in table.iter_mut().enumerate() {
                *value = if precision == 0 {
                    data[1 + i] as u16
                } else {
                    u16::from_be_bytes([data[1 + 2 * i], data[2 + 2 * i]])
                };
            }
            self.quant[id] = Some(table);
            data = &data[needed..];
        }
        Ok(())
    }

    fn parse_dht(&mut self, mut data: &[u8]) -> Result<(), DecodeError> {
        while !data.is_empty() {
            if data.len() < 17 {
                return Err(DecodeError::InvalidSegment {
                    segment: "DHT",
                    message: "table header truncated".into(),
                });
            }
            let class = data[0] >> 4;
            let id = (data[0] & 0x0F) as usize;
            if class > 1 || id > 3 {
                return Err(DecodeError::InvalidSegment {
                    segment: "DHT",
                    message: format!("table class {class} id {id}"),
                });
            }

            let mut counts = [0u8; 16];
            counts.copy_from_slice(&data[1..17]);
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            if data.len() < 17 + total {
                return Err(DecodeError::InvalidSegment {
                    segment: "DHT",
                    message: "symbols truncated".into(),
                });
            }

            let table = HuffmanTable::new(&counts, &data[17..17 + total])?;
            if class == 0 {
                self.dc_tables[id] = Some(table);
            } else {
                self.ac_tables[id] = Some(table);
            }
            data = &data[17 + total..];
        }
        Ok(())
    }

    fn parse_dri(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        if data.len() < 2 {
            return Err(DecodeError::InvalidSegment {
                segment: "DRI",
                message: "too short".into(),
            });
        }
        self.restart_interval = u16::from_be_bytes([data[0], data[1]]);
        Ok(())
    }

    fn parse_sof(&mut self, marker: u8, data: &[u8]) -> Result<(), DecodeError> {
        let invalid = |message: String| DecodeError::InvalidSegment {
            segment: "SOF",
            message,
        };

        if self.frame.is_some() {
            return Err(invalid("multiple frame headers".into()));
        }
        if data.len() < 6 {
            return Err(invalid("too short".into()));
        }

        let precision = data[0];
        let height = u16::from_be_bytes([data[1], data[2]]) as u32;
        let width = u16::from_be_bytes([data[3], data[4]]) as u32;
        let count = data[5] as usize;

        if width == 0 {
            return Err(invalid("zero width".into()));
        }
        if height == 0 {
            return Err(DecodeError::Unsupported {
                reason: "image height defined by DNL marker".into(),
            });
        }
        if count == 0 || data.len() < 6 + count * 3 {
            return Err(invalid(format!("{count} components")));
        }

        let mut components = Vec::with_capacity(count);
        for i in 0..count {
            let entry = &data[6 + i * 3..9 + i * 3];
            let h = (entry[1] >> 4) as usize;
            let v = (entry[1] & 0x0F) as usize;
            let tq = entry[2] as usize;
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) || tq > 3 {
                return Err(invalid(format!(
                    "component {} has sampling {h}x{v}, table {tq}",
                    entry[0]
                )));
            }
            components.push(Component {
                id: entry[0],
                h,
                v,
                tq,
            });
        }

        // A single-component frame is never interleaved, so its MCU is one block
        if count == 1 {
            components[0].h = 1;
            components[0].v = 1;
        }

        let max_h = components.iter().map(|c| c.h).max().unwrap_or(1);
        let max_v = components.iter().map(|c| c.v).max().unwrap_or(1);
        let kind = FrameKind::from_marker(marker);

        debug!(
            width,
            height,
            components = count,
            precision,
            kind = kind.name(),
            "JPEG frame header"
        );

        self.properties.insert("PixelWidth".into(), Value::from(width));
        self.properties.insert("PixelHeight".into(), Value::from(height));
        self.properties.insert("Components".into(), Value::from(count));
        self.properties.insert("BitsPerSample".into(), Value::from(precision));
        self.properties.insert("FrameType".into(), Value::from(kind.name()));
        self.properties.insert(
            "Progressive".into(),
            Value::from(kind == FrameKind::Progressive),
        );

        self.frame = Some(Frame {
            kind,
            precision,
            width,
            height,
            components,
            max_h,
            max_v,
        });
        Ok(())
    }

    fn parse_sos(&self, data: &[u8]) -> Result<ScanHeader, DecodeError> {
        let invalid = |message: String| DecodeError::InvalidSegment {
            segment: "SOS",
            message,
        };

        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| invalid("scan before frame header".into()))?;
        if data.is_empty() {
            return Err(invalid("too short".into()));
        }

        let count = data[0] as usize;
        if count == 0 || count > 4 || data.len() < 1 + count * 2 + 3 {
            return Err(invalid(format!("{count} scan components")));
        }

        let mut components = Vec::with_capacity(count);
        for i in 0..count {
            let id = data[1 + i * 2];
            let tables = data[2 + i * 2];
            let index = frame
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| invalid(format!("unknown component id {id}")))?;
            let dc = (tables >> 4) as usize;
            let ac = (tables & 0x0F) as usize;
            if dc > 3 || ac > 3 {
                return Err(invalid(format!("table selectors {dc}/{ac}")));
            }
            components.push((index, dc, ac));
        }

        let tail = &data[1 + count * 2..];
        Ok(ScanHeader {
            components,
            ss: tail[0],
            se: tail[1],
            ah: tail[2] >> 4,
            al: tail[2] & 0x0F,
        })
    }

    fn parse_jfif(&mut self, data: &[u8]) {
        if data.len() < 12 || &data[..5] != b"JFIF\0" {
            return;
        }
        let unit = match data[7] {
            1 => "inch",
            2 => "cm",
            _ => "none",
        };
        self.properties.insert(
            "JFIFVersion".into(),
            Value::from(format!("{}.{:02}", data[5], data[6])),
        );
        self.properties.insert("DensityUnit".into(), Value::from(unit));
        self.properties.insert(
            "XDensity".into(),
            Value::from(u16::from_be_bytes([data[8], data[9]])),
        );
        self.properties.insert(
            "YDensity".into(),
            Value::from(u16::from_be_bytes([data[10], data[11]])),
        );
    }

    fn parse_app1(&mut self, data: &[u8]) {
        if let Some(exif) = parse_exif(data) {
            if exif.orientation.is_some() {
                self.orientation = exif.orientation;
            }
            self.properties.extend(exif.tags);
        }
    }

    fn parse_adobe(&mut self, data: &[u8]) {
        if data.len() >= 12 && &data[..5] == b"Adobe" {
            self.adobe_transform = Some(data[11]);
        }
    }

    fn parse_comment(&mut self, data: &[u8]) {
        let text = String::from_utf8_lossy(data)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if !text.is_empty() {
            self.properties.insert("Comment".into(), Value::from(text));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
