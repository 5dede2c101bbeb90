//! Push-driven JPEG decoder.
//!
//! Compressed bytes arrive in arbitrary chunks. Each call to
//! [`JpegDecoder::feed`] appends the chunk to the [`DecodeCursor`], then decodes
//! as far as the buffered data allows and hands complete scanlines to a
//! [`ScanlineSink`].
//!
//! ```text
//!  chunk ──► cursor.buffer ──► header segments ──► SOS
//!                                                   │
//!                     ┌─────────────────────────────┴──────────┐
//!                     ▼                                        ▼
//!             sequential scan                          buffered stream
//!       (committed after every MCU)           (decoded whole at end of input)
//!                     │                                        │
//!                     └──────────────► sink.rows() ◄───────────┘
//! ```
//!
//! Output never depends on how the input was split: a row is emitted only
//! after every byte it needs has arrived, and an MCU that runs out of data is
//! retried from the state committed after the previous one.

use std::collections::BTreeMap;

use bytes::Buf;
use serde_json::Value;
use tracing::{debug, warn};

use super::bits::ScanError;
use super::cursor::DecodeCursor;
use super::fallback::decode_buffered;
use super::header::{FrameKind, HeaderState, ScanHeader, SegmentOutcome};
use super::scan::{EntropyState, SequentialScan};
use crate::error::DecodeError;
use crate::format::jpeg::{has_soi, peek_segment, SegmentPeek};

/// Bytes to accumulate before attempting to parse the header, unless input
/// ends first.
pub const MIN_HEADER_BYTES: u64 = 512;

/// Rows handed to the sink per call when emitting a buffered image.
const BUFFERED_BATCH_ROWS: u32 = 16;

// =============================================================================
// Public Types
// =============================================================================

/// Decoder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderPhase {
    /// No bytes seen
    Init,
    /// Collecting header segments
    HeaderPending,
    /// Emitting scanlines
    Decoding,
    /// Every scanline emitted
    Done,
    /// A decode or sink error occurred
    Failed,
}

/// Outcome of one [`JpegDecoder::feed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// All buffered data was used; supply more
    NeedMore,
    /// Every scanline has been emitted
    Done,
    /// The sink asked to stop
    Stopped,
}

/// Returned by a sink to continue or abandon decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Header information available once the first scan begins.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    /// Stored width in pixels
    pub width: u32,
    /// Stored height in pixels
    pub height: u32,
    pub components: u8,
    pub progressive: bool,
    /// Whether scanlines are only produced at end of input
    pub buffered: bool,
    /// EXIF orientation code from the file, if any
    pub orientation: Option<u8>,
    pub properties: BTreeMap<String, Value>,
}

/// Receives decoded output.
pub trait ScanlineSink {
    type Error: From<DecodeError>;

    /// Called once, after the header and before any rows.
    fn begin(&mut self, image: &SourceImage) -> Result<(), Self::Error>;

    /// Receive `count` consecutive RGBA rows starting at stored row `first_row`.
    fn rows(&mut self, first_row: u32, count: u32, rgba: &[u8]) -> Result<Flow, Self::Error>;
}

// =============================================================================
// JpegDecoder
// =============================================================================

enum ScanMode {
    Sequential(SequentialScan),
    Buffered,
}

pub struct JpegDecoder {
    phase: DecoderPhase,
    header: HeaderState,
    mode: Option<ScanMode>,
    image: Option<SourceImage>,
    /// Consumed header bytes, replayed for buffered decoding
    prefix: Vec<u8>,
    overrun_warned: bool,
}

impl Default for JpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegDecoder {
    pub fn new() -> Self {
        Self {
            phase: DecoderPhase::Init,
            header: HeaderState::default(),
            mode: None,
            image: None,
            prefix: Vec::new(),
            overrun_warned: false,
        }
    }

    pub fn phase(&self) -> DecoderPhase {
        self.phase
    }

    /// Header information, once the first scan has started.
    pub fn image(&self) -> Option<&SourceImage> {
        self.image.as_ref()
    }

    /// Append `chunk` and decode as far as possible.
    ///
    /// # Arguments
    ///
    /// * `cursor` - Decode position; must be the same cursor on every call
    /// * `chunk` - Next compressed bytes (may be empty)
    /// * `end_of_input` - No further bytes will follow
    /// * `sink` - Receives the header and decoded rows
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] (converted into the sink's error type) for
    /// malformed or truncated data, or any error the sink raises. Either moves
    /// the decoder to [`DecoderPhase::Failed`].
    pub fn feed<S: ScanlineSink>(
        &mut self,
        cursor: &mut DecodeCursor,
        chunk: &[u8],
        end_of_input: bool,
        sink: &mut S,
    ) -> Result<Progress, S::Error> {
        match self.phase {
            DecoderPhase::Done => return Ok(Progress::Done),
            DecoderPhase::Failed => return Ok(Progress::Stopped),
            _ => {}
        }

        cursor.append(chunk);
        if self.phase == DecoderPhase::Init && cursor.received > 0 {
            self.phase = DecoderPhase::HeaderPending;
        }

        let result = self.run(cursor, end_of_input, sink);
        match &result {
            Err(_) => self.phase = DecoderPhase::Failed,
            Ok(Progress::Done) => self.phase = DecoderPhase::Done,
            Ok(_) => {}
        }
        result
    }

    fn run<S: ScanlineSink>(
        &mut self,
        cursor: &mut DecodeCursor,
        end: bool,
        sink: &mut S,
    ) -> Result<Progress, S::Error> {
        if matches!(self.phase, DecoderPhase::Init | DecoderPhase::HeaderPending) {
            if !end && cursor.received < MIN_HEADER_BYTES {
                return Ok(Progress::NeedMore);
            }
            if !self.read_header(cursor)? {
                if end {
                    return Err(DecodeError::MissingHeader {
                        received: cursor.received,
                    }
                    .into());
                }
                return Ok(Progress::NeedMore);
            }
            self.phase = DecoderPhase::Decoding;
            if let Some(image) = &self.image {
                sink.begin(image)?;
            }
        }

        let (width, height) = self
            .image
            .as_ref()
            .map_or((0, 0), |image| (image.width, image.height));

        match self.mode.as_mut() {
            Some(ScanMode::Sequential(scan)) => {
                decode_sequential(scan, cursor, height, end, &mut self.overrun_warned, sink)
            }
            Some(ScanMode::Buffered) => {
                decode_whole(&mut self.prefix, cursor, width, height, end, sink)
            }
            None => Ok(Progress::NeedMore),
        }
    }

    /// Consume header segments. Returns true once the first scan has started.
    fn read_header(&mut self, cursor: &mut DecodeCursor) -> Result<bool, DecodeError> {
        if !cursor.soi_seen {
            if cursor.buffer.len() < 2 {
                return Ok(false);
            }
            if !has_soi(&cursor.buffer) {
                return Err(DecodeError::NotJpeg(cursor.buffer[0], cursor.buffer[1]));
            }
            self.prefix.extend_from_slice(&cursor.buffer[..2]);
            cursor.buffer.advance(2);
            cursor.soi_seen = true;
        }

        loop {
            match peek_segment(&cursor.buffer, 0) {
                SegmentPeek::Incomplete => return Ok(false),
                SegmentPeek::NotMarker(_) => {
                    let skip = cursor.buffer[1..]
                        .iter()
                        .position(|&b| b == 0xFF)
                        .map_or(cursor.buffer.len(), |p| p + 1);
                    warn!(bytes = skip, "Skipping extraneous bytes between JPEG segments");
                    cursor.buffer.advance(skip);
                }
                SegmentPeek::Segment {
                    marker,
                    payload: (start, end),
                    next,
                } => {
                    let outcome = self.header.apply(marker, &cursor.buffer[start..end])?;
                    self.prefix.extend_from_slice(&cursor.buffer[..next]);
                    cursor.buffer.advance(next);

                    match outcome {
                        SegmentOutcome::Continue => {}
                        SegmentOutcome::EndOfImage => {
                            return Err(DecodeError::InvalidSegment {
                                segment: "EOI",
                                message: "end of image before first scan".into(),
                            })
                        }
                        SegmentOutcome::StartOfScan(scan) => {
                            self.start_scan(&scan, cursor)?;
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }

    fn start_scan(&mut self, scan: &ScanHeader, cursor: &mut DecodeCursor) -> Result<(), DecodeError> {
        let frame = self
            .header
            .frame
            .as_ref()
            .ok_or_else(|| DecodeError::InvalidSegment {
                segment: "SOS",
                message: "scan before frame header".into(),
            })?;
        let model = self.header.color_model();

        let sequential = matches!(
            frame.kind,
            FrameKind::Baseline | FrameKind::ExtendedSequential
        ) && frame.precision == 8
            && scan.is_single_pass(frame);

        let mode = match (model, frame.kind) {
            (_, FrameKind::Other(code)) => {
                return Err(DecodeError::Unsupported {
                    reason: format!("SOF{} frames", code - 0xC0),
                });
            }
            (Some(model), _) if sequential => {
                let decoder = SequentialScan::new(frame, &self.header, scan, model)?;
                cursor.entropy = EntropyState::new(self.header.restart_interval);
                cursor.planes = decoder.new_planes();
                cursor.mcu_x = 0;
                ScanMode::Sequential(decoder)
            }
            _ => ScanMode::Buffered,
        };

        let color_model = match (model, frame.components.len()) {
            (Some(model), _) => model.as_str(),
            (None, 4) => "CMYK",
            (None, _) => "Unknown",
        };

        let mut properties = self.header.properties.clone();
        properties.insert("ColorModel".into(), Value::from(color_model));
        if self.header.restart_interval > 0 {
            properties.insert(
                "RestartInterval".into(),
                Value::from(self.header.restart_interval),
            );
        }

        let buffered = matches!(mode, ScanMode::Buffered);
        let image = SourceImage {
            width: frame.width,
            height: frame.height,
            components: frame.components.len() as u8,
            progressive: frame.kind == FrameKind::Progressive,
            buffered,
            orientation: self.header.orientation,
            properties,
        };

        debug!(
            width = image.width,
            height = image.height,
            components = image.components,
            progressive = image.progressive,
            buffered,
            "Decoding first scan"
        );
        if buffered {
            debug!("Stream is not single-pass sequential; buffering until end of input");
        } else {
            self.prefix = Vec::new();
        }

        self.mode = Some(mode);
        self.image = Some(image);
        Ok(())
    }
}

// =============================================================================
// Scan Drivers
// =============================================================================

fn decode_sequential<S: ScanlineSink>(
    scan: &mut SequentialScan,
    cursor: &mut DecodeCursor,
    height: u32,
    end: bool,
    overrun_warned: &mut bool,
    sink: &mut S,
) -> Result<Progress, S::Error> {
    let truncated = |decoded: u32| DecodeError::Truncated {
        decoded,
        expected: height,
    };

    while cursor.rows_emitted < height {
        match scan.decode_row(cursor, end) {
            Err(ScanError::Suspend) => {
                if end {
                    return Err(truncated(cursor.rows_emitted).into());
                }
                return Ok(Progress::NeedMore);
            }
            Err(ScanError::Corrupt(message)) => {
                return Err(DecodeError::CorruptData {
                    row: cursor.rows_emitted,
                    message,
                }
                .into());
            }
            Ok(()) => {
                if cursor.entropy.overrun() && !*overrun_warned {
                    warn!(
                        row = cursor.rows_emitted,
                        "Entropy-coded data ended early; padding with zeros"
                    );
                    *overrun_warned = true;
                }

                let first = cursor.rows_emitted;
                let count = scan.mcu_height().min(height - first);
                cursor.rows_emitted += count;

                let rgba = scan.rgba_rows(&cursor.planes, count as usize);
                if sink.rows(first, count, rgba)? == Flow::Stop {
                    return Ok(Progress::Stopped);
                }
            }
        }
    }
    Ok(Progress::Done)
}

fn decode_whole<S: ScanlineSink>(
    prefix: &mut Vec<u8>,
    cursor: &mut DecodeCursor,
    width: u32,
    height: u32,
    end: bool,
    sink: &mut S,
) -> Result<Progress, S::Error> {
    if !end {
        return Ok(Progress::NeedMore);
    }

    let mut data = std::mem::take(prefix);
    data.extend_from_slice(&cursor.buffer);
    cursor.buffer.clear();

    let image = decode_buffered(&data)?;
    if image.dimensions() != (width, height) {
        return Err(DecodeError::Fallback {
            message: format!(
                "decoded {}x{}, header declared {width}x{height}",
                image.width(),
                image.height()
            ),
        }
        .into());
    }

    let stride = width as usize * 4;
    let raw = image.as_raw();
    while cursor.rows_emitted < height {
        let first = cursor.rows_emitted;
        let count = BUFFERED_BATCH_ROWS.min(height - first);
        cursor.rows_emitted += count;

        let rows = &raw[first as usize * stride..(first + count) as usize * stride];
        if sink.rows(first, count, rows)? == Flow::Stop {
            return Ok(Progress::Stopped);
        }
    }
    Ok(Progress::Done)
}

// =============================================================================
// Tests
// =============================================================================
