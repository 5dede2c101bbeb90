//! Sequential (baseline and extended) scan decoding.
//!
//! MCUs are decoded left to right into the component planes held by the
//! [`DecodeCursor`]. The cursor is committed after every MCU, so input that
//! stops mid-row resumes at the first unfinished MCU. Once a row of MCUs is
//! complete it is converted to RGBA scanlines.

use bytes::Buf;

use super::bits::{BitReader, BitState, ScanError};
use super::color::{convert_rows, ColorModel, PlaneView};
use super::cursor::DecodeCursor;
use super::header::{Frame, HeaderState, ScanHeader};
use super::huffman::HuffmanTable;
use super::idct::{idct_block, ZIGZAG};
use crate::error::DecodeError;

/// Entropy decoder state that must survive between MCUs.
///
/// Each MCU is decoded against a copy, which replaces the committed state
/// only once the whole MCU has decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntropyState {
    pub(crate) bits: BitState,
    pub(crate) dc_pred: [i32; 4],
    /// MCUs left before the next restart marker
    pub(crate) restarts_left: u32,
    /// Index (0-7) of the next expected RSTn
    pub(crate) next_restart: u8,
}

impl EntropyState {
    pub(crate) fn new(restart_interval: u16) -> Self {
        Self {
            restarts_left: restart_interval as u32,
            ..Self::default()
        }
    }

    /// Whether a committed MCU had to read past the end of real data.
    pub fn overrun(&self) -> bool {
        self.bits.overrun()
    }
}

struct ScanComponent {
    h: usize,
    v: usize,
    quant: [u16; 64],
    dc: HuffmanTable,
    ac: HuffmanTable,
    /// Width of this component's plane in samples
    stride: usize,
}

pub(crate) struct SequentialScan {
    components: Vec<ScanComponent>,
    model: ColorModel,
    width: usize,
    max_h: usize,
    max_v: usize,
    mcus_x: usize,
    restart_interval: u32,
    rgba: Vec<u8>,
}

impl SequentialScan {
    pub fn new(
        frame: &Frame,
        header: &HeaderState,
        scan: &ScanHeader,
        model: ColorModel,
    ) -> Result<Self, DecodeError> {
        let missing = |what: String| DecodeError::InvalidSegment {
            segment: "SOS",
            message: format!("missing {what}"),
        };

        let width = frame.width as usize;
        let mcus_x = width.div_ceil(8 * frame.max_h);

        let mut components = Vec::with_capacity(scan.components.len());
        for &(index, dc, ac) in &scan.components {
            let frame_component = &frame.components[index];
            let quant = header.quant[frame_component.tq]
                .ok_or_else(|| missing(format!("quantization table {}", frame_component.tq)))?;
            let dc = header.dc_tables[dc]
                .clone()
                .ok_or_else(|| missing(format!("DC table {dc}")))?;
            let ac = header.ac_tables[ac]
                .clone()
                .ok_or_else(|| missing(format!("AC table {ac}")))?;

            let stride = mcus_x * frame_component.h * 8;
            components.push(ScanComponent {
                h: frame_component.h,
                v: frame_component.v,
                quant,
                dc,
                ac,
                stride,
            });
        }

        Ok(Self {
            components,
            model,
            width,
            max_h: frame.max_h,
            max_v: frame.max_v,
            mcus_x,
            restart_interval: header.restart_interval as u32,
            rgba: vec![0; width * frame.max_v * 8 * 4],
        })
    }

    /// Output rows produced by one MCU row.
    pub fn mcu_height(&self) -> u32 {
        (self.max_v * 8) as u32
    }

    /// Fresh sample planes for one MCU row, `stride` x `v * 8` per component.
    pub fn new_planes(&self) -> Vec<Vec<u8>> {
        self.components
            .iter()
            .map(|c| vec![0; c.stride * c.v * 8])
            .collect()
    }

    /// Decode the remaining MCUs of the current row from `cursor.buffer`.
    ///
    /// The cursor is committed after every MCU: its bytes leave the buffer,
    /// the entropy state advances and `cursor.mcu_x` moves on. Returns
    /// `Ok(())` once the row is complete, with its samples in
    /// `cursor.planes`.
    ///
    /// # Errors
    ///
    /// [`ScanError::Suspend`] when input runs out inside an MCU. Everything
    /// up to the last whole MCU stays committed and the unfinished MCU is
    /// decoded again from its first byte on the next call.
    pub fn decode_row(&self, cursor: &mut DecodeCursor, at_end: bool) -> Result<(), ScanError> {
        let DecodeCursor {
            buffer,
            entropy,
            planes,
            mcu_x,
            retried_bytes,
            ..
        } = cursor;
        let mut coeffs = [0i32; 64];

        while *mcu_x < self.mcus_x {
            let mut st = *entropy;
            let mut reader = BitReader::resume(&buffer[..], st.bits, at_end);
            let result = self.decode_mcu(&mut reader, &mut st, *mcu_x, planes, &mut coeffs);
            let consumed = reader.position();
            st.bits = reader.state();

            // Zero padding past the last byte without a marker means the
            // stream stopped inside this MCU
            let starved = result.is_ok() && st.overrun() && !st.bits.marker_hit();
            if let Err(e) = result {
                *retried_bytes += consumed as u64;
                return Err(e);
            }
            if starved {
                *retried_bytes += consumed as u64;
                return Err(ScanError::Suspend);
            }

            *entropy = st;
            buffer.advance(consumed);
            *mcu_x += 1;
        }

        *mcu_x = 0;
        Ok(())
    }

    fn decode_mcu(
        &self,
        reader: &mut BitReader<'_>,
        st: &mut EntropyState,
        mcu_x: usize,
        planes: &mut [Vec<u8>],
        coeffs: &mut [i32; 64],
    ) -> Result<(), ScanError> {
        if self.restart_interval > 0 {
            if st.restarts_left == 0 {
                reader.read_restart(st.next_restart)?;
                st.next_restart = (st.next_restart + 1) & 7;
                st.restarts_left = self.restart_interval;
                st.dc_pred = [0; 4];
            }
            st.restarts_left -= 1;
        }

        for (ci, (comp, plane)) in self.components.iter().zip(planes.iter_mut()).enumerate() {
            for by in 0..comp.v {
                for bx in 0..comp.h {
                    decode_block(
                        reader,
                        &comp.dc,
                        &comp.ac,
                        &comp.quant,
                        &mut st.dc_pred[ci],
                        coeffs,
                    )?;
                    let offset = by * 8 * comp.stride + (mcu_x * comp.h + bx) * 8;
                    idct_block(coeffs, plane, offset, comp.stride);
                }
            }
        }
        Ok(())
    }

    /// Convert the first `rows` lines of a completed MCU row to RGBA.
    pub fn rgba_rows(&mut self, planes: &[Vec<u8>], rows: usize) -> &[u8] {
        let views: Vec<PlaneView<'_>> = self
            .components
            .iter()
            .zip(planes)
            .map(|(c, samples)| PlaneView {
                samples,
                stride: c.stride,
                h: c.h,
                v: c.v,
            })
            .collect();
        convert_rows(
            self.model,
            &views,
            self.max_h,
            self.max_v,
            self.width,
            rows,
            &mut self.rgba,
        );
        &self.rgba[..rows * self.width * 4]
    }
}

fn decode_block(
    reader: &mut BitReader<'_>,
    dc: &HuffmanTable,
    ac: &HuffmanTable,
    quant: &[u16; 64],
    pred: &mut i32,
    coeffs: &mut [i32; 64],
) -> Result<(), ScanError> {
    coeffs.fill(0);

    let size = dc.decode(reader)?;
    if size > 11 {
        return Err(ScanError::Corrupt(format!("DC difference size {size}")));
    }
    *pred += reader.receive_extend(size as u32)?;
    coeffs[0] = *pred * quant[0] as i32;

    let mut k = 1usize;
    while k < 64 {
        let rs = ac.decode(reader)?;
        let run = (rs >> 4) as usize;
        let size = (rs & 0x0F) as u32;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            break;
        }
        k += run;
        if k > 63 {
            return Err(ScanError::Corrupt("AC coefficient index past 63".into()));
        }
        coeffs[ZIGZAG[k]] = reader.receive_extend(size)? * quant[k] as i32;
        k += 1;
    }
    Ok(())
}
