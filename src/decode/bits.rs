//! Entropy-coded segment bit reader.
//!
//! The reader works over whatever bytes are buffered right now. Running out of
//! input is not an error: [`ScanError::Suspend`] tells the caller to roll back
//! to its last committed [`BitState`] and retry once more bytes arrive. Only
//! when a marker has been reached, or the input is known to be complete, does
//! the reader pad with zero bits the way libjpeg does.

use crate::format::jpeg::{is_restart, RST0};

/// Why a scan step could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScanError {
    /// Not enough buffered data; retry with more.
    Suspend,
    /// The entropy-coded data is invalid.
    Corrupt(String),
}

/// Bit accumulator state carried between MCU rows.
///
/// Bits are left-aligned in `acc`. Zero bits injected past the end of real
/// data sit at the tail and are counted by `pad_bits`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitState {
    acc: u64,
    nbits: u32,
    pad_bits: u32,
    marker_hit: bool,
    overrun: bool,
}

impl BitState {
    /// Whether decoding has consumed padding bits, i.e. read past real data.
    pub fn overrun(&self) -> bool {
        self.overrun
    }

    /// Whether the reader stopped at a marker.
    pub fn marker_hit(&self) -> bool {
        self.marker_hit
    }
}

pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    state: BitState,
    at_end: bool,
}

impl<'a> BitReader<'a> {
    /// Resume reading `data` from its start with a previously committed state.
    pub fn resume(data: &'a [u8], state: BitState, at_end: bool) -> Self {
        Self {
            data,
            pos: 0,
            state,
            at_end,
        }
    }

    /// Bytes of `data` consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn state(&self) -> BitState {
        self.state
    }

    #[inline]
    fn push_byte(&mut self, byte: u8) {
        self.state.acc |= (byte as u64) << (56 - self.state.nbits);
        self.state.nbits += 8;
    }

    #[inline]
    fn push_padding(&mut self) {
        self.state.nbits += 8;
        self.state.pad_bits += 8;
    }

    fn fill(&mut self) {
        while self.state.nbits <= 56 {
            if self.state.marker_hit {
                self.push_padding();
                continue;
            }
            if self.pos >= self.data.len() {
                if self.at_end {
                    self.push_padding();
                    continue;
                }
                break;
            }

            let byte = self.data[self.pos];
            if byte != 0xFF {
                self.pos += 1;
                self.push_byte(byte);
                continue;
            }

            if self.pos + 1 >= self.data.len() {
                if self.at_end {
                    // Dangling 0xFF at the very end of input
                    self.state.marker_hit = true;
                    continue;
                }
                break;
            }

            match self.data[self.pos + 1] {
                0x00 => {
                    self.pos += 2;
                    self.push_byte(0xFF);
                }
                0xFF => {
                    // Fill byte ahead of a marker
                    self.pos += 1;
                }
                _ => {
                    self.state.marker_hit = true;
                }
            }
        }
    }

    /// Make at least `n` (<= 57) bits available.
    #[inline]
    pub fn ensure(&mut self, n: u32) -> Result<(), ScanError> {
        if self.state.nbits < n {
            self.fill();
            if self.state.nbits < n {
                return Err(ScanError::Suspend);
            }
        }
        Ok(())
    }

    /// Look at the next `n` (1..=16) bits without consuming them. Callers must
    /// `ensure` first.
    #[inline]
    pub fn peek(&self, n: u32) -> u32 {
        (self.state.acc >> (64 - n)) as u32
    }

    #[inline]
    pub fn consume(&mut self, n: u32) {
        self.state.acc <<= n;
        self.state.nbits -= n;
        if self.state.nbits < self.state.pad_bits {
            self.state.overrun = true;
            self.state.pad_bits = self.state.nbits;
        }
    }

    pub fn get_bits(&mut self, n: u32) -> Result<u32, ScanError> {
        if n == 0 {
            return Ok(0);
        }
        self.ensure(n)?;
        let value = self.peek(n);
        self.consume(n);
        Ok(value)
    }

    /// Read an `n`-bit magnitude and sign-extend it (JPEG `RECEIVE` + `EXTEND`).
    pub fn receive_extend(&mut self, n: u32) -> Result<i32, ScanError> {
        if n == 0 {
            return Ok(0);
        }
        if n > 16 {
            return Err(ScanError::Corrupt(format!("coefficient size {n} exceeds 16 bits")));
        }
        let value = self.get_bits(n)? as i32;
        if value < (1 << (n - 1)) {
            Ok(value - (1 << n) + 1)
        } else {
            Ok(value)
        }
    }

    /// Discard remaining bits and consume the restart marker `RST0 + index`.
    pub fn read_restart(&mut self, index: u8) -> Result<(), ScanError> {
        let mut pos = self.pos;
        while pos < self.data.len() && self.data[pos] == 0xFF {
            pos += 1;
        }
        if pos >= self.data.len() {
            return Err(ScanError::Suspend);
        }
        if pos == self.pos {
            return Err(ScanError::Corrupt(format!(
                "expected RST{index} marker at restart boundary"
            )));
        }

        let marker = self.data[pos];
        if !is_restart(marker) || marker - RST0 != index {
            return Err(ScanError::Corrupt(format!(
                "expected RST{index}, found marker {marker:02X}"
            )));
        }

        self.pos = pos + 1;
        self.state = BitState::default();
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
