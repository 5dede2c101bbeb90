//! Canonical Huffman tables (JPEG Annex C).
//!
//! Codes up to [`LOOKAHEAD`] bits long are resolved with a single table
//! lookup; longer codes fall back to the `maxcode`/`valoffset` walk from
//! Annex F.

use super::bits::{BitReader, ScanError};
use crate::error::DecodeError;

/// Bits resolved by the fast lookup table.
const LOOKAHEAD: u32 = 9;

#[derive(Debug, Clone)]
pub struct HuffmanTable {
    /// `(length << 8) | symbol` for every 9-bit prefix; 0 means "longer code"
    lookup: Vec<u16>,
    /// Largest code of each length, or -1 if no codes of that length
    maxcode: [i32; 17],
    /// Symbol index minus code value, per length
    valoffset: [i32; 17],
    symbols: Vec<u8>,
}

impl HuffmanTable {
    /// Build a table from the 16 code-length counts and the symbol list of a
    /// DHT segment.
    pub fn new(counts: &[u8; 16], symbols: &[u8]) -> Result<Self, DecodeError> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total != symbols.len() || total > 256 {
            return Err(DecodeError::InvalidSegment {
                segment: "DHT",
                message: format!("{} symbols declared, {} present", total, symbols.len()),
            });
        }

        let mut lookup = vec![0u16; 1 << LOOKAHEAD];
        let mut maxcode = [-1i32; 17];
        let mut valoffset = [0i32; 17];

        let mut code: u32 = 0;
        let mut k = 0usize;
        for len in 1..=16u32 {
            let n = counts[len as usize - 1] as usize;
            valoffset[len as usize] = k as i32 - code as i32;

            for _ in 0..n {
                if code >= (1 << len) {
                    return Err(DecodeError::InvalidSegment {
                        segment: "DHT",
                        message: format!("code lengths overflow at length {len}"),
                    });
                }
                if len <= LOOKAHEAD {
                    let shift = LOOKAHEAD - len;
                    let base = (code << shift) as usize;
                    let entry = ((len as u16) << 8) | symbols[k] as u16;
                    for slot in &mut lookup[base..base + (1 << shift)] {
                        *slot = entry;
                    }
                }
                code += 1;
                k += 1;
            }

            if n > 0 {
                maxcode[len as usize] = code as i32 - 1;
            }
            code <<= 1;
        }

        Ok(Self {
            lookup,
            maxcode,
            valoffset,
            symbols: symbols.to_vec(),
        })
    }

    /// Decode one symbol.
    #[inline]
    pub(crate) fn decode(&self, reader: &mut BitReader<'_>) -> Result<u8, ScanError> {
        reader.ensure(16)?;

        let entry = self.lookup[reader.peek(LOOKAHEAD) as usize];
        if entry != 0 {
            reader.consume((entry >> 8) as u32);
            return Ok(entry as u8);
        }

        let bits = reader.peek(16);
        for len in (LOOKAHEAD + 1)..=16 {
            let code = (bits >> (16 - len)) as i32;
            if code <= self.maxcode[len as usize] {
                reader.consume(len);
                let index = (code + self.valoffset[len as usize]) as usize;
                return self
                    .symbols
                    .get(index)
                    .copied()
                    .ok_or_else(|| ScanError::Corrupt("Huffman symbol index out of range".into()));
            }
        }

        Err(ScanError::Corrupt("invalid Huffman code".into()))
    }
}

// =============================================================================
// Tests
// =============================================================================
