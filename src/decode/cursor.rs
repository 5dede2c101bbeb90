//! Resumable decode position.

use std::fmt;

use bytes::BytesMut;

use super::scan::EntropyState;

/// Everything the decoder needs to pick up where the previous chunk left off.
///
/// The cursor owns the bytes that have been received but not yet consumed,
/// together with the scan position: the entropy state after the last whole
/// MCU, the next MCU column of the current row, and that row's partly filled
/// component planes. Bytes leave `buffer` as soon as the MCU that uses them
/// has decoded, so partially consumed input is never decoded twice.
#[derive(Default)]
pub struct DecodeCursor {
    pub(crate) buffer: BytesMut,
    pub(crate) received: u64,
    pub(crate) rows_emitted: u32,
    pub(crate) soi_seen: bool,
    pub(crate) entropy: EntropyState,
    /// Next MCU column of the current MCU row
    pub(crate) mcu_x: usize,
    /// Component samples of the current MCU row
    pub(crate) planes: Vec<Vec<u8>>,
    pub(crate) retried_bytes: u64,
}

impl DecodeCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes supplied so far.
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    /// Bytes held back waiting for more input.
    pub fn bytes_buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Scanlines fully decoded and handed on.
    pub fn rows_emitted(&self) -> u32 {
        self.rows_emitted
    }

    /// Bytes read by MCUs that ran out of input and had to start over.
    ///
    /// At most one MCU is retried per chunk.
    pub fn retried_bytes(&self) -> u64 {
        self.retried_bytes
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.received += chunk.len() as u64;
    }
}

impl fmt::Debug for DecodeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeCursor")
            .field("buffered", &self.buffer.len())
            .field("received", &self.received)
            .field("rows_emitted", &self.rows_emitted)
            .field("mcu_x", &self.mcu_x)
            .field("entropy", &self.entropy)
            .field("retried_bytes", &self.retried_bytes)
            .finish()
    }
}
