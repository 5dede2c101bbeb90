//! Write backpressure against system memory.
//!
//! Tile writes land in the page cache (or in mapped pages) long before they
//! reach disk. Every builder adds its written bytes to one process-wide
//! counter; when the counter passes a fraction of currently available memory,
//! the builder that crossed the line flushes its own stores and withdraws its
//! contribution.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use sysinfo::System;
use tracing::{debug, warn};

use crate::error::IoError;

/// Default fraction of available memory that may be unflushed.
pub const DEFAULT_FLUSH_THRESHOLD: f32 = 0.5;

/// Minimum interval between system memory samples.
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

// =============================================================================
// OutstandingWrites
// =============================================================================

/// Bytes written but not yet flushed, shared by all builders in a process.
#[derive(Debug)]
pub struct OutstandingWrites {
    bytes: AtomicU64,
    /// `f32` threshold fraction stored as bits
    threshold: AtomicU32,
}

impl Default for OutstandingWrites {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl OutstandingWrites {
    pub fn new(threshold: f32) -> Self {
        Self {
            bytes: AtomicU64::new(0),
            threshold: AtomicU32::new(threshold.to_bits()),
        }
    }

    /// The process-wide counter.
    pub fn global() -> Arc<OutstandingWrites> {
        static GLOBAL: OnceLock<Arc<OutstandingWrites>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(OutstandingWrites::default())).clone()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> f32 {
        f32::from_bits(self.threshold.load(Ordering::Relaxed))
    }

    /// Set the threshold fraction. Values outside `(0, 1]` are ignored.
    pub fn set_threshold(&self, fraction: f32) -> bool {
        if fraction.is_finite() && fraction > 0.0 && fraction <= 1.0 {
            self.threshold.store(fraction.to_bits(), Ordering::Relaxed);
            true
        } else {
            warn!(fraction, "Ignoring flush threshold outside (0, 1]");
            false
        }
    }

    fn add(&self, bytes: u64) -> u64 {
        self.bytes.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    fn release(&self, bytes: u64) {
        // Saturate rather than wrap if contributions were miscounted
        let _ = self
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

/// Set the process-wide flush threshold fraction.
pub fn set_flush_threshold(fraction: f32) -> bool {
    OutstandingWrites::global().set_threshold(fraction)
}

/// Current process-wide flush threshold fraction.
pub fn flush_threshold() -> f32 {
    OutstandingWrites::global().threshold()
}

// =============================================================================
// MemoryProbe
// =============================================================================

/// Source of the "currently available memory" figure.
pub trait MemoryProbe: Send {
    fn available_bytes(&mut self) -> u64;
}

/// Available memory as reported by the operating system.
pub struct SystemMemory {
    system: System,
    sampled: Option<(Instant, u64)>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            sampled: None,
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn available_bytes(&mut self) -> u64 {
        if let Some((at, bytes)) = self.sampled {
            if at.elapsed() < MEMORY_SAMPLE_INTERVAL {
                return bytes;
            }
        }

        self.system.refresh_memory();
        let mut bytes = self.system.available_memory();
        if bytes == 0 {
            // Some platforms only report free or total memory
            bytes = self.system.free_memory().max(self.system.total_memory() / 4);
        }
        self.sampled = Some((Instant::now(), bytes));
        bytes
    }
}

/// A constant memory figure.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn available_bytes(&mut self) -> u64 {
        self.0
    }
}

// =============================================================================
// BackpressureController
// =============================================================================

/// Per-builder view of the outstanding-write counter.
pub struct BackpressureController {
    counter: Arc<OutstandingWrites>,
    probe: Box<dyn MemoryProbe>,
    contribution: u64,
    flushes: u64,
}

impl BackpressureController {
    /// Controller on the process-wide counter with system memory.
    pub fn new() -> Self {
        Self::with_probe(OutstandingWrites::global(), Box::new(SystemMemory::new()))
    }

    pub fn with_probe(counter: Arc<OutstandingWrites>, probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            counter,
            probe,
            contribution: 0,
            flushes: 0,
        }
    }

    /// Account for `bytes` just written, flushing if the shared limit is
    /// exceeded.
    ///
    /// `flush` must push all of this builder's outstanding writes to stable
    /// storage. Returns whether a flush happened.
    ///
    /// # Errors
    ///
    /// Returns the flush error; the contribution is kept in that case.
    pub fn record_write<F>(&mut self, bytes: u64, flush: F) -> Result<bool, IoError>
    where
        F: FnOnce() -> Result<(), IoError>,
    {
        self.contribution += bytes;
        let outstanding = self.counter.add(bytes);

        let available = self.probe.available_bytes();
        let limit = (available as f64 * self.counter.threshold() as f64) as u64;
        if outstanding <= limit {
            return Ok(false);
        }

        debug!(
            outstanding,
            limit,
            contribution = self.contribution,
            "Outstanding writes over limit; flushing"
        );
        flush()?;
        self.counter.release(self.contribution);
        self.contribution = 0;
        self.flushes += 1;
        Ok(true)
    }

    /// Withdraw this builder's contribution after a final flush or teardown.
    pub fn release(&mut self) {
        self.counter.release(self.contribution);
        self.contribution = 0;
    }

    /// Bytes this builder has written since its last flush.
    pub fn contribution(&self) -> u64 {
        self.contribution
    }

    /// Number of pressure-triggered flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackpressureController {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
