//! Compressed input.
//!
//! A [`ByteSource`] yields the JPEG stream chunk by chunk, from a file, a
//! channel fed by a network task, or memory. [`pump_source`] drives a
//! background builder from any source.

mod source;

pub use source::{
    pump_source, ByteSource, ChannelSource, FileSource, MemorySource, DEFAULT_CHUNK_SIZE,
};
