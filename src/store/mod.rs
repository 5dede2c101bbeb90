//! Disk-backed tile storage.
//!
//! Each pyramid level lives in its own file, accessed through a
//! [`TileBackend`]: either a writable memory map or positioned reads and
//! writes. The choice is a runtime policy; both return identical bytes.
//!
//! Writes are accounted against a process-wide budget by the
//! [`BackpressureController`], which forces a synchronous flush when unflushed
//! data grows past a fraction of available memory.

pub mod backend;
pub mod backpressure;
pub mod pyramid_store;
pub mod tile_store;

pub use backend::{open_backend, MmapBackend, PreadBackend, StoreBackend, TileBackend};
pub use backpressure::{
    flush_threshold, set_flush_threshold, BackpressureController, FixedMemory, MemoryProbe,
    OutstandingWrites, SystemMemory, DEFAULT_FLUSH_THRESHOLD,
};
pub use pyramid_store::PyramidStore;
pub use tile_store::{align_to_map, TileStore, MAP_ALIGNMENT};
