//! JPEG container parsing.
//!
//! This module holds the pieces of JPEG handling that are about the file
//! structure rather than pixel decoding:
//!
//! - [`jpeg`]: marker codes and incremental segment framing
//! - [`exif`]: orientation and descriptive tags from APP1 segments
//! - [`orientation`]: the eight EXIF coordinate transforms

pub mod exif;
pub mod jpeg;
pub mod orientation;

pub use exif::{parse_exif, ByteOrder, ExifData};
pub use jpeg::{has_soi, marker_name, peek_segment, SegmentPeek};
pub use orientation::{Orientation, RowFlow, ALL_ORIENTATIONS};
