//! EXIF orientation transforms.
//!
//! Cameras store pixels in sensor order and record how the picture should be
//! turned for display. The eight codes are:
//!
//! ```text
//!   1        2       3      4         5            6           7          8
//!
//! 888888  888888      88  88      8888888888  88                  88  8888888888
//! 88          88      88  88      88  88      88  88          88  88      88  88
//! 8888      8888    8888  8888    88          8888888888  8888888888          88
//! 88          88      88  88
//! 88          88  888888  888888
//! ```
//!
//! Codes 5-8 swap the image axes. The tile pyramid is always laid out in display
//! orientation, so the compositor maps every source pixel through
//! [`Orientation::to_display`].

use std::fmt;

/// One of the eight EXIF orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// 1: stored as displayed
    #[default]
    Identity,
    /// 2: mirrored left-right
    MirrorHorizontal,
    /// 3: rotated 180°
    Rotate180,
    /// 4: mirrored top-bottom
    MirrorVertical,
    /// 5: mirrored along the main diagonal
    Transpose,
    /// 6: needs a 90° clockwise turn
    Rotate90,
    /// 7: mirrored along the anti-diagonal
    Transverse,
    /// 8: needs a 90° counter-clockwise turn
    Rotate270,
}

/// All orientations in EXIF code order.
pub const ALL_ORIENTATIONS: [Orientation; 8] = [
    Orientation::Identity,
    Orientation::MirrorHorizontal,
    Orientation::Rotate180,
    Orientation::MirrorVertical,
    Orientation::Transpose,
    Orientation::Rotate90,
    Orientation::Transverse,
    Orientation::Rotate270,
];

impl Orientation {
    /// Orientation for an EXIF code; `None` outside 1-8.
    pub fn from_code(code: u8) -> Option<Self> {
        ALL_ORIENTATIONS.get((code as usize).wrapping_sub(1)).copied()
    }

    /// The EXIF code (1-8).
    pub fn code(self) -> u8 {
        match self {
            Orientation::Identity => 1,
            Orientation::MirrorHorizontal => 2,
            Orientation::Rotate180 => 3,
            Orientation::MirrorVertical => 4,
            Orientation::Transpose => 5,
            Orientation::Rotate90 => 6,
            Orientation::Transverse => 7,
            Orientation::Rotate270 => 8,
        }
    }

    /// Resolve a configured override against the code found in the file.
    ///
    /// An override of 0 means "use the file's value"; files without an
    /// orientation tag are treated as code 1. Out-of-range values fall back to
    /// identity.
    pub fn resolve(override_code: u8, embedded: Option<u8>) -> Self {
        let code = if override_code == 0 {
            embedded.unwrap_or(1)
        } else {
            override_code
        };
        Self::from_code(code).unwrap_or_default()
    }

    /// Whether display width and height are swapped relative to storage.
    #[inline]
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }

    /// Display size for a stored image of `width` x `height`.
    #[inline]
    pub fn display_size(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map a stored pixel to display coordinates.
    ///
    /// `width` and `height` are the stored dimensions.
    #[inline]
    pub fn to_display(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        let (w1, h1) = (width - 1, height - 1);
        match self {
            Orientation::Identity => (x, y),
            Orientation::MirrorHorizontal => (w1 - x, y),
            Orientation::Rotate180 => (w1 - x, h1 - y),
            Orientation::MirrorVertical => (x, h1 - y),
            Orientation::Transpose => (y, x),
            Orientation::Rotate90 => (h1 - y, x),
            Orientation::Transverse => (h1 - y, w1 - x),
            Orientation::Rotate270 => (y, w1 - x),
        }
    }

    /// Map a display pixel back to stored coordinates.
    ///
    /// `width` and `height` are the stored dimensions.
    #[inline]
    pub fn to_stored(self, dx: u32, dy: u32, width: u32, height: u32) -> (u32, u32) {
        let (w1, h1) = (width - 1, height - 1);
        match self {
            Orientation::Identity => (dx, dy),
            Orientation::MirrorHorizontal => (w1 - dx, dy),
            Orientation::Rotate180 => (w1 - dx, h1 - dy),
            Orientation::MirrorVertical => (dx, h1 - dy),
            Orientation::Transpose => (dy, dx),
            Orientation::Rotate90 => (dy, h1 - dx),
            Orientation::Transverse => (w1 - dy, h1 - dx),
            Orientation::Rotate270 => (w1 - dy, dx),
        }
    }

    /// The orientation that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Orientation::Rotate90 => Orientation::Rotate270,
            Orientation::Rotate270 => Orientation::Rotate90,
            other => other,
        }
    }

    /// Whether source row order maps onto display rows top-down, bottom-up, or
    /// onto display columns.
    pub fn row_flow(self) -> RowFlow {
        match self {
            Orientation::Identity | Orientation::MirrorHorizontal => RowFlow::TopDown,
            Orientation::Rotate180 | Orientation::MirrorVertical => RowFlow::BottomUp,
            _ => RowFlow::Columns,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Where successive stored scanlines land in display space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFlow {
    /// Stored row `y` is display row `y`
    TopDown,
    /// Stored row `y` is display row `height - 1 - y`
    BottomUp,
    /// Stored rows become display columns
    Columns,
}

// =============================================================================
// Tests
// =============================================================================
