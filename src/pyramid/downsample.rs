//! 2x2 box reduction of parent tiles.
//!
//! A child tile at (`c`, `r`) covers the parent tiles (2c, 2r), (2c+1, 2r),
//! (2c, 2r+1) and (2c+1, 2r+1):
//!
//! ```text
//!   parent level                child level
//! ┌────────┬────────┐
//! │ 0: TL  │ 1: TR  │          ┌────────┐
//! ├────────┼────────┤   ──►    │ (c, r) │
//! │ 2: BL  │ 3: BR  │          └────────┘
//! └────────┴────────┘
//! ```
//!
//! Each child pixel averages the in-image parent pixels under it, per channel,
//! rounding to nearest. Only pixels inside the parent level contribute, so a
//! uniform image stays uniform up to its edges, and child pixels past the
//! child level's edge stay zero.

use super::planner::BYTES_PER_PIXEL;

const BPP: usize = BYTES_PER_PIXEL as usize;

/// Parent tiles of one child tile, in TL, TR, BL, BR order. `None` for tiles
/// outside the parent grid.
pub type Mosaic<'a> = [Option<&'a [u8]>; 4];

/// Reduce a parent mosaic into `out` (one tile of `tile_dimension` squared
/// pixels).
///
/// `valid_width` and `valid_height` are the in-image extent of the mosaic in
/// parent pixels (at most `2 * tile_dimension`).
pub fn downsample_mosaic(
    mosaic: &Mosaic<'_>,
    tile_dimension: usize,
    valid_width: usize,
    valid_height: usize,
    out: &mut [u8],
) {
    let td = tile_dimension;
    let child_w = valid_width.div_ceil(2).min(td);
    let child_h = valid_height.div_ceil(2).min(td);

    out.fill(0);

    for cy in 0..child_h {
        for cx in 0..child_w {
            let mut sum = [0u32; BPP];
            let mut n = 0u32;

            for py in [2 * cy, 2 * cy + 1] {
                if py >= valid_height {
                    continue;
                }
                for px in [2 * cx, 2 * cx + 1] {
                    if px >= valid_width {
                        continue;
                    }
                    let quadrant = (py / td) * 2 + px / td;
                    let Some(tile) = mosaic[quadrant] else {
                        continue;
                    };
                    let offset = ((py % td) * td + px % td) * BPP;
                    for (acc, &value) in sum.iter_mut().zip(&tile[offset..offset + BPP]) {
                        *acc += value as u32;
                    }
                    n += 1;
                }
            }

            if n > 0 {
                let offset = (cy * td + cx) * BPP;
                for (dst, acc) in out[offset..offset + BPP].iter_mut().zip(sum) {
                    *dst = ((acc + n / 2) / n) as u8;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
