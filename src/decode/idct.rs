//! Dequantization and inverse DCT for 8x8 blocks.

use std::f32::consts::{FRAC_1_SQRT_2, PI};
use std::sync::OnceLock;

/// Natural (row-major) index of the k-th coefficient in zigzag order.
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// `basis[x][u] = C(u) / 2 * cos((2x + 1) u pi / 16)`.
fn basis() -> &'static [[f32; 8]; 8] {
    static BASIS: OnceLock<[[f32; 8]; 8]> = OnceLock::new();
    BASIS.get_or_init(|| {
        let mut table = [[0f32; 8]; 8];
        for (x, row) in table.iter_mut().enumerate() {
            for (u, value) in row.iter_mut().enumerate() {
                let c = if u == 0 { FRAC_1_SQRT_2 } else { 1.0 };
                *value = c / 2.0 * (((2 * x + 1) * u) as f32 * PI / 16.0).cos();
            }
        }
        table
    })
}

/// Inverse-transform dequantized coefficients (natural order) and write the
/// level-shifted samples into `out` at `offset` with row pitch `stride`.
pub fn idct_block(coeffs: &[i32; 64], out: &mut [u8], offset: usize, stride: usize) {
    if coeffs[1..].iter().all(|&c| c == 0) {
        let value = clamp_sample(coeffs[0] as f32 / 8.0);
        for y in 0..8 {
            let start = offset + y * stride;
            out[start..start + 8].fill(value);
        }
        return;
    }

    let basis = basis();

    // Rows: tmp[v][x] = sum_u basis[x][u] * F[v][u]
    let mut tmp = [[0f32; 8]; 8];
    for v in 0..8 {
        let row = &coeffs[v * 8..v * 8 + 8];
        for x in 0..8 {
            let mut sum = 0f32;
            for u in 0..8 {
                sum += basis[x][u] * row[u] as f32;
            }
            tmp[v][x] = sum;
        }
    }

    // Columns: f[y][x] = sum_v basis[y][v] * tmp[v][x]
    for y in 0..8 {
        let start = offset + y * stride;
        for x in 0..8 {
            let mut sum = 0f32;
            for v in 0..8 {
                sum += basis[y][v] * tmp[v][x];
            }
            out[start + x] = clamp_sample(sum);
        }
    }
}

#[inline]
fn clamp_sample(value: f32) -> u8 {
    (value + 128.0).round().clamp(0.0, 255.0) as u8
}

// =============================================================================
// Tests
// =============================================================================
