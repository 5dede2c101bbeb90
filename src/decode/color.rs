//! Chroma upsampling and color conversion to RGBA.

/// How decoded component samples map to RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// One luminance component
    Grayscale,
    /// JFIF YCbCr
    YCbCr,
    /// Three components stored as RGB (Adobe transform 0)
    Rgb,
}

impl ColorModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorModel::Grayscale => "Grayscale",
            ColorModel::YCbCr => "YCbCr",
            ColorModel::Rgb => "RGB",
        }
    }
}

/// One component's samples for the current MCU row.
pub struct PlaneView<'a> {
    pub samples: &'a [u8],
    pub stride: usize,
    /// Horizontal and vertical sampling factors
    pub h: usize,
    pub v: usize,
}

/// Convert `rows` output rows of `width` pixels into RGBA.
///
/// Planes are subsampled relative to `max_h` x `max_v`; each output pixel
/// takes the nearest covering sample.
pub fn convert_rows(
    model: ColorModel,
    planes: &[PlaneView<'_>],
    max_h: usize,
    max_v: usize,
    width: usize,
    rows: usize,
    out: &mut [u8],
) {
    for y in 0..rows {
        let line = &mut out[y * width * 4..(y + 1) * width * 4];
        match model {
            ColorModel::Grayscale => {
                let plane = &planes[0];
                let src = &plane.samples[(y * plane.v / max_v) * plane.stride..];
                for (x, px) in line.chunks_exact_mut(4).enumerate() {
                    let g = src[x * plane.h / max_h];
                    px.copy_from_slice(&[g, g, g, 255]);
                }
            }
            ColorModel::YCbCr | ColorModel::Rgb => {
                let rows: [&[u8]; 3] = std::array::from_fn(|c| {
                    let plane = &planes[c];
                    &plane.samples[(y * plane.v / max_v) * plane.stride..]
                });
                for (x, px) in line.chunks_exact_mut(4).enumerate() {
                    let a = rows[0][x * planes[0].h / max_h];
                    let b = rows[1][x * planes[1].h / max_h];
                    let c = rows[2][x * planes[2].h / max_h];
                    let [r, g, bl] = if model == ColorModel::Rgb {
                        [a, b, c]
                    } else {
                        ycbcr_to_rgb(a, b, c)
                    };
                    px.copy_from_slice(&[r, g, bl, 255]);
                }
            }
        }
    }
}

/// JFIF YCbCr to RGB.
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;

    [clamp(r), clamp(g), clamp(b)]
}

#[inline]
fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// =============================================================================
// Tests
// =============================================================================
