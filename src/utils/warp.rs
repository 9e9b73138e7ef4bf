//! Affine warping and resizing of H×W×C float images
//!
//! Pixel centres sit on integer coordinates. Cubic sampling uses the OpenCV
//! convolution kernel (A = -0.75); area sampling degrades to bilinear inside
//! warps and averages fractional source boxes when a resize shrinks.

use crate::{
    error::{ConvertError, Result},
    geometry::{AlignmentMatrix, Interpolation},
};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

const CUBIC_A: f64 = -0.75;

/// How samples falling outside the source are resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderMode {
    /// Out-of-range taps read this value
    Constant(f32),
    /// Destination pixels whose sample point leaves the source keep their value
    Transparent,
}

fn cubic_weights(t: f64) -> [f64; 4] {
    let a = CUBIC_A;
    let x0 = t + 1.0;
    let w0 = ((a * x0 - 5.0 * a) * x0 + 8.0 * a) * x0 - 4.0 * a;
    let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
    let x2 = 1.0 - t;
    let w2 = ((a + 2.0) * x2 - (a + 3.0)) * x2 * x2 + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

/// Tap offsets relative to `floor(s)` and their weights
fn point_taps(interpolation: Interpolation, s: f64) -> (isize, [f64; 4], usize) {
    let base = s.floor();
    let t = s - base;
    match interpolation {
        Interpolation::Cubic => (base as isize - 1, cubic_weights(t), 4),
        Interpolation::Area => (base as isize, [1.0 - t, t, 0.0, 0.0], 2),
    }
}

/// Resample `src` into `dst` through a destination→source affine map
///
/// # Errors
/// - Channel counts of `src` and `dst` differ
pub fn remap_affine(
    src: ArrayView3<f32>,
    dst_to_src: &AlignmentMatrix,
    dst: &mut Array3<f32>,
    interpolation: Interpolation,
    border: BorderMode,
) -> Result<()> {
    let (src_h, src_w, channels) = src.dim();
    let (dst_h, dst_w, dst_channels) = dst.dim();
    if channels != dst_channels {
        return Err(ConvertError::shape_mismatch(
            "affine warp",
            channels,
            dst_channels,
        ));
    }
    if src_h == 0 || src_w == 0 {
        if let BorderMode::Constant(value) = border {
            dst.fill(value);
        }
        return Ok(());
    }

    let max_x = (src_w - 1) as f64;
    let max_y = (src_h - 1) as f64;
    let mut acc = vec![0.0_f64; channels];

    for y in 0..dst_h {
        for x in 0..dst_w {
            let (sx, sy) = dst_to_src.apply(x as f64, y as f64);
            let inside = (0.0..=max_x).contains(&sx) && (0.0..=max_y).contains(&sy);

            if !sx.is_finite() || !sy.is_finite() {
                if let BorderMode::Constant(value) = border {
                    for c in 0..channels {
                        dst[[y, x, c]] = value;
                    }
                }
                continue;
            }
            if border == BorderMode::Transparent && !inside {
                continue;
            }

            let (x0, wx, nx) = point_taps(interpolation, sx);
            let (y0, wy, ny) = point_taps(interpolation, sy);
            acc.iter_mut().for_each(|v| *v = 0.0);

            for (j, &weight_y) in wy.iter().enumerate().take(ny) {
                let iy = y0 + j as isize;
                for (i, &weight_x) in wx.iter().enumerate().take(nx) {
                    let ix = x0 + i as isize;
                    let weight = weight_y * weight_x;
                    let in_bounds =
                        ix >= 0 && iy >= 0 && (ix as usize) < src_w && (iy as usize) < src_h;

                    match (in_bounds, border) {
                        (true, _) => {
                            for (c, slot) in acc.iter_mut().enumerate() {
                                *slot += weight * f64::from(src[[iy as usize, ix as usize, c]]);
                            }
                        },
                        (false, BorderMode::Constant(value)) => {
                            for slot in &mut acc {
                                *slot += weight * f64::from(value);
                            }
                        },
                        (false, BorderMode::Transparent) => {
                            let cx = ix.clamp(0, src_w as isize - 1) as usize;
                            let cy = iy.clamp(0, src_h as isize - 1) as usize;
                            for (c, slot) in acc.iter_mut().enumerate() {
                                *slot += weight * f64::from(src[[cy, cx, c]]);
                            }
                        },
                    }
                }
            }

            for (c, value) in acc.iter().enumerate() {
                dst[[y, x, c]] = *value as f32;
            }
        }
    }

    Ok(())
}

/// Warp `src` forward through `matrix` into a new `(height, width)` frame
///
/// # Errors
/// - `matrix` is not invertible
pub fn warp_affine(
    src: ArrayView3<f32>,
    matrix: &AlignmentMatrix,
    (height, width): (usize, usize),
    interpolation: Interpolation,
    border_value: f32,
) -> Result<Array3<f32>> {
    let inverse = matrix.inverse()?;
    let mut dst = Array3::from_elem((height, width, src.dim().2), border_value);
    remap_affine(
        src,
        &inverse,
        &mut dst,
        interpolation,
        BorderMode::Constant(border_value),
    )?;
    Ok(dst)
}

/// Single-plane variant of [`remap_affine`] with a constant border
///
/// # Errors
/// - Never in practice; kept fallible to share the 3-D path
pub fn remap_plane(
    src: ArrayView2<f32>,
    dst_to_src: &AlignmentMatrix,
    (height, width): (usize, usize),
    interpolation: Interpolation,
    border_value: f32,
) -> Result<Array2<f32>> {
    let mut dst = Array3::from_elem((height, width, 1), border_value);
    remap_affine(
        src.insert_axis(Axis(2)),
        dst_to_src,
        &mut dst,
        interpolation,
        BorderMode::Constant(border_value),
    )?;
    Ok(dst.index_axis_move(Axis(2), 0))
}

/// Source indices and weights contributing to each destination index
fn axis_taps(src_len: usize, dst_len: usize, interpolation: Interpolation) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as isize - 1;
    let clamp = |i: isize| i.clamp(0, last) as usize;

    (0..dst_len)
        .map(|d| match interpolation {
            Interpolation::Area if scale >= 1.0 => {
                let start = d as f64 * scale;
                let end = (d + 1) as f64 * scale;
                let mut taps = Vec::new();
                let mut i = start.floor() as usize;
                while (i as f64) < end && i < src_len {
                    let overlap = end.min((i + 1) as f64) - start.max(i as f64);
                    if overlap > 1e-12 {
                        taps.push((i, overlap / scale));
                    }
                    i += 1;
                }
                taps
            },
            Interpolation::Area => {
                let s = ((d as f64 + 0.5) * scale - 0.5).max(0.0);
                let base = s.floor();
                let t = s - base;
                let i0 = base as isize;
                vec![(clamp(i0), 1.0 - t), (clamp(i0 + 1), t)]
            },
            Interpolation::Cubic => {
                let s = (d as f64 + 0.5) * scale - 0.5;
                let (start, weights, count) = point_taps(Interpolation::Cubic, s);
                weights
                    .iter()
                    .take(count)
                    .enumerate()
                    .map(|(k, &w)| (clamp(start + k as isize), w))
                    .collect()
            },
        })
        .collect()
}

/// Resize an H×W×C image to `(height, width)` with replicated borders
///
/// # Errors
/// - Source or target has a zero dimension
pub fn resize(
    src: ArrayView3<f32>,
    (height, width): (usize, usize),
    interpolation: Interpolation,
) -> Result<Array3<f32>> {
    let (src_h, src_w, channels) = src.dim();
    if src_h == 0 || src_w == 0 || height == 0 || width == 0 {
        return Err(ConvertError::processing(format!(
            "cannot resize {}x{} to {}x{}",
            src_w, src_h, width, height
        )));
    }
    if (src_h, src_w) == (height, width) {
        return Ok(src.to_owned());
    }

    let x_taps = axis_taps(src_w, width, interpolation);
    let y_taps = axis_taps(src_h, height, interpolation);

    let mut horizontal = Array3::<f32>::zeros((src_h, width, channels));
    for y in 0..src_h {
        for (x, taps) in x_taps.iter().enumerate() {
            for c in 0..channels {
                let value: f64 = taps
                    .iter()
                    .map(|&(i, w)| w * f64::from(src[[y, i, c]]))
                    .sum();
                horizontal[[y, x, c]] = value as f32;
            }
        }
    }

    let mut out = Array3::<f32>::zeros((height, width, channels));
    for (y, taps) in y_taps.iter().enumerate() {
        for x in 0..width {
            for c in 0..channels {
                let value: f64 = taps
                    .iter()
                    .map(|&(i, w)| w * f64::from(horizontal[[i, x, c]]))
                    .sum();
                out[[y, x, c]] = value as f32;
            }
        }
    }

    Ok(out)
}
