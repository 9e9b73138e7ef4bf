//! Grayscale erosion and dilation with an elliptical structuring element
//!
//! The element is split into one horizontal span per row. Each distinct span
//! is applied as a 1-D sliding min/max (van Herk/Gil-Werman), and the row
//! results are then combined vertically. Only the bounding box of the
//! non-zero mask, grown by the kernel radius, is processed.

use ndarray::{s, Array2};

/// Elliptical structuring element of `size × size`, anchored at `size / 2`
///
/// Rows are filled the same way as OpenCV's `MORPH_ELLIPSE`.
#[must_use]
pub fn ellipse_kernel(size: usize) -> Array2<bool> {
    let size = size.max(1);
    let radius = (size / 2) as isize;
    let center = (size / 2) as f64;
    let inv_r2 = if radius > 0 {
        1.0 / (radius * radius) as f64
    } else {
        0.0
    };

    let mut kernel = Array2::from_elem((size, size), false);
    for row in 0..size {
        let dy = row as isize - radius;
        if dy.abs() > radius {
            continue;
        }
        let dx = if radius > 0 {
            (center * (((radius * radius - dy * dy) as f64) * inv_r2).sqrt()).round() as isize
        } else {
            0
        };
        let start = (center as isize - dx).max(0) as usize;
        let end = ((center as isize + dx + 1) as usize).min(size);
        for col in start..end {
            kernel[[row, col]] = true;
        }
    }
    kernel
}

#[derive(Clone, Copy)]
struct Extremum {
    pick: fn(f32, f32) -> f32,
    identity: f32,
}

const MIN: Extremum = Extremum {
    pick: f32::min,
    identity: f32::INFINITY,
};

const MAX: Extremum = Extremum {
    pick: f32::max,
    identity: f32::NEG_INFINITY,
};

/// Horizontal extent `(lo, hi)` of each kernel row, relative to the anchor
fn row_spans(size: usize) -> Vec<Option<(isize, isize)>> {
    let kernel = ellipse_kernel(size);
    let anchor = (size.max(1) / 2) as isize;
    kernel
        .rows()
        .into_iter()
        .map(|row| {
            let first = row.iter().position(|&on| on)?;
            let last = row.iter().rposition(|&on| on)?;
            Some((first as isize - anchor, last as isize - anchor))
        })
        .collect()
}

/// `out[i] = pick(values[i..i + window])` for every full window
fn sliding_extremum(values: &[f32], window: usize, op: Extremum) -> Vec<f32> {
    let len = values.len();
    if window == 0 || window > len {
        return Vec::new();
    }

    let mut prefix = vec![op.identity; len];
    let mut suffix = vec![op.identity; len];
    for (i, &v) in values.iter().enumerate() {
        prefix[i] = if i % window == 0 { v } else { (op.pick)(prefix[i - 1], v) };
    }
    for i in (0..len).rev() {
        suffix[i] = if i + 1 == len || (i + 1) % window == 0 {
            values[i]
        } else {
            (op.pick)(suffix[i + 1], values[i])
        };
    }

    (0..=len - window)
        .map(|i| (op.pick)(suffix[i], prefix[i + window - 1]))
        .collect()
}

/// Inclusive bounding box of non-zero samples as `(y0, y1, x0, x1)`
fn nonzero_bounds(mask: &Array2<f32>) -> Option<(usize, usize, usize, usize)> {
    mask.indexed_iter()
        .filter(|(_, v)| **v != 0.0)
        .fold(None, |bounds, ((y, x), _)| {
            Some(match bounds {
                None => (y, y, x, x),
                Some((y0, y1, x0, x1)) => (y0.min(y), y1.max(y), x0.min(x), x1.max(x)),
            })
        })
}

fn morph(mask: &Array2<f32>, size: usize, op: Extremum) -> Array2<f32> {
    let (height, width) = mask.dim();
    let mut output = Array2::<f32>::zeros((height, width));
    // Away from the non-zero box every neighbourhood is all zeros
    let Some((by0, by1, bx0, bx1)) = nonzero_bounds(mask) else {
        return output;
    };

    let anchor = size.max(1) / 2;
    let (y0, y1) = (by0.saturating_sub(anchor), (by1 + anchor + 1).min(height));
    let (x0, x1) = (bx0.saturating_sub(anchor), (bx1 + anchor + 1).min(width));
    let (sy0, sy1) = (y0.saturating_sub(anchor), (y1 + anchor).min(height));
    let out_width = x1 - x0;

    let spans = row_spans(size);
    let mut distinct: Vec<(isize, isize)> = spans.iter().flatten().copied().collect();
    distinct.sort_unstable();
    distinct.dedup();

    // Horizontal pass: one plane per distinct span over the source rows
    let anchor_i = anchor as isize;
    let padded_width = out_width + 2 * anchor;
    let mut padded = vec![op.identity; padded_width];
    let mut planes: Vec<Array2<f32>> = distinct
        .iter()
        .map(|_| Array2::from_elem((sy1 - sy0, out_width), op.identity))
        .collect();
    for sy in sy0..sy1 {
        for (j, slot) in padded.iter_mut().enumerate() {
            let column = x0 as isize - anchor_i + j as isize;
            *slot = if column >= 0 && (column as usize) < width {
                mask[[sy, column as usize]]
            } else {
                op.identity
            };
        }
        for (plane, &(lo, hi)) in planes.iter_mut().zip(&distinct) {
            let window = (hi - lo + 1) as usize;
            let start = (lo + anchor_i) as usize;
            let slid = sliding_extremum(&padded, window, op);
            plane
                .slice_mut(s![sy - sy0, ..])
                .iter_mut()
                .zip(&slid[start..start + out_width])
                .for_each(|(dst, &v)| *dst = v);
        }
    }

    // Vertical pass: combine the span planes row by row of the element
    let rows: Vec<(isize, usize)> = spans
        .iter()
        .enumerate()
        .filter_map(|(row, span)| {
            let span = (*span)?;
            let index = distinct.iter().position(|&d| d == span)?;
            Some((row as isize - anchor_i, index))
        })
        .collect();
    for y in y0..y1 {
        for x in 0..out_width {
            let value = rows
                .iter()
                .filter_map(|&(dy, index)| {
                    let sy = y as isize + dy;
                    (sy >= 0 && (sy as usize) < height)
                        .then(|| planes[index][[sy as usize - sy0, x]])
                })
                .fold(op.identity, op.pick);
            output[[y, x0 + x]] = value;
        }
    }
    output
}

/// Minimum filter; pixels outside the mask are ignored
#[must_use]
pub fn erode(mask: &Array2<f32>, size: usize) -> Array2<f32> {
    morph(mask, size, MIN)
}

/// Maximum filter; pixels outside the mask are ignored
#[must_use]
pub fn dilate(mask: &Array2<f32>, size: usize) -> Array2<f32> {
    morph(mask, size, MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Direct evaluation of every element offset at every pixel
    fn morph_direct(mask: &Array2<f32>, size: usize, pick: fn(f32, f32) -> f32) -> Array2<f32> {
        let kernel = ellipse_kernel(size);
        let anchor = (size.max(1) / 2) as isize;
        let offsets: Vec<(isize, isize)> = kernel
            .indexed_iter()
            .filter(|(_, on)| **on)
            .map(|((ky, kx), _)| (ky as isize - anchor, kx as isize - anchor))
            .collect();

        let (height, width) = mask.dim();
        Array2::from_shape_fn((height, width), |(y, x)| {
            offsets
                .iter()
                .filter_map(|&(dy, dx)| {
                    let sy = y as isize + dy;
                    let sx = x as isize + dx;
                    (sy >= 0 && sx >= 0 && (sy as usize) < height && (sx as usize) < width)
                        .then(|| mask[[sy as usize, sx as usize]])
                })
                .fold(mask[[y, x]], pick)
        })
    }

    /// Deterministic pseudo-random mask with a noisy blob and zero background
    fn noisy_mask(height: usize, width: usize, seed: u64) -> Array2<f32> {
        let mut state = seed;
        Array2::from_shape_fn((height, width), |(y, x)| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let noise = (state >> 40) as f32 / (1u64 << 24) as f32;
            let inside = (8..height - 6).contains(&y) && (5..width - 9).contains(&x);
            if inside || noise > 0.9 {
                noise
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_span_filter_matches_direct_evaluation() {
        for (seed, size) in [(7, 7), (11, 8), (3, 3), (5, 4), (13, 1)] {
            let mask = noisy_mask(31, 37, seed);
            assert_eq!(erode(&mask, size), morph_direct(&mask, size, f32::min), "erode {size}");
            assert_eq!(dilate(&mask, size), morph_direct(&mask, size, f32::max), "dilate {size}");
        }
    }

    #[test]
    fn test_kernel_larger_than_mask() {
        let mask = noisy_mask(20, 24, 42);
        assert_eq!(erode(&mask, 41), morph_direct(&mask, 41, f32::min));
        assert_eq!(dilate(&mask, 30), morph_direct(&mask, 30, f32::max));
    }

    #[test]
    fn test_sliding_extremum_windows() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        assert_eq!(
            sliding_extremum(&values, 3, MIN),
            vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]
        );
        assert_eq!(
            sliding_extremum(&values, 3, MAX),
            vec![4.0, 4.0, 5.0, 9.0, 9.0, 9.0]
        );
        assert_eq!(sliding_extremum(&values, 1, MAX), values.to_vec());
        assert!(sliding_extremum(&values, 9, MIN).is_empty());
    }

    #[test]
    fn test_empty_mask_stays_empty() {
        let mask = Array2::<f32>::zeros((16, 16));
        assert!(dilate(&mask, 9).iter().all(|&v| v == 0.0));
        assert!(erode(&mask, 9).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_ellipse_kernel_shapes() {
        let one = ellipse_kernel(1);
        assert_eq!(one.dim(), (1, 1));
        assert!(one[[0, 0]]);

        let five = ellipse_kernel(5);
        let rows: Vec<usize> = five
            .rows()
            .into_iter()
            .map(|r| r.iter().filter(|&&v| v).count())
            .collect();
        assert_eq!(rows, vec![1, 5, 5, 5, 1]);
        assert!(five[[0, 2]]);
        assert!(!five[[0, 1]]);
    }

    #[test]
    fn test_erode_shrinks_square() {
        let mut mask = Array2::<f32>::zeros((11, 11));
        for y in 2..9 {
            for x in 2..9 {
                mask[[y, x]] = 1.0;
            }
        }
        let eroded = erode(&mask, 3);
        assert_eq!(eroded[[2, 2]], 0.0);
        assert_eq!(eroded[[3, 3]], 1.0);
        assert_eq!(eroded[[5, 5]], 1.0);
        assert!(eroded.sum() < mask.sum());
    }

    #[test]
    fn test_dilate_grows_point() {
        let mut mask = Array2::<f32>::zeros((9, 9));
        mask[[4, 4]] = 1.0;
        let dilated = dilate(&mask, 3);
        assert_eq!(dilated[[3, 4]], 1.0);
        assert_eq!(dilated[[4, 5]], 1.0);
        assert_eq!(dilated[[3, 3]], 0.0);
        assert_eq!(dilated[[2, 4]], 0.0);

        let wider = dilate(&mask, 5);
        assert_eq!(wider[[3, 3]], 1.0);
        assert_eq!(wider[[2, 4]], 1.0);
        assert_eq!(wider[[2, 3]], 0.0);
    }

    #[test]
    fn test_erode_ignores_outside_pixels() {
        let mask = Array2::from_elem((4, 4), 1.0_f32);
        let eroded = erode(&mask, 5);
        assert!(eroded.iter().all(|&v| v == 1.0));
    }
}
