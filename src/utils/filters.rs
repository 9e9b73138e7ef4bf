//! Linear filters on single planes with reflect-101 borders

use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Mirror an out-of-range index back into `0..len` without repeating the edge
#[must_use]
pub fn reflect101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

/// Normalized 1-D Gaussian kernel
///
/// A non-positive `sigma` is derived from the size the way OpenCV does.
#[must_use]
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let size = size.max(1);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Correlate a plane with separable row and column kernels anchored at `len / 2`
#[must_use]
pub fn separable_filter(plane: ArrayView2<f32>, row_kernel: &[f64], col_kernel: &[f64]) -> Array2<f32> {
    let (height, width) = plane.dim();
    if height == 0 || width == 0 {
        return plane.to_owned();
    }
    let row_anchor = (row_kernel.len() / 2) as isize;
    let col_anchor = (col_kernel.len() / 2) as isize;

    let mut horizontal = Array2::<f64>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            horizontal[[y, x]] = row_kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let sx = reflect101(x as isize + k as isize - row_anchor, width);
                    w * f64::from(plane[[y, sx]])
                })
                .sum();
        }
    }

    let mut out = Array2::<f32>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let value: f64 = col_kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let sy = reflect101(y as isize + k as isize - col_anchor, height);
                    w * horizontal[[sy, x]]
                })
                .sum();
            out[[y, x]] = value as f32;
        }
    }
    out
}

/// Gaussian blur of a single plane
#[must_use]
pub fn gaussian_blur(plane: ArrayView2<f32>, size: usize, sigma: f64) -> Array2<f32> {
    let kernel = gaussian_kernel(size, sigma);
    separable_filter(plane, &kernel, &kernel)
}

/// Normalized box blur of a single plane
#[must_use]
pub fn box_blur(plane: ArrayView2<f32>, size: usize) -> Array2<f32> {
    let size = size.max(1);
    if size == 1 {
        return plane.to_owned();
    }
    let kernel = vec![1.0 / size as f64; size];
    separable_filter(plane, &kernel, &kernel)
}

/// Correlate a plane with a 3×3 kernel
#[must_use]
pub fn filter3x3(plane: ArrayView2<f32>, kernel: &[[f32; 3]; 3]) -> Array2<f32> {
    let (height, width) = plane.dim();
    Array2::from_shape_fn((height, width), |(y, x)| {
        let mut acc = 0.0_f64;
        for (ky, row) in kernel.iter().enumerate() {
            let sy = reflect101(y as isize + ky as isize - 1, height);
            for (kx, weight) in row.iter().enumerate() {
                let sx = reflect101(x as isize + kx as isize - 1, width);
                acc += f64::from(*weight) * f64::from(plane[[sy, sx]]);
            }
        }
        acc as f32
    })
}

/// Apply a plane filter to every channel of an H×W×C image
pub fn map_channels<F>(image: &Array3<f32>, filter: F) -> Array3<f32>
where
    F: Fn(ArrayView2<f32>) -> Array2<f32>,
{
    let mut out = Array3::<f32>::zeros(image.raw_dim());
    for (src, mut dst) in image.axis_iter(Axis(2)).zip(out.axis_iter_mut(Axis(2))) {
        dst.assign(&filter(src));
    }
    out
}
