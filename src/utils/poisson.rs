//! Gradient-domain (Poisson) cloning

use crate::error::{ConvertError, Result};
use ndarray::{Array2, Array3, ArrayView3};
use tracing::debug;

const CONVERGENCE_THRESHOLD: f64 = 0.01;
const MAX_ITERATIONS: usize = 5000;

const NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Clone `source` into `canvas` at `(top, left)` inside the pixels where `region` is set
///
/// Inside the region the result keeps the gradients of `source`; on its
/// boundary it agrees with `canvas`. The outermost row and column of the
/// source always count as boundary. The system is solved per channel with
/// successive over-relaxation.
///
/// # Errors
/// - `region` and `source` disagree in size
/// - Channel counts differ or the source does not fit inside the canvas
pub fn seamless_clone(
    source: ArrayView3<f32>,
    canvas: &Array3<f32>,
    region: &Array2<bool>,
    (top, left): (usize, usize),
) -> Result<Array3<f32>> {
    let (src_h, src_w, channels) = source.dim();
    let (canvas_h, canvas_w, canvas_channels) = canvas.dim();

    if region.dim() != (src_h, src_w) {
        return Err(ConvertError::shape_mismatch(
            "seamless clone region",
            (src_h, src_w),
            region.dim(),
        ));
    }
    if channels != canvas_channels {
        return Err(ConvertError::shape_mismatch(
            "seamless clone channels",
            canvas_channels,
            channels,
        ));
    }
    if top + src_h > canvas_h || left + src_w > canvas_w {
        return Err(ConvertError::processing_stage_error(
            "seamless clone",
            "source patch does not fit inside the canvas",
            Some(&format!(
                "{}x{} at ({}, {}) in {}x{}",
                src_w, src_h, left, top, canvas_w, canvas_h
            )),
        ));
    }

    let interior = |y: usize, x: usize| {
        y > 0 && x > 0 && y + 1 < src_h && x + 1 < src_w && region[[y, x]]
    };
    let unknowns: Vec<(usize, usize)> = region
        .indexed_iter()
        .map(|(pos, _)| pos)
        .filter(|&(y, x)| interior(y, x))
        .collect();

    let mut result = canvas.clone();
    if unknowns.is_empty() {
        return Ok(result);
    }

    let size = src_h.max(src_w) as f64 + 1.0;
    let omega = 2.0 / (1.0 + (std::f64::consts::PI / size).sin());

    for c in 0..channels {
        let mut solution: Array2<f64> =
            Array2::from_shape_fn((src_h, src_w), |(y, x)| f64::from(source[[y, x, c]]));

        // Guidance divergence plus the fixed boundary values
        let rhs: Vec<f64> = unknowns
            .iter()
            .map(|&(y, x)| {
                let centre = f64::from(source[[y, x, c]]);
                NEIGHBOURS
                    .iter()
                    .map(|&(dy, dx)| {
                        let sy = (y as isize + dy) as usize;
                        let sx = (x as isize + dx) as usize;
                        let guidance = centre - f64::from(source[[sy, sx, c]]);
                        if interior(sy, sx) {
                            guidance
                        } else {
                            guidance + f64::from(canvas[[top + sy, left + sx, c]])
                        }
                    })
                    .sum()
            })
            .collect();

        let mut iterations = 0;
        loop {
            let mut max_delta = 0.0_f64;
            for (&(y, x), &b) in unknowns.iter().zip(&rhs) {
                let neighbours: f64 = NEIGHBOURS
                    .iter()
                    .filter_map(|&(dy, dx)| {
                        let sy = (y as isize + dy) as usize;
                        let sx = (x as isize + dx) as usize;
                        interior(sy, sx).then(|| solution[[sy, sx]])
                    })
                    .sum();
                let current = solution[[y, x]];
                let updated = current + omega * ((b + neighbours) / 4.0 - current);
                max_delta = max_delta.max((updated - current).abs());
                solution[[y, x]] = updated;
            }

            iterations += 1;
            if max_delta < CONVERGENCE_THRESHOLD || iterations >= MAX_ITERATIONS {
                break;
            }
        }
        debug!(channel = c, iterations, "Poisson solve finished");

        for &(y, x) in &unknowns {
            result[[top + y, left + x, c]] = solution[[y, x]] as f32;
        }
    }

    Ok(result)
}
