//! Rasterization of landmark-derived shapes into float masks

use crate::{
    error::{ConvertError, Result},
    types::Point,
};
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use ndarray::Array2;
use tracing::debug;

const ELLIPSE_TOLERANCE: f64 = 1e-5;
const ELLIPSE_MAX_ITERATIONS: usize = 2000;

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull by monotone chain, collinear points dropped
#[must_use]
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();

    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);
    for &p in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Fill a convex polygon with anti-aliased edges
///
/// Coverage of a pixel is `0.5 + d` clamped to `[0, 1]`, where `d` is the
/// signed distance from the pixel centre to the nearest edge (positive
/// inside). Polygons with fewer than three vertices draw nothing.
pub fn fill_convex_polygon_aa(mask: &mut Array2<f32>, polygon: &[Point]) {
    if polygon.len() < 3 {
        return;
    }
    let (height, width) = mask.dim();

    let area: f64 = polygon
        .iter()
        .zip(polygon.iter().cycle().skip(1))
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    if area.abs() < f64::EPSILON {
        return;
    }
    let orientation = area.signum();

    let edges: Vec<(Point, f64, f64, f64)> = polygon
        .iter()
        .zip(polygon.iter().cycle().skip(1))
        .map(|(&a, &b)| {
            let length = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
            (a, b.x - a.x, b.y - a.y, length)
        })
        .filter(|edge| edge.3 > 0.0)
        .collect();

    let min_x = polygon.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = polygon.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = polygon.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = polygon.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    let x_start = (min_x - 1.0).floor().max(0.0) as usize;
    let y_start = (min_y - 1.0).floor().max(0.0) as usize;
    let x_end = ((max_x + 1.0).ceil().max(0.0) as usize).min(width.saturating_sub(1));
    let y_end = ((max_y + 1.0).ceil().max(0.0) as usize).min(height.saturating_sub(1));
    if width == 0 || height == 0 || x_start > x_end || y_start > y_end {
        return;
    }

    for y in y_start..=y_end {
        for x in x_start..=x_end {
            let (px, py) = (x as f64, y as f64);
            let distance = edges
                .iter()
                .map(|&(a, dx, dy, length)| orientation * (dx * (py - a.y) - dy * (px - a.x)) / length)
                .fold(f64::INFINITY, f64::min);
            let coverage = (0.5 + distance).clamp(0.0, 1.0) as f32;
            if coverage > mask[[y, x]] {
                mask[[y, x]] = coverage;
            }
        }
    }
}

/// Ellipse `(p - center)ᵀ · shape · (p - center) ≤ 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub center: Vector2<f64>,
    pub shape: Matrix2<f64>,
}

impl Ellipse {
    /// Semi-axis lengths, largest first
    #[must_use]
    pub fn semi_axes(&self) -> (f64, f64) {
        let eigen = self.shape.symmetric_eigen();
        let a = 1.0 / eigen.eigenvalues[0].max(f64::MIN_POSITIVE).sqrt();
        let b = 1.0 / eigen.eigenvalues[1].max(f64::MIN_POSITIVE).sqrt();
        if a >= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let d = Vector2::new(x, y) - self.center;
        (d.transpose() * self.shape * d)[(0, 0)] <= 1.0
    }
}

/// Minimum-area ellipse enclosing the points (Khachiyan's algorithm)
///
/// # Errors
/// - Fewer than three distinct points, or all points collinear
pub fn min_enclosing_ellipse(points: &[Point]) -> Result<Ellipse> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return Err(ConvertError::degenerate(format!(
            "cannot fit an ellipse to {} distinct non-collinear landmarks",
            hull.len()
        )));
    }

    let n = hull.len();
    let lifted: Vec<Vector3<f64>> = hull.iter().map(|p| Vector3::new(p.x, p.y, 1.0)).collect();
    let mut weights = vec![1.0 / n as f64; n];
    let dimension = 2.0;

    for iteration in 0..ELLIPSE_MAX_ITERATIONS {
        let scatter: Matrix3<f64> = lifted
            .iter()
            .zip(&weights)
            .map(|(q, &u)| q * q.transpose() * u)
            .sum();
        let inverse = scatter.try_inverse().ok_or_else(|| {
            ConvertError::degenerate("landmark scatter matrix is singular while fitting ellipse")
        })?;

        let (best, largest) = lifted
            .iter()
            .map(|q| (q.transpose() * inverse * q)[(0, 0)])
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, m)| if m > acc.1 { (i, m) } else { acc });

        let step = (largest - dimension - 1.0) / ((dimension + 1.0) * (largest - 1.0));
        if !step.is_finite() {
            return Err(ConvertError::degenerate("ellipse fit diverged"));
        }

        let mut change = 0.0;
        for (i, u) in weights.iter_mut().enumerate() {
            let updated = (1.0 - step) * *u + if i == best { step } else { 0.0 };
            change += (updated - *u).powi(2);
            *u = updated;
        }

        if change.sqrt() < ELLIPSE_TOLERANCE {
            debug!("Ellipse fit converged after {} iterations", iteration + 1);
            break;
        }
    }

    let center: Vector2<f64> = hull
        .iter()
        .zip(&weights)
        .map(|(p, &u)| Vector2::new(p.x, p.y) * u)
        .sum();
    let spread: Matrix2<f64> = hull
        .iter()
        .zip(&weights)
        .map(|(p, &u)| {
            let v = Vector2::new(p.x, p.y);
            v * v.transpose() * u
        })
        .sum::<Matrix2<f64>>()
        - center * center.transpose();

    let shape = spread
        .try_inverse()
        .ok_or_else(|| ConvertError::degenerate("landmarks span no area"))?
        / dimension;

    if shape.iter().any(|v| !v.is_finite()) {
        return Err(ConvertError::degenerate("ellipse fit produced non-finite axes"));
    }

    let ellipse = Ellipse { center, shape };
    let (major, minor) = ellipse.semi_axes();
    debug!(
        "Fitted ellipse at ({:.1}, {:.1}) with semi-axes {:.1} x {:.1}",
        center.x, center.y, major, minor
    );
    Ok(ellipse)
}

/// Fill an ellipse opaque, without anti-aliasing
pub fn fill_ellipse(mask: &mut Array2<f32>, ellipse: &Ellipse) {
    let (height, width) = mask.dim();
    if height == 0 || width == 0 {
        return;
    }
    let Some(bounds) = ellipse.shape.try_inverse() else {
        return;
    };
    let half_w = bounds[(0, 0)].max(0.0).sqrt();
    let half_h = bounds[(1, 1)].max(0.0).sqrt();

    let x_start = (ellipse.center.x - half_w).floor().max(0.0) as usize;
    let y_start = (ellipse.center.y - half_h).floor().max(0.0) as usize;
    let x_end = ((ellipse.center.x + half_w).ceil().max(0.0) as usize).min(width - 1);
    let y_end = ((ellipse.center.y + half_h).ceil().max(0.0) as usize).min(height - 1);

    for y in y_start..=y_end {
        for x in x_start..=x_end {
            if ellipse.contains(x as f64, y as f64) {
                mask[[y, x]] = 1.0;
            }
        }
    }
}
