//! Geometric mapping between the source image and the normalized training frame
//!
//! The aligner hands over a unit-normalized affine matrix. Scaling it by the
//! coverage crop and shifting by the padding produces the matrix that maps an
//! image point into the `training_size × training_size` frame the encoder
//! was trained on. Its inverse takes the synthesized patch back to the image.

use crate::error::{ConvertError, Result};
use crate::types::FaceDetection;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Smallest absolute determinant accepted for an invertible matrix
const MIN_DETERMINANT: f64 = 1e-9;

/// Resampling kernel used by warps and resizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Bicubic convolution (OpenCV coefficient -0.75)
    Cubic,
    /// Pixel-area averaging when shrinking, bilinear otherwise
    Area,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cubic => write!(f, "cubic"),
            Self::Area => write!(f, "area"),
        }
    }
}

/// Interpolators for the image→training warp and the way back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpolatorPair {
    pub forward: Interpolation,
    pub inverse: Interpolation,
}

/// Square crop inside the training frame that the encoder replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageWindow {
    training_size: usize,
    padding: usize,
}

impl CoverageWindow {
    /// Create a coverage window
    ///
    /// # Errors
    /// - `training_size` is zero
    /// - `coverage` is zero or exceeds `training_size`
    pub fn new(training_size: u32, coverage: u32) -> Result<Self> {
        if training_size == 0 {
            return Err(ConvertError::config_value_error(
                "training size",
                training_size,
                "> 0",
                Some(256),
            ));
        }
        if coverage == 0 || coverage > training_size {
            return Err(ConvertError::config_value_error(
                "coverage",
                coverage,
                &format!("1-{}", training_size),
                None,
            ));
        }

        Ok(Self {
            training_size: training_size as usize,
            padding: ((training_size - coverage) / 2) as usize,
        })
    }

    #[must_use]
    pub fn training_size(&self) -> usize {
        self.training_size
    }

    #[must_use]
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Side of the coverage crop (`training_size - 2 * padding`)
    #[must_use]
    pub fn crop_size(&self) -> usize {
        self.training_size - 2 * self.padding
    }

    /// Half-open index range of the crop on either axis
    #[must_use]
    pub fn crop_range(&self) -> std::ops::Range<usize> {
        self.padding..self.training_size - self.padding
    }
}

/// 2×3 affine transform
///
/// Maps a point of the original image into the normalized training frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentMatrix([[f64; 3]; 2]);

impl AlignmentMatrix {
    #[must_use]
    pub fn new(rows: [[f64; 3]; 2]) -> Self {
        Self(rows)
    }

    #[must_use]
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    #[must_use]
    pub fn rows(&self) -> &[[f64; 3]; 2] {
        &self.0
    }

    /// Transform a point
    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    #[must_use]
    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        m[0][0] * m[1][1] - m[0][1] * m[1][0]
    }

    fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }

    /// Scale a unit-normalized matrix up to the training frame
    #[must_use]
    pub fn to_training_frame(&self, window: &CoverageWindow) -> Self {
        let scale = window.crop_size() as f64;
        let padding = window.padding() as f64;
        let mut rows = self.0;
        for row in &mut rows {
            for value in row.iter_mut() {
                *value *= scale;
            }
            row[2] += padding;
        }
        Self(rows)
    }

    /// Invert the transform
    ///
    /// # Errors
    /// - Matrix has non-finite entries or a near-zero determinant
    pub fn inverse(&self) -> Result<Self> {
        if !self.is_finite() {
            return Err(ConvertError::degenerate(format!(
                "alignment matrix has non-finite entries: {:?}",
                self.0
            )));
        }

        let det = self.determinant();
        if det.abs() < MIN_DETERMINANT {
            return Err(ConvertError::degenerate(format!(
                "alignment matrix is not invertible (determinant {:e})",
                det
            )));
        }

        let [[a, b, c], [d, e, f]] = self.0;
        let inv_a = e / det;
        let inv_b = -b / det;
        let inv_d = -d / det;
        let inv_e = a / det;

        Ok(Self([
            [inv_a, inv_b, -(inv_a * c + inv_b * f)],
            [inv_d, inv_e, -(inv_d * c + inv_e * f)],
        ]))
    }

    /// Average scale factor of the transform
    ///
    /// # Errors
    /// - Scale estimate is zero or not finite
    pub fn average_scale(&self) -> Result<f64> {
        let [[a, b, _], [d, e, _]] = self.0;
        let x_scale = (a * a + b * b).sqrt();
        if !x_scale.is_finite() || x_scale == 0.0 {
            return Err(ConvertError::degenerate(format!(
                "horizontal scale of alignment matrix is {}",
                x_scale
            )));
        }

        let y_scale = (a * e - b * d) / x_scale;
        let avg = (x_scale + y_scale) / 2.0;
        if !avg.is_finite() || avg == 0.0 {
            return Err(ConvertError::degenerate(format!(
                "average scale of alignment matrix is {}",
                avg
            )));
        }

        Ok(avg)
    }

    /// Pick interpolators from the scale of the transform
    ///
    /// Enlarging into the training frame uses cubic on the way in and area on
    /// the way back; shrinking does the opposite.
    ///
    /// # Errors
    /// - Scale estimate is zero or not finite
    pub fn interpolators(&self) -> Result<InterpolatorPair> {
        let avg = self.average_scale()?;
        let pair = if avg > 1.0 {
            InterpolatorPair {
                forward: Interpolation::Cubic,
                inverse: Interpolation::Area,
            }
        } else {
            InterpolatorPair {
                forward: Interpolation::Area,
                inverse: Interpolation::Cubic,
            }
        };
        debug!(
            "Matrix scale {:.4}: forward {}, inverse {}",
            avg, pair.forward, pair.inverse
        );
        Ok(pair)
    }
}

impl Default for AlignmentMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Per-detection geometry shared by every downstream stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMapping {
    /// Image → training frame
    pub matrix: AlignmentMatrix,
    pub window: CoverageWindow,
    pub interpolators: InterpolatorPair,
}

/// Derive the training-frame mapping for one detection
///
/// # Errors
/// - Scaled matrix is not invertible or has a degenerate scale
pub fn map_detection(
    detection: &dyn FaceDetection,
    window: &CoverageWindow,
) -> Result<FaceMapping> {
    let matrix = detection.alignment().to_training_frame(window);
    matrix.inverse()?;
    let interpolators = matrix.interpolators()?;

    debug!(
        padding = window.padding(),
        crop_size = window.crop_size(),
        "Mapped detection into training frame"
    );

    Ok(FaceMapping {
        matrix,
        window: *window,
        interpolators,
    })
}
