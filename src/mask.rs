//! Blend mask generation
//!
//! A mask starts fully opaque and is shaped by the steps of the configured
//! [`MaskStrategy`], then eroded and blurred.

use crate::{
    config::{ConvertConfig, MaskOp, MaskShape, MaskStrategy},
    error::Result,
    geometry::{AlignmentMatrix, CoverageWindow, InterpolatorPair},
    types::{Mask, Point},
    utils::{filters, morphology, shapes, warp},
};
use ndarray::{s, Array2};
use tracing::{debug, warn};

const SMOOTHED_BLUR_SIZE: usize = 25;
const SMOOTHED_BLUR_SIGMA: f64 = 10.0;
/// The smoothed core is inset by `crop_size / SMOOTHED_INSET_DIVISOR`
const SMOOTHED_INSET_DIVISOR: usize = 15;

/// Kernel size relative to the mask area
///
/// Returns `max(1, floor(sqrt(sum(mask)) / 2 * factor))`.
#[must_use]
pub fn derive_kernel_size(mask: &Array2<f32>, factor: f32) -> usize {
    let total: f64 = mask.iter().map(|&v| f64::from(v)).sum();
    let size = total.max(0.0).sqrt() / 2.0 * f64::from(factor.abs());
    (size as usize).max(1)
}

fn kernel_size(mask: &Array2<f32>, setting: f32) -> usize {
    let magnitude = setting.abs();
    if magnitude < 1.0 {
        derive_kernel_size(mask, magnitude)
    } else {
        magnitude as usize
    }
}

/// Builds blend masks for one configuration
#[derive(Debug, Clone)]
pub struct MaskGenerator {
    strategy: MaskStrategy,
    blur_size: f32,
    erosion_size: f32,
}

impl MaskGenerator {
    /// Create a generator from the converter configuration
    #[must_use]
    pub fn new(config: &ConvertConfig) -> Self {
        if let Some(requested) = config.mask_strategy.fallback_from() {
            warn!(
                "Mask strategy '{}' needs a segmentation model which is not available; using '{}'",
                requested,
                config.mask_strategy.name()
            );
        }

        Self {
            strategy: config.mask_strategy.clone(),
            blur_size: config.blur_size,
            erosion_size: config.erosion_size,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> &MaskStrategy {
        &self.strategy
    }

    /// Build the mask for one face
    ///
    /// `matrix` maps image coordinates into the training frame and
    /// `image_size` is `(height, width)` of the frame being patched.
    ///
    /// # Errors
    /// - Ellipse fit on degenerate landmarks
    pub fn build_mask(
        &self,
        matrix: &AlignmentMatrix,
        image_size: (usize, usize),
        window: &CoverageWindow,
        interpolators: InterpolatorPair,
        landmarks: &[Point],
    ) -> Result<Mask> {
        let (height, width) = image_size;
        let mut mask = Array2::<f32>::ones((height, width));

        for step in self.strategy.steps() {
            let layer = match step.shape {
                MaskShape::Smoothed => {
                    let frame = smoothed_frame(window);
                    warp::remap_plane(frame.view(), matrix, image_size, interpolators.inverse, 0.0)?
                },
                MaskShape::Rect => {
                    let frame = rect_frame(window);
                    warp::remap_plane(frame.view(), matrix, image_size, interpolators.inverse, 0.0)?
                },
                MaskShape::FaceHull => {
                    let hull = shapes::convex_hull(landmarks);
                    if hull.len() < 3 {
                        warn!("Face hull has {} vertices; hull mask is empty", hull.len());
                    }
                    let mut layer = Array2::<f32>::zeros((height, width));
                    shapes::fill_convex_polygon_aa(&mut layer, &hull);
                    layer
                },
                MaskShape::Ellipse => {
                    let ellipse = shapes::min_enclosing_ellipse(landmarks)?;
                    let mut layer = Array2::<f32>::zeros((height, width));
                    shapes::fill_ellipse(&mut layer, &ellipse);
                    layer
                },
            };

            match step.op {
                MaskOp::Replace => mask = layer,
                MaskOp::Combine => mask *= &layer,
            }
        }

        mask.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) });

        if self.erosion_size != 0.0 {
            let size = kernel_size(&mask, self.erosion_size);
            debug!(size, erode = self.erosion_size > 0.0, "Applying mask erosion");
            mask = if self.erosion_size > 0.0 {
                morphology::erode(&mask, size)
            } else {
                morphology::dilate(&mask, size)
            };
        }

        if self.blur_size != 0.0 {
            let size = kernel_size(&mask, self.blur_size);
            debug!(size, "Applying mask blur");
            mask = filters::box_blur(mask.view(), size);
        }

        mask.mapv_inplace(|v| v.clamp(0.0, 1.0));
        Ok(Mask::new(mask))
    }
}

fn rect_frame(window: &CoverageWindow) -> Array2<f32> {
    let size = window.training_size();
    let crop = window.crop_range();
    let mut frame = Array2::<f32>::zeros((size, size));
    frame.slice_mut(s![crop.clone(), crop]).fill(1.0);
    frame
}

fn smoothed_frame(window: &CoverageWindow) -> Array2<f32> {
    let size = window.training_size();
    let inset = window.padding() + window.crop_size() / SMOOTHED_INSET_DIVISOR;
    let mut frame = Array2::<f32>::zeros((size, size));
    if inset < size.saturating_sub(inset) {
        frame.slice_mut(s![inset..size - inset, inset..size - inset]).fill(1.0);
    }
    filters::gaussian_blur(frame.view(), SMOOTHED_BLUR_SIZE, SMOOTHED_BLUR_SIGMA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Interpolation;

    fn generator(strategy: &str, blur: f32, erosion: f32) -> MaskGenerator {
        let config = ConvertConfig::builder()
            .mask_strategy(strategy)
            .blur_size(blur)
            .erosion_size(erosion)
            .training_size(100)
            .coverage(64)
            .build()
            .unwrap();
        MaskGenerator::new(&config)
    }

    fn identity_pair() -> InterpolatorPair {
        InterpolatorPair {
            forward: Interpolation::Area,
            inverse: Interpolation::Cubic,
        }
    }

    fn face_landmarks() -> Vec<Point> {
        vec![
            Point::new(30.0, 25.0),
            Point::new(70.0, 25.0),
            Point::new(90.0, 55.0),
            Point::new(50.0, 80.0),
            Point::new(10.0, 55.0),
            Point::new(50.0, 50.0),
        ]
    }

    fn build(generator: &MaskGenerator) -> Result<Mask> {
        let window = CoverageWindow::new(100, 64)?;
        generator.build_mask(
            &AlignmentMatrix::identity(),
            (100, 100),
            &window,
            identity_pair(),
            &face_landmarks(),
        )
    }

    #[test]
    fn test_derive_kernel_size() {
        let mask = Array2::<f32>::ones((10, 10));
        assert_eq!(derive_kernel_size(&mask, 0.5), 2);
        assert_eq!(derive_kernel_size(&mask, 0.01), 1);
        assert_eq!(derive_kernel_size(&Array2::zeros((4, 4)), 0.9), 1);
    }

    #[test]
    fn test_none_strategy_is_all_ones() {
        let mask = build(&generator("none", 0.0, 0.0)).unwrap();
        assert!(mask.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_rect_mask_is_exact_under_identity() {
        let mask = build(&generator("rect", 0.0, 0.0)).unwrap();
        for ((y, x), &v) in mask.data().indexed_iter() {
            let inside = (18..82).contains(&y) && (18..82).contains(&x);
            assert_eq!(v, if inside { 1.0 } else { 0.0 }, "pixel ({x},{y})");
        }
    }

    #[test]
    fn test_hull_and_rect_intersect() {
        let mask = build(&generator("facehullandrect", 0.0, 0.0)).unwrap();
        let data = mask.data();
        assert_eq!(data[[50, 50]], 1.0);
        // Inside the hull but outside the coverage crop
        assert_eq!(data[[55, 12]], 0.0);
        assert_eq!(data[[55, 30]], 1.0);
        assert_eq!(data[[5, 5]], 0.0);
    }

    #[test]
    fn test_smoothed_mask_falls_off() {
        let mask = build(&generator("smoothed", 0.0, 0.0)).unwrap();
        let data = mask.data();
        assert!(data[[50, 50]] > 0.9);
        assert!(data[[50, 50]] > data[[50, 25]]);
        assert!(data[[50, 25]] > data[[50, 10]]);
        assert_eq!(data[[0, 0]], 0.0);
    }

    #[test]
    fn test_ellipse_replaces_mask() {
        let mask = build(&generator("ellipse", 0.0, 0.0)).unwrap();
        let data = mask.data();
        assert_eq!(data[[50, 50]], 1.0);
        assert_eq!(data[[2, 2]], 0.0);
        assert!(data.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_ellipse_on_degenerate_landmarks() {
        let window = CoverageWindow::new(100, 64).unwrap();
        let line = vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0), Point::new(3.0, 3.0)];
        let result = generator("ellipse", 0.0, 0.0).build_mask(
            &AlignmentMatrix::identity(),
            (100, 100),
            &window,
            identity_pair(),
            &line,
        );
        assert!(matches!(
            result,
            Err(crate::error::ConvertError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        for strategy in ["none", "rect", "smoothed", "facehull", "ellipse", "facehullandrect"] {
            for (blur, erosion) in [(0.0, 0.0), (3.0, 2.0), (0.2, -0.1), (7.0, -3.0), (0.5, 0.5)] {
                let mask = build(&generator(strategy, blur, erosion)).unwrap();
                assert!(
                    mask.data().iter().all(|&v| (0.0..=1.0).contains(&v)),
                    "strategy {strategy}, blur {blur}, erosion {erosion}"
                );
            }
        }
    }

    #[test]
    fn test_erosion_and_dilation_change_area() {
        let base = build(&generator("rect", 0.0, 0.0)).unwrap().data().sum();
        let eroded = build(&generator("rect", 0.0, 5.0)).unwrap().data().sum();
        let dilated = build(&generator("rect", 0.0, -5.0)).unwrap().data().sum();
        assert!(eroded < base);
        assert!(dilated > base);
    }

    #[test]
    fn test_blur_softens_edges() {
        let mask = build(&generator("rect", 4.0, 0.0)).unwrap();
        let edge = mask.data()[[50, 18]];
        assert!(edge > 0.0 && edge < 1.0);
        assert_eq!(mask.data()[[50, 50]], 1.0);
    }

    #[test]
    fn test_cnn_strategy_uses_hull() {
        let generator = generator("cnn", 0.0, 0.0);
        assert_eq!(generator.strategy().fallback_from(), Some("cnn"));
        let mask = build(&generator).unwrap();
        let hull_only = build(&self::generator("facehull", 0.0, 0.0)).unwrap();
        assert_eq!(mask, hull_only);
    }
}
