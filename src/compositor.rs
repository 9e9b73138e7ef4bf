//! Colour correction and blending of the synthesized face into the frame

use crate::{
    config::{ConvertConfig, SharpenMode},
    error::{ConvertError, Result},
    types::Mask,
    utils::{filters, histogram, poisson},
};
use ndarray::{concatenate, s, Array2, Array3, ArrayViewMut3, Axis};
use tracing::{debug, span, warn, Level};

const COLOR_CHANNELS: usize = 3;
const OPAQUE_ALPHA: f32 = 255.0;

const BOX_SHARPEN_KERNEL: [[f32; 3]; 3] =
    [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];
const GAUSSIAN_SHARPEN_SIZE: usize = 25;
const GAUSSIAN_SHARPEN_SIGMA: f64 = 3.0;
const AVERAGE_COLOR_PASSES: usize = 2;

/// Applies corrections to the warped patch and blends it over the original
#[derive(Debug, Clone)]
pub struct Compositor {
    sharpen: SharpenMode,
    avg_color_adjust: bool,
    match_histogram: bool,
    seamless_clone: bool,
    draw_transparent: bool,
}

impl Compositor {
    /// Create a compositor from the converter configuration
    #[must_use]
    pub fn new(config: &ConvertConfig) -> Self {
        if config.seamless_clone && config.draw_transparent {
            warn!("Seamless clone is disabled while drawing transparent output");
        }

        Self {
            sharpen: config.sharpen,
            avg_color_adjust: config.avg_color_adjust,
            match_histogram: config.match_histogram,
            seamless_clone: config.effective_seamless_clone(),
            draw_transparent: config.draw_transparent,
        }
    }

    /// Whether blending uses gradient-domain cloning
    #[must_use]
    pub fn uses_seamless_clone(&self) -> bool {
        self.seamless_clone
    }

    /// Correct `warped` and blend it over `original` through `mask`
    ///
    /// Both frames are H×W×3 with samples nominally in 0-255; `warped` may
    /// hold values outside that range. The result has 4 channels when
    /// transparent output is enabled.
    ///
    /// # Errors
    /// - `ShapeMismatch` when frames or mask disagree
    /// - `EmptyMask` when seamless cloning with a fully transparent mask
    pub fn composite(
        &self,
        original: &Array3<f32>,
        warped: &Array3<f32>,
        mask: &Mask,
    ) -> Result<Array3<u8>> {
        let (height, width, channels) = original.dim();
        if channels != COLOR_CHANNELS {
            return Err(ConvertError::shape_mismatch(
                "compositor original frame",
                (height, width, COLOR_CHANNELS),
                original.dim(),
            ));
        }
        if warped.dim() != original.dim() {
            return Err(ConvertError::shape_mismatch(
                "compositor warped frame",
                original.dim(),
                warped.dim(),
            ));
        }
        if mask.dims() != (height, width) {
            return Err(ConvertError::shape_mismatch(
                "compositor mask",
                (height, width),
                mask.dims(),
            ));
        }

        let (mut original, mut warped) = (original.clone(), warped.clone());
        if self.draw_transparent {
            original = with_constant_plane(&original, OPAQUE_ALPHA)?;
            warped = with_constant_plane(&warped, OPAQUE_ALPHA)?;
        }
        let weights = Array3::from_shape_fn(original.dim(), |(y, x, c)| {
            if c < COLOR_CHANNELS {
                mask.data()[[y, x]]
            } else {
                1.0
            }
        });
        if warped.dim() != original.dim() {
            return Err(ConvertError::shape_mismatch(
                "transparent output planes",
                original.dim(),
                warped.dim(),
            ));
        }

        {
            let color = warped.slice_mut(s![.., .., ..COLOR_CHANNELS]);
            self.apply_corrections(color, &original, mask.data());
        }

        let blended = {
            let _span = span!(Level::DEBUG, "blend", seamless = self.seamless_clone).entered();
            if self.seamless_clone {
                seamless_blend(&original, &warped, mask.data())?
            } else {
                linear_blend(&original, &warped, &weights)
            }
        };

        // Ties round to even
        Ok(blended.mapv(|v| v.clamp(0.0, 255.0).round_ties_even() as u8))
    }

    fn apply_corrections(
        &self,
        mut warped: ArrayViewMut3<f32>,
        original: &Array3<f32>,
        mask: &Array2<f32>,
    ) {
        if self.sharpen != SharpenMode::None {
            let _span = span!(Level::DEBUG, "sharpen", mode = %self.sharpen).entered();
            sharpen(&mut warped, self.sharpen);
        }

        if self.avg_color_adjust {
            let _span = span!(Level::DEBUG, "average_color").entered();
            adjust_average_color(&mut warped, original, mask);
        }

        if self.match_histogram {
            let _span = span!(Level::DEBUG, "match_histogram").entered();
            match_channel_histograms(&mut warped, original, mask);
        }
    }
}

fn with_constant_plane(frame: &Array3<f32>, value: f32) -> Result<Array3<f32>> {
    let (height, width, _) = frame.dim();
    let plane = Array3::from_elem((height, width, 1), value);
    Ok(concatenate(Axis(2), &[frame.view(), plane.view()])?)
}

fn sharpen(warped: &mut ArrayViewMut3<f32>, mode: SharpenMode) {
    warped.mapv_inplace(|v| v.clamp(0.0, 255.0));
    for mut channel in warped.axis_iter_mut(Axis(2)) {
        let filtered = match mode {
            SharpenMode::None => continue,
            SharpenMode::BoxFilter => filters::filter3x3(channel.view(), &BOX_SHARPEN_KERNEL),
            SharpenMode::GaussianFilter => {
                let blurred = filters::gaussian_blur(
                    channel.view(),
                    GAUSSIAN_SHARPEN_SIZE,
                    GAUSSIAN_SHARPEN_SIGMA,
                );
                &channel * 1.5 - &blurred * 0.5
            },
        };
        channel.assign(&filtered);
    }
}

fn adjust_average_color(
    warped: &mut ArrayViewMut3<f32>,
    original: &Array3<f32>,
    mask: &Array2<f32>,
) {
    let total_weight: f64 = mask.iter().map(|&w| f64::from(w)).sum();
    if total_weight <= 0.0 {
        warn!("Mask is empty; skipping average colour adjustment");
        return;
    }

    for _ in 0..AVERAGE_COLOR_PASSES {
        warped.mapv_inplace(|v| v.clamp(0.0, 255.0));
        for c in 0..COLOR_CHANNELS {
            let mut weighted_diff = 0.0_f64;
            for ((y, x), &w) in mask.indexed_iter() {
                weighted_diff +=
                    f64::from(original[[y, x, c]] - warped[[y, x, c]]) * f64::from(w);
            }
            let adjustment = (weighted_diff / total_weight) as f32;
            warped
                .index_axis_mut(Axis(2), c)
                .mapv_inplace(|v| v + adjustment);
        }
    }
}

fn match_channel_histograms(
    warped: &mut ArrayViewMut3<f32>,
    original: &Array3<f32>,
    mask: &Array2<f32>,
) {
    let masked_pixels = mask.iter().filter(|&&w| w > 0.0).count();
    if masked_pixels == 0 {
        debug!("Mask is empty; matching against the whole original channel");
    }

    for c in 0..COLOR_CHANNELS {
        let template: Vec<f32> = original
            .index_axis(Axis(2), c)
            .iter()
            .zip(mask.iter())
            .filter(|&(_, &w)| masked_pixels == 0 || w > 0.0)
            .map(|(&v, _)| v)
            .collect();

        let mut channel = warped.index_axis_mut(Axis(2), c);
        let source: Vec<f32> = channel.iter().copied().collect();
        let matched = histogram::match_histogram(&source, &template);
        for (slot, value) in channel.iter_mut().zip(matched) {
            *slot = value;
        }
    }
}

fn linear_blend(
    original: &Array3<f32>,
    warped: &Array3<f32>,
    weights: &Array3<f32>,
) -> Array3<f32> {
    Array3::from_shape_fn(original.dim(), |(y, x, c)| {
        let w = weights[[y, x, c]];
        warped[[y, x, c]] * w + original[[y, x, c]] * (1.0 - w)
    })
}

/// Inclusive bounding box `(min_y, max_y, min_x, max_x)` of non-zero mask pixels
fn mask_bounds(mask: &Array2<f32>) -> Option<(usize, usize, usize, usize)> {
    mask.indexed_iter()
        .filter(|&(_, &w)| w > 0.0)
        .fold(None, |acc, ((y, x), _)| match acc {
            None => Some((y, y, x, x)),
            Some((y0, y1, x0, x1)) => Some((y0.min(y), y1.max(y), x0.min(x), x1.max(x))),
        })
}

fn seamless_blend(
    original: &Array3<f32>,
    warped: &Array3<f32>,
    mask: &Array2<f32>,
) -> Result<Array3<f32>> {
    let (height, width, channels) = original.dim();
    let (min_y, max_y, min_x, max_x) = mask_bounds(mask).ok_or_else(|| {
        ConvertError::empty_mask("seamless clone needs at least one non-zero mask pixel")
    })?;

    let insertion = warped
        .slice(s![min_y..=max_y, min_x..=max_x, ..])
        .mapv(|v| v.clamp(0.0, 255.0).round());
    let region = mask
        .slice(s![min_y..=max_y, min_x..=max_x])
        .mapv(|w| w > 0.0);

    let (pad_y, pad_x) = (height / 2, width / 2);
    let mut canvas = Array3::<f32>::zeros((height + 2 * pad_y, width + 2 * pad_x, channels));
    canvas
        .slice_mut(s![pad_y..pad_y + height, pad_x..pad_x + width, ..])
        .assign(&original.mapv(|v| v.clamp(0.0, 255.0).round()));

    let center = ((min_x + max_x) / 2 + pad_x, (min_y + max_y) / 2 + pad_y);
    debug!(
        "Seamless clone of {}x{} region centred at ({}, {})",
        max_x - min_x + 1,
        max_y - min_y + 1,
        center.0,
        center.1
    );

    let blended = poisson::seamless_clone(
        insertion.view(),
        &canvas,
        &region,
        (min_y + pad_y, min_x + pad_x),
    )?;

    Ok(blended
        .slice(s![pad_y..pad_y + height, pad_x..pad_x + width, ..])
        .to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfigBuilder;

    fn compositor(
        configure: impl FnOnce(ConvertConfigBuilder) -> ConvertConfigBuilder,
    ) -> Compositor {
        let config = configure(ConvertConfig::builder()).build().unwrap();
        Compositor::new(&config)
    }

    fn block_mask(
        height: usize,
        width: usize,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> Mask {
        let mut data = Array2::<f32>::zeros((height, width));
        data.slice_mut(s![rows, cols]).fill(1.0);
        Mask::new(data)
    }

    fn wavy(height: usize, width: usize) -> Array3<f32> {
        Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            (120.0 + 90.0 * (0.9 * x as f64).sin() * (0.7 * y as f64).cos()) as f32 + c as f32 * 3.0
        })
    }

    #[test]
    fn test_linear_blend_respects_mask() {
        let original = Array3::from_elem((10, 10, 3), 50.0_f32);
        let warped = Array3::from_elem((10, 10, 3), 200.0_f32);
        let mut data = block_mask(10, 10, 2..8, 2..8).into_array();
        data[[0, 0]] = 0.5;

        let out = compositor(|b| b)
            .composite(&original, &warped, &Mask::new(data))
            .unwrap();
        assert_eq!(out[[5, 5, 0]], 200);
        assert_eq!(out[[9, 9, 2]], 50);
        assert_eq!(out[[0, 0, 1]], 125);
    }

    #[test]
    fn test_half_way_samples_round_to_even() {
        let split = |low: f32, high: f32| {
            Array3::from_shape_fn((4, 4, 3), move |(y, _, _)| if y < 2 { low } else { high })
        };
        let original = split(0.0, 1.0);
        let warped = split(253.0, 254.0);
        let mask = Mask::new(Array2::from_elem((4, 4), 0.5));

        let out = compositor(|b| b).composite(&original, &warped, &mask).unwrap();
        assert_eq!(out[[0, 0, 0]], 126);
        assert_eq!(out[[3, 3, 2]], 128);
    }

    #[test]
    fn test_unclamped_inputs_stay_in_byte_range() {
        let original = Array3::from_shape_fn((12, 12, 3), |(y, x, _)| (x * 20 + y) as f32);
        let warped = Array3::from_shape_fn((12, 12, 3), |(y, x, c)| {
            (x as f32 - 6.0) * 200.0 + (y * c) as f32 * 40.0
        });
        let mask = block_mask(12, 12, 2..10, 2..10);

        let linear = compositor(|b| b).composite(&original, &warped, &mask).unwrap();
        assert_eq!(linear[[5, 9, 0]], 255);
        assert_eq!(linear[[5, 2, 0]], 0);

        let seamless = compositor(|b| b.seamless_clone(true))
            .composite(&original, &warped, &mask)
            .unwrap();
        assert_eq!(seamless.dim(), (12, 12, 3));
    }

    #[test]
    fn test_seamless_clone_places_region_exactly() {
        let original = wavy(24, 24);
        let mask = block_mask(24, 24, 6..17, 5..16);

        let out = compositor(|b| b.seamless_clone(true))
            .composite(&original, &original, &mask)
            .unwrap();

        for ((y, x, c), &v) in out.indexed_iter() {
            let expected = original[[y, x, c]].clamp(0.0, 255.0).round();
            assert!(
                (f32::from(v) - expected).abs() <= 1.0,
                "pixel ({x},{y},{c}): {v} vs {expected}"
            );
        }
    }

    #[test]
    fn test_seamless_clone_with_empty_mask() {
        let frame = Array3::from_elem((8, 8, 3), 10.0_f32);
        let mask = Mask::new(Array2::zeros((8, 8)));
        let result = compositor(|b| b.seamless_clone(true)).composite(&frame, &frame, &mask);
        assert!(matches!(result, Err(ConvertError::EmptyMask(_))));
    }

    #[test]
    fn test_transparent_output_is_opaque_and_skips_seamless() {
        let frame = Array3::from_elem((8, 8, 3), 10.0_f32);
        let mask = Mask::new(Array2::zeros((8, 8)));
        let compositor = compositor(|b| b.seamless_clone(true).draw_transparent(true));
        assert!(!compositor.uses_seamless_clone());

        let out = compositor.composite(&frame, &frame, &mask).unwrap();
        assert_eq!(out.dim(), (8, 8, 4));
        assert!(out.index_axis(Axis(2), 3).iter().all(|&a| a == 255));
        assert!(out.index_axis(Axis(2), 0).iter().all(|&v| v == 10));
    }

    #[test]
    fn test_average_color_adjustment_removes_offset() {
        let original = wavy(16, 16);
        let warped = original.mapv(|v| v - 30.0);
        let mask = block_mask(16, 16, 3..13, 3..13);

        let plain = compositor(|b| b).composite(&original, &warped, &mask).unwrap();
        let adjusted = compositor(|b| b.avg_color_adjust(true))
            .composite(&original, &warped, &mask)
            .unwrap();

        let masked_error = |out: &Array3<u8>| -> f32 {
            let mut total = 0.0;
            for y in 3..13 {
                for x in 3..13 {
                    for c in 0..3 {
                        total += (f32::from(out[[y, x, c]]) - original[[y, x, c]]).abs();
                    }
                }
            }
            total / 300.0
        };
        assert!(masked_error(&adjusted) < masked_error(&plain));
        assert!(masked_error(&adjusted) < 1.0);
    }

    #[test]
    fn test_histogram_matching_against_same_frame_is_identity() {
        let original = wavy(10, 10);
        let mask = Mask::ones(10, 10);
        let matched = compositor(|b| b.match_histogram(true))
            .composite(&original, &original, &mask)
            .unwrap();
        let plain = compositor(|b| b).composite(&original, &original, &mask).unwrap();
        assert_eq!(matched, plain);
    }

    #[test]
    fn test_sharpening_keeps_flat_regions() {
        let frame = Array3::from_elem((12, 12, 3), 90.0_f32);
        let mask = Mask::ones(12, 12);
        for mode in [SharpenMode::BoxFilter, SharpenMode::GaussianFilter] {
            let out = compositor(|b| b.sharpen(mode))
                .composite(&frame, &frame, &mask)
                .unwrap();
            assert!(out.iter().all(|&v| v == 90), "{mode}");
        }
    }

    #[test]
    fn test_box_sharpen_boosts_edges() {
        let frame = Array3::from_shape_fn((8, 8, 3), |(_, x, _)| if x < 4 { 60.0 } else { 120.0 });
        let mask = Mask::ones(8, 8);
        let out = compositor(|b| b.sharpen(SharpenMode::BoxFilter))
            .composite(&frame, &frame, &mask)
            .unwrap();
        assert!(out[[4, 3, 0]] < 60);
        assert!(out[[4, 4, 0]] > 120);
    }

    #[test]
    fn test_shape_validation() {
        let compositor = compositor(|b| b);
        let rgb = Array3::<f32>::zeros((6, 6, 3));
        let rgba = Array3::<f32>::zeros((6, 6, 4));
        let other = Array3::<f32>::zeros((6, 5, 3));
        let mask = Mask::ones(6, 6);

        assert!(matches!(
            compositor.composite(&rgba, &rgba, &Mask::ones(6, 6)),
            Err(ConvertError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            compositor.composite(&rgb, &other, &mask),
            Err(ConvertError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            compositor.composite(&rgb, &rgb, &Mask::ones(5, 6)),
            Err(ConvertError::ShapeMismatch { .. })
        ));
    }
}
