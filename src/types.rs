//! Core types for face patching operations

use crate::{
    error::{ConvertError, Result},
    geometry::AlignmentMatrix,
};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 2-D landmark position in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Read-only view of a detected face supplied by the external aligner
pub trait FaceDetection {
    /// Ordered landmark points in image coordinates
    fn landmarks(&self) -> &[Point];

    /// Unit-normalized alignment matrix (image → unit training square)
    fn alignment(&self) -> AlignmentMatrix;
}

/// Plain detection record, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub landmarks: Vec<Point>,
    pub alignment: AlignmentMatrix,
}

impl DetectedFace {
    #[must_use]
    pub fn new(landmarks: Vec<Point>, alignment: AlignmentMatrix) -> Self {
        Self {
            landmarks,
            alignment,
        }
    }
}

impl FaceDetection for DetectedFace {
    fn landmarks(&self) -> &[Point] {
        &self.landmarks
    }

    fn alignment(&self) -> AlignmentMatrix {
        self.alignment
    }
}

/// H×W×C float image with samples in the 0-255 range
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    data: Array3<f32>,
}

impl Frame {
    /// Wrap an array, validating that it has 3 or 4 channels
    pub fn from_array(data: Array3<f32>) -> Result<Self> {
        let (height, width, channels) = data.dim();
        if height == 0 || width == 0 {
            return Err(ConvertError::shape_mismatch(
                "frame size",
                "non-empty height and width",
                (height, width),
            ));
        }
        if channels != 3 && channels != 4 {
            return Err(ConvertError::shape_mismatch(
                "frame channels",
                "3 or 4",
                channels,
            ));
        }
        Ok(Self { data })
    }

    /// Convert an image to a 3-channel frame
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let data = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[c])
        });
        Self { data }
    }

    #[must_use]
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    #[must_use]
    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// `(height, width, channels)`
    #[must_use]
    pub fn dims(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Convert to an 8-bit image, clamping and rounding each sample
    pub fn to_dynamic_image(&self) -> Result<DynamicImage> {
        let bytes = self.data.mapv(|v| v.clamp(0.0, 255.0).round() as u8);
        array_to_image(&bytes)
    }
}

fn array_to_image(data: &Array3<u8>) -> Result<DynamicImage> {
    let (height, width, channels) = data.dim();
    let raw: Vec<u8> = data.iter().copied().collect();
    let image = match channels {
        3 => RgbImage::from_raw(width as u32, height as u32, raw).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width as u32, height as u32, raw).map(DynamicImage::ImageRgba8),
        other => {
            return Err(ConvertError::shape_mismatch("image channels", "3 or 4", other));
        },
    };
    image.ok_or_else(|| ConvertError::processing("Failed to create image from frame data"))
}

/// Blend mask, one weight in [0, 1] per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array2<f32>,
}

impl Mask {
    #[must_use]
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Fully opaque mask of `(height, width)`
    #[must_use]
    pub fn ones(height: usize, width: usize) -> Self {
        Self {
            data: Array2::ones((height, width)),
        }
    }

    #[must_use]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    #[must_use]
    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    /// `(height, width)`
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let opaque_pixels = self.data.iter().filter(|&&v| v >= 1.0).count();
        let transparent_pixels = self.data.iter().filter(|&&v| v <= 0.0).count();
        let coverage = if total_pixels == 0 {
            0.0
        } else {
            self.data.sum() / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            opaque_pixels,
            transparent_pixels,
            partial_pixels: total_pixels - opaque_pixels - transparent_pixels,
            coverage,
        }
    }

    /// Convert mask to an 8-bit grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        let (height, width) = self.data.dim();
        let raw: Vec<u8> = self
            .data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        GrayImage::from_raw(width as u32, height as u32, raw)
            .ok_or_else(|| ConvertError::processing("Failed to create image from mask data"))
    }

    /// Save mask as PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let image = self.to_image()?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Statistics about a blend mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub opaque_pixels: usize,
    pub transparent_pixels: usize,
    pub partial_pixels: usize,
    /// Mean mask weight
    pub coverage: f32,
}

/// Per-stage timing breakdown in microseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTimings {
    pub mapping_us: u64,
    pub synthesis_us: u64,
    pub mask_us: u64,
    pub composite_us: u64,
    pub total_us: u64,
}

impl PatchTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of the total spent in the encoder-driven synthesis stage
    #[must_use]
    pub fn synthesis_ratio(&self) -> f64 {
        if self.total_us == 0 {
            0.0
        } else {
            self.synthesis_us as f64 / self.total_us as f64
        }
    }

    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {:.2}ms | Mapping: {:.2}ms | Synthesis: {:.2}ms | Mask: {:.2}ms | Composite: {:.2}ms",
            self.total_us as f64 / 1000.0,
            self.mapping_us as f64 / 1000.0,
            self.synthesis_us as f64 / 1000.0,
            self.mask_us as f64 / 1000.0,
            self.composite_us as f64 / 1000.0,
        )
    }
}

/// Result of patching one face into a frame
#[derive(Debug, Clone)]
pub struct PatchResult {
    /// Composited frame, same height and width as the input, 3 or 4 channels
    pub image: Array3<u8>,

    /// Mask used for blending
    pub mask: Mask,

    /// Stage timings
    pub timings: PatchTimings,
}

impl PatchResult {
    #[must_use]
    pub fn new(image: Array3<u8>, mask: Mask, timings: PatchTimings) -> Self {
        Self {
            image,
            mask,
            timings,
        }
    }

    /// `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width, _) = self.image.dim();
        (width as u32, height as u32)
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.image.dim().2 == 4
    }

    /// Convert the output to an `image` buffer (RGB or RGBA)
    pub fn to_dynamic_image(&self) -> Result<DynamicImage> {
        array_to_image(&self.image)
    }

    /// Save the output; the format follows the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let image = self.to_dynamic_image()?;
        let is_jpeg = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));

        if is_jpeg && self.has_alpha() {
            DynamicImage::ImageRgb8(image.to_rgb8()).save(path)?;
        } else {
            image.save(path)?;
        }
        Ok(())
    }
}
