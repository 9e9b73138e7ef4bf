//! Configuration types for face patching operations

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default mask strategy: landmark hull intersected with the coverage rectangle
pub const DEFAULT_MASK_STRATEGY: &str = "facehullandrect";

/// Sharpening applied to the synthesized patch before blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharpenMode {
    /// No sharpening
    #[default]
    None,
    /// 3x3 kernel with centre weight 9 and neighbours -1
    BoxFilter,
    /// Unsharp masking against a Gaussian-blurred copy
    GaussianFilter,
}

impl fmt::Display for SharpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::BoxFilter => write!(f, "box_filter"),
            Self::GaussianFilter => write!(f, "gaussian_filter"),
        }
    }
}

impl std::str::FromStr for SharpenMode {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "box_filter" | "box" => Ok(Self::BoxFilter),
            "gaussian_filter" | "gaussian" => Ok(Self::GaussianFilter),
            other => Err(ConvertError::invalid_config(format!(
                "Unknown sharpen mode '{}'. Expected one of: none, box_filter, gaussian_filter",
                other
            ))),
        }
    }
}

/// Geometric primitive a mask step rasterizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskShape {
    /// Feathered coverage core, blurred in the training frame
    Smoothed,
    /// Coverage rectangle warped into the image
    Rect,
    /// Convex hull of the landmarks
    FaceHull,
    /// Minimum-area ellipse enclosing the landmarks
    Ellipse,
}

impl MaskShape {
    /// How this shape merges into the running mask
    #[must_use]
    pub fn op(self) -> MaskOp {
        match self {
            Self::FaceHull => MaskOp::Combine,
            Self::Smoothed | Self::Rect | Self::Ellipse => MaskOp::Replace,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Smoothed => "smoothed",
            Self::Rect => "rect",
            Self::FaceHull => "facehull",
            Self::Ellipse => "ellipse",
        }
    }
}

/// Merge rule for one mask step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskOp {
    /// Multiply into the running mask
    Combine,
    /// Overwrite the running mask
    Replace,
}

/// One entry of a mask strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskStep {
    pub shape: MaskShape,
    pub op: MaskOp,
}

/// Named mask strategy resolved into an ordered list of steps
///
/// Names are matched by keyword, so `facehullandrect` yields the rectangle
/// followed by the hull intersection. Steps always run in the order
/// smoothed, rect, facehull, ellipse regardless of how the name is spelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MaskStrategy {
    name: String,
    steps: Vec<MaskStep>,
    fallback_from: Option<String>,
}

impl MaskStrategy {
    /// Parse a strategy name
    ///
    /// Names containing `cnn` request a segmentation network mask, which this
    /// crate does not provide; they resolve to `facehull` and remember the
    /// requested name in [`MaskStrategy::fallback_from`].
    ///
    /// # Errors
    /// - Name matches no known strategy keyword
    pub fn parse(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();

        if lowered.contains("cnn") {
            return Ok(Self {
                name: MaskShape::FaceHull.keyword().to_string(),
                steps: vec![MaskStep {
                    shape: MaskShape::FaceHull,
                    op: MaskShape::FaceHull.op(),
                }],
                fallback_from: Some(lowered),
            });
        }

        if lowered == "none" {
            return Ok(Self {
                name: lowered,
                steps: Vec::new(),
                fallback_from: None,
            });
        }

        let steps: Vec<MaskStep> = [
            MaskShape::Smoothed,
            MaskShape::Rect,
            MaskShape::FaceHull,
            MaskShape::Ellipse,
        ]
        .into_iter()
        .filter(|shape| lowered.contains(shape.keyword()))
        .map(|shape| MaskStep {
            shape,
            op: shape.op(),
        })
        .collect();

        if steps.is_empty() {
            return Err(ConvertError::invalid_config(format!(
                "Unknown mask strategy '{}'. Expected a combination of: smoothed, rect, facehull, ellipse (or 'none')",
                name
            )));
        }

        Ok(Self {
            name: lowered,
            steps,
            fallback_from: None,
        })
    }

    /// Effective strategy name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered mask steps
    #[must_use]
    pub fn steps(&self) -> &[MaskStep] {
        &self.steps
    }

    /// Originally requested name when an unsupported strategy was replaced
    #[must_use]
    pub fn fallback_from(&self) -> Option<&str> {
        self.fallback_from.as_deref()
    }
}

impl Default for MaskStrategy {
    fn default() -> Self {
        Self {
            name: DEFAULT_MASK_STRATEGY.to_string(),
            steps: vec![
                MaskStep {
                    shape: MaskShape::Rect,
                    op: MaskOp::Replace,
                },
                MaskStep {
                    shape: MaskShape::FaceHull,
                    op: MaskOp::Combine,
                },
            ],
            fallback_from: None,
        }
    }
}

impl TryFrom<String> for MaskStrategy {
    type Error = ConvertError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MaskStrategy> for String {
    fn from(strategy: MaskStrategy) -> Self {
        strategy.fallback_from.unwrap_or(strategy.name)
    }
}

impl fmt::Display for MaskStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Configuration for the face patching pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConvertConfig {
    /// Mask strategy (default: facehullandrect)
    pub mask_strategy: MaskStrategy,

    /// Box blur size for the mask; values below 1 are relative to the mask area
    pub blur_size: f32,

    /// Erosion (positive) or dilation (negative) size; magnitudes below 1 are
    /// relative to the mask area; 0 disables the stage
    pub erosion_size: f32,

    /// Blend with gradient-domain cloning instead of linear alpha blending
    pub seamless_clone: bool,

    /// Match the patch histogram to the masked original
    pub match_histogram: bool,

    /// Sharpening applied to the patch before blending
    pub sharpen: SharpenMode,

    /// Append an opaque alpha channel to the output (disables seamless clone)
    pub draw_transparent: bool,

    /// Shift the patch mean colour towards the masked original
    pub avg_color_adjust: bool,

    /// Width of the replaced region inside the training frame, in pixels
    pub coverage: u32,

    /// Side of the normalized training frame, in pixels
    pub training_size: u32,

    /// Side of the square patch the encoder consumes, in pixels
    pub input_size: u32,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            mask_strategy: MaskStrategy::default(),
            blur_size: 2.0,
            erosion_size: 0.0,
            seamless_clone: false,
            match_histogram: false,
            sharpen: SharpenMode::None,
            draw_transparent: false,
            avg_color_adjust: false,
            coverage: 160,
            training_size: 256,
            input_size: 64,
        }
    }
}

impl ConvertConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use facepatch::{ConvertConfig, SharpenMode};
    ///
    /// let config = ConvertConfig::builder()
    ///     .mask_strategy("ellipse")
    ///     .sharpen(SharpenMode::BoxFilter)
    ///     .blur_size(0.1)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.mask_strategy.name(), "ellipse");
    /// ```
    #[must_use]
    pub fn builder() -> ConvertConfigBuilder {
        ConvertConfigBuilder::default()
    }

    /// Seamless clone flag after the transparent-output override
    #[must_use]
    pub fn effective_seamless_clone(&self) -> bool {
        self.seamless_clone && !self.draw_transparent
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Training size, coverage or input size out of range
    /// - Negative or non-finite blur size
    /// - Non-finite erosion size
    pub fn validate(&self) -> Result<()> {
        if self.training_size == 0 {
            return Err(ConvertError::config_value_error(
                "training size",
                self.training_size,
                "> 0",
                Some(256),
            ));
        }

        if self.coverage == 0 || self.coverage > self.training_size {
            return Err(ConvertError::config_value_error(
                "coverage",
                self.coverage,
                &format!("1-{}", self.training_size),
                Some(self.training_size.min(160)),
            ));
        }

        if self.input_size == 0 {
            return Err(ConvertError::config_value_error(
                "input size",
                self.input_size,
                "> 0",
                Some(64),
            ));
        }

        if !self.blur_size.is_finite() || self.blur_size < 0.0 {
            return Err(ConvertError::config_value_error(
                "blur size",
                self.blur_size,
                ">= 0",
                Some(2.0),
            ));
        }

        if !self.erosion_size.is_finite() {
            return Err(ConvertError::invalid_config(
                "Invalid erosion size: must be a finite number",
            ));
        }

        Ok(())
    }
}

/// Builder for `ConvertConfig`
#[derive(Debug, Default)]
pub struct ConvertConfigBuilder {
    config: ConvertConfig,
    mask_strategy_name: Option<String>,
}

impl ConvertConfigBuilder {
    /// Set mask strategy by name
    #[must_use]
    pub fn mask_strategy<S: Into<String>>(mut self, name: S) -> Self {
        self.mask_strategy_name = Some(name.into());
        self
    }

    /// Set mask blur size
    #[must_use]
    pub fn blur_size(mut self, blur_size: f32) -> Self {
        self.config.blur_size = blur_size;
        self
    }

    /// Set erosion size
    #[must_use]
    pub fn erosion_size(mut self, erosion_size: f32) -> Self {
        self.config.erosion_size = erosion_size;
        self
    }

    /// Enable or disable seamless cloning
    #[must_use]
    pub fn seamless_clone(mut self, enabled: bool) -> Self {
        self.config.seamless_clone = enabled;
        self
    }

    /// Enable or disable histogram matching
    #[must_use]
    pub fn match_histogram(mut self, enabled: bool) -> Self {
        self.config.match_histogram = enabled;
        self
    }

    /// Set sharpening mode
    #[must_use]
    pub fn sharpen(mut self, mode: SharpenMode) -> Self {
        self.config.sharpen = mode;
        self
    }

    /// Enable or disable transparent output
    #[must_use]
    pub fn draw_transparent(mut self, enabled: bool) -> Self {
        self.config.draw_transparent = enabled;
        self
    }

    /// Enable or disable average colour adjustment
    #[must_use]
    pub fn avg_color_adjust(mut self, enabled: bool) -> Self {
        self.config.avg_color_adjust = enabled;
        self
    }

    /// Set coverage width
    #[must_use]
    pub fn coverage(mut self, coverage: u32) -> Self {
        self.config.coverage = coverage;
        self
    }

    /// Set training frame size
    #[must_use]
    pub fn training_size(mut self, training_size: u32) -> Self {
        self.config.training_size = training_size;
        self
    }

    /// Set encoder input size
    #[must_use]
    pub fn input_size(mut self, input_size: u32) -> Self {
        self.config.input_size = input_size;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Unknown mask strategy name
    /// - Any [`ConvertConfig::validate`] failure
    pub fn build(mut self) -> Result<ConvertConfig> {
        if let Some(name) = self.mask_strategy_name.take() {
            self.config.mask_strategy = MaskStrategy::parse(&name)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
