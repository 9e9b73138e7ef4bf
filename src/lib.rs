#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_arguments)]
//! # facepatch
//!
//! Masked face compositing for face-swap pipelines. Given a frame, one
//! detected face (landmarks plus a normalized alignment matrix) and a face
//! encoder, the [`Converter`] warps the face into the encoder's training
//! frame, runs the encoder, warps the generated patch back, builds a blend
//! mask and composites the patch onto the frame.
//!
//! ## Features
//!
//! - **Geometry**: affine alignment into a square training frame with a
//!   configurable coverage window and scale-dependent interpolation
//! - **Mask strategies**: rect, smoothed, face hull, ellipse and their
//!   combinations, with erosion, dilation and blur
//! - **Corrections**: sharpening, mean colour adjustment and histogram matching
//! - **Blending**: linear alpha blending or Poisson seamless cloning
//! - **CLI Integration**: preview tool behind the `cli` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use facepatch::{
//!     AlignmentMatrix, ConvertConfig, Converter, DetectedFace, EncoderBackend, Frame,
//!     IdentityEncoder, Point,
//! };
//!
//! # fn example() -> facepatch::Result<()> {
//! let config = ConvertConfig::builder()
//!     .mask_strategy("facehullandrect")
//!     .seamless_clone(true)
//!     .build()?;
//! let converter = Converter::new(config, EncoderBackend::standard(IdentityEncoder::new()))?;
//!
//! let frame = Frame::from_image(&image::open("frame.png")?);
//! let face = DetectedFace::new(
//!     vec![Point::new(120.0, 140.0), Point::new(180.0, 140.0), Point::new(150.0, 200.0)],
//!     AlignmentMatrix::new([[0.004, 0.0, -0.4], [0.0, 0.004, -0.45]]),
//! );
//!
//! let result = converter.patch_image(&frame, &face)?;
//! result.save("patched.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line preview tool and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod processor;
pub mod synthesis;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::IdentityEncoder;
pub use compositor::Compositor;
pub use config::{ConvertConfig, ConvertConfigBuilder, MaskShape, MaskStrategy, SharpenMode};
pub use error::{ConvertError, Result};
pub use geometry::{
    map_detection, AlignmentMatrix, CoverageWindow, FaceMapping, Interpolation, InterpolatorPair,
};
pub use mask::MaskGenerator;
pub use processor::Converter;
pub use synthesis::{EncoderBackend, FaceEncoder, FnEncoder};
pub use types::{
    DetectedFace, FaceDetection, Frame, Mask, MaskStatistics, PatchResult, PatchTimings, Point,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
