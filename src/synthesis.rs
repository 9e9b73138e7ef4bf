//! Patch synthesis: crop the aligned face, run the encoder, warp the result back
//!
//! The encoder sees an `input_size × input_size × 3` patch scaled to [0, 1]
//! and answers with a patch of the same shape. Everything else in this module
//! is resampling around that call.

use crate::{
    error::{ConvertError, Result},
    geometry::{AlignmentMatrix, CoverageWindow, Interpolation, InterpolatorPair},
    utils::warp::{self, BorderMode},
};
use ndarray::{s, Array3};
use tracing::{debug, span, Level};

/// Face synthesis model consumed by the pipeline
///
/// Implementations must be pure with respect to their input; the same
/// encoder may be driven from several threads at once.
pub trait FaceEncoder: Send + Sync {
    /// Map a normalized face patch to its replacement
    fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Adapter turning a closure into a [`FaceEncoder`]
pub struct FnEncoder<F>(pub F);

impl<F> FaceEncoder for FnEncoder<F>
where
    F: Fn(&Array3<f32>) -> Result<Array3<f32>> + Send + Sync,
{
    fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>> {
        (self.0)(face)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// Encoder capability handed to the converter
pub enum EncoderBackend {
    /// Autoencoder-style model behind the [`FaceEncoder`] trait
    Standard(Box<dyn FaceEncoder>),
    /// Generative adversarial model; not supported by this pipeline
    Gan,
}

impl EncoderBackend {
    /// Wrap a standard encoder
    pub fn standard<E: FaceEncoder + 'static>(encoder: E) -> Self {
        Self::Standard(Box::new(encoder))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Standard(encoder) => encoder.name(),
            Self::Gan => "gan",
        }
    }

    /// Run the encoder and check the output shape
    ///
    /// # Errors
    /// - `UnsupportedEncoder` for the GAN variant
    /// - Whatever the encoder reports
    /// - `ShapeMismatch` when the output shape differs from the input
    pub fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>> {
        let encoder = match self {
            Self::Standard(encoder) => encoder,
            Self::Gan => {
                return Err(ConvertError::UnsupportedEncoder(
                    "GAN encoders are not supported by the masked converter".to_string(),
                ));
            },
        };

        let output = encoder.encode(face)?;
        if output.dim() != face.dim() {
            return Err(ConvertError::shape_mismatch(
                format!("encoder '{}' output", encoder.name()),
                face.dim(),
                output.dim(),
            ));
        }
        Ok(output)
    }
}

impl std::fmt::Debug for EncoderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard(encoder) => f.debug_tuple("Standard").field(&encoder.name()).finish(),
            Self::Gan => write!(f, "Gan"),
        }
    }
}

/// Synthesize the replacement face and warp it onto a copy of `image`
///
/// `matrix` maps image coordinates into the training frame. Pixels of the
/// result that fall outside the warped training frame keep the original
/// image values.
///
/// # Errors
/// - `matrix` is not invertible
/// - Encoder failures, including shape mismatches
pub fn synthesize(
    image: &Array3<f32>,
    matrix: &AlignmentMatrix,
    window: &CoverageWindow,
    input_size: usize,
    interpolators: InterpolatorPair,
    encoder: &EncoderBackend,
) -> Result<Array3<f32>> {
    let (height, width, _) = image.dim();
    let size = window.training_size();
    let crop = window.crop_range();
    let crop_size = window.crop_size();

    let mut normalized = {
        let _span = span!(Level::DEBUG, "align_face", size).entered();
        warp::warp_affine(image.view(), matrix, (size, size), interpolators.forward, 0.0)?
    };

    let face = {
        let _span = span!(Level::DEBUG, "prepare_input", input_size).entered();
        let cropped = normalized.slice(s![crop.clone(), crop.clone(), ..]);
        let resized = warp::resize(cropped, (input_size, input_size), interpolators.forward)?;
        resized.mapv(|v| (v / 255.0).clamp(0.0, 1.0))
    };

    let generated = {
        let _span = span!(Level::DEBUG, "encode", encoder = encoder.name()).entered();
        encoder.encode(&face)?
    };

    {
        let _span = span!(Level::DEBUG, "restore_patch", crop_size).entered();
        let restored = warp::resize(generated.view(), (crop_size, crop_size), Interpolation::Cubic)?
            .mapv(|v| (v * 255.0).clamp(0.0, 255.0));
        normalized
            .slice_mut(s![crop.clone(), crop, ..])
            .assign(&restored);
    }

    let mut output = image.clone();
    {
        let _span = span!(Level::DEBUG, "warp_back", width, height).entered();
        warp::remap_affine(
            normalized.view(),
            matrix,
            &mut output,
            interpolators.inverse,
            BorderMode::Transparent,
        )?;
    }

    debug!(
        "Synthesized {}x{} patch through '{}'",
        crop_size,
        crop_size,
        encoder.name()
    );
    Ok(output)
}
