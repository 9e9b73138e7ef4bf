//! Face patching pipeline
//!
//! [`Converter`] owns the per-configuration state (mask generator, compositor,
//! encoder) and runs the four stages for one frame and one detected face:
//! mapping, synthesis, mask generation and compositing.

use crate::{
    compositor::Compositor,
    config::ConvertConfig,
    error::{ConvertError, Result},
    geometry::{self, CoverageWindow},
    mask::MaskGenerator,
    synthesis::{self, EncoderBackend},
    types::{FaceDetection, Frame, PatchResult, PatchTimings},
};
use instant::Instant;
use tracing::{debug, info, instrument, span, Level};

const FRAME_CHANNELS: usize = 3;

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Converts faces in frames through a face encoder
///
/// A converter is immutable once built, so one instance can patch frames
/// from several threads at once.
#[derive(Debug)]
pub struct Converter {
    config: ConvertConfig,
    window: CoverageWindow,
    mask_generator: MaskGenerator,
    compositor: Compositor,
    encoder: EncoderBackend,
}

impl Converter {
    /// Create a converter for `config`
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn new(config: ConvertConfig, encoder: EncoderBackend) -> Result<Self> {
        config.validate()?;
        let window = CoverageWindow::new(config.training_size, config.coverage)?;

        info!(
            encoder = encoder.name(),
            strategy = %config.mask_strategy,
            training_size = config.training_size,
            coverage = config.coverage,
            "Initializing face converter"
        );

        Ok(Self {
            mask_generator: MaskGenerator::new(&config),
            compositor: Compositor::new(&config),
            window,
            encoder,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    #[must_use]
    pub fn coverage_window(&self) -> &CoverageWindow {
        &self.window
    }

    #[must_use]
    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    /// Replace the detected face in `image` with the encoder's rendition
    ///
    /// The returned frame has the input's height and width and 3 channels,
    /// or 4 when transparent output is configured.
    ///
    /// # Errors
    /// - `ShapeMismatch` when `image` is not a 3-channel frame
    /// - `DegenerateGeometry` for a non-invertible alignment or ellipse fit
    /// - `UnsupportedEncoder` or `Encoder` from the synthesis stage
    /// - `EmptyMask` when seamless cloning with a fully transparent mask
    #[instrument(
        skip_all,
        fields(
            width = image.dims().1,
            height = image.dims().0,
            strategy = %self.config.mask_strategy
        )
    )]
    pub fn patch_image(&self, image: &Frame, detection: &dyn FaceDetection) -> Result<PatchResult> {
        let (height, width, channels) = image.dims();
        if channels != FRAME_CHANNELS {
            return Err(ConvertError::shape_mismatch(
                "input frame",
                (height, width, FRAME_CHANNELS),
                image.dims(),
            ));
        }

        let mut timings = PatchTimings::new();
        let total_start = Instant::now();
        let original = image.data();

        let mapping = {
            let _span = span!(Level::DEBUG, "mapping").entered();
            let start = Instant::now();
            let mapping = geometry::map_detection(detection, &self.window)?;
            timings.mapping_us = elapsed_us(start);
            mapping
        };

        debug!(
            forward = %mapping.interpolators.forward,
            inverse = %mapping.interpolators.inverse,
            "Selected interpolators"
        );

        let warped = {
            let _span = span!(Level::DEBUG, "synthesis", encoder = self.encoder.name()).entered();
            let start = Instant::now();
            let warped = synthesis::synthesize(
                original,
                &mapping.matrix,
                &mapping.window,
                self.config.input_size as usize,
                mapping.interpolators,
                &self.encoder,
            )?;
            timings.synthesis_us = elapsed_us(start);
            warped
        };

        let mask = {
            let _span =
                span!(Level::DEBUG, "mask", strategy = %self.config.mask_strategy).entered();
            let start = Instant::now();
            let mask = self.mask_generator.build_mask(
                &mapping.matrix,
                (height, width),
                &mapping.window,
                mapping.interpolators,
                detection.landmarks(),
            )?;
            timings.mask_us = elapsed_us(start);
            mask
        };

        let composited = {
            let _span = span!(
                Level::DEBUG,
                "composite",
                seamless = self.compositor.uses_seamless_clone()
            )
            .entered();
            let start = Instant::now();
            let composited = self.compositor.composite(original, &warped, &mask)?;
            timings.composite_us = elapsed_us(start);
            composited
        };

        timings.total_us = elapsed_us(total_start);
        debug!("Patched face: {}", timings.summary());

        Ok(PatchResult::new(composited, mask, timings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::test_utils::{
            CallRecordingEncoder, ConstantEncoder, FailingEncoder, OffsetEncoder,
        },
        config::ConvertConfigBuilder,
        geometry::AlignmentMatrix,
        types::{DetectedFace, Point},
    };
    use ndarray::Array3;

    // Normalized alignment that becomes the identity for a 100 px training
    // frame with coverage 64
    fn identity_detection() -> DetectedFace {
        let scale = 1.0 / 64.0;
        DetectedFace::new(
            vec![
                Point::new(30.0, 25.0),
                Point::new(70.0, 25.0),
                Point::new(90.0, 55.0),
                Point::new(50.0, 80.0),
                Point::new(10.0, 55.0),
            ],
            AlignmentMatrix::new([[scale, 0.0, -18.0 * scale], [0.0, scale, -18.0 * scale]]),
        )
    }

    fn converter(
        configure: impl FnOnce(ConvertConfigBuilder) -> ConvertConfigBuilder,
        encoder: EncoderBackend,
    ) -> Converter {
        let builder = ConvertConfig::builder()
            .training_size(100)
            .coverage(64)
            .input_size(32)
            .blur_size(0.0);
        Converter::new(configure(builder).build().unwrap(), encoder).unwrap()
    }

    fn gray_frame(value: f32) -> Frame {
        Frame::from_array(Array3::from_elem((100, 100, 3), value)).unwrap()
    }

    #[test]
    fn test_converter_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Converter>();
    }

    #[test]
    fn test_identity_patch_keeps_gray_frame() {
        let converter = converter(
            |b| b.mask_strategy("rect"),
            EncoderBackend::standard(CallRecordingEncoder::new()),
        );
        let result = converter
            .patch_image(&gray_frame(128.0), &identity_detection())
            .unwrap();

        assert_eq!(result.image.dim(), (100, 100, 3));
        assert!(result.image.iter().all(|&v| v == 128));
    }

    #[test]
    fn test_rect_mask_limits_the_patch() {
        let converter = converter(
            |b| b.mask_strategy("rect"),
            EncoderBackend::standard(ConstantEncoder::new(0.0)),
        );
        let result = converter
            .patch_image(&gray_frame(200.0), &identity_detection())
            .unwrap();

        assert_eq!(result.image[[50, 50, 0]], 0);
        assert_eq!(result.image[[5, 5, 1]], 200);
        assert_eq!(result.image[[95, 50, 2]], 200);
        assert_eq!(result.mask.data()[[50, 50]], 1.0);
        assert_eq!(result.mask.data()[[5, 5]], 0.0);
    }

    #[test]
    fn test_average_color_adjustment_cancels_encoder_offset() {
        let plain = converter(
            |b| b.mask_strategy("rect"),
            EncoderBackend::standard(OffsetEncoder::new(0.2)),
        );
        let adjusted = converter(
            |b| b.mask_strategy("rect").avg_color_adjust(true),
            EncoderBackend::standard(OffsetEncoder::new(0.2)),
        );

        let shifted = plain.patch_image(&gray_frame(100.0), &identity_detection()).unwrap();
        let corrected = adjusted
            .patch_image(&gray_frame(100.0), &identity_detection())
            .unwrap();
        assert!(shifted.image[[50, 50, 0]].abs_diff(151) <= 1);
        assert!(corrected.image[[50, 50, 0]].abs_diff(100) <= 1);
        assert_eq!(corrected.image[[5, 5, 1]], 100);
    }

    #[test]
    fn test_encoder_sees_configured_input_size() {
        let recorder = CallRecordingEncoder::new();
        let history = recorder.history();
        let converter = converter(|b| b, EncoderBackend::standard(recorder));
        converter
            .patch_image(&gray_frame(64.0), &identity_detection())
            .unwrap();

        let calls = history.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].shape, (32, 32, 3));
    }

    #[test]
    fn test_transparent_output_has_alpha() {
        let converter = converter(
            |b| b.draw_transparent(true).seamless_clone(true),
            EncoderBackend::standard(CallRecordingEncoder::new()),
        );
        assert!(!converter.compositor.uses_seamless_clone());

        let result = converter
            .patch_image(&gray_frame(90.0), &identity_detection())
            .unwrap();
        assert!(result.has_alpha());
        assert!(result
            .image
            .slice(ndarray::s![.., .., 3])
            .iter()
            .all(|&v| v == 255));
    }

    #[test]
    fn test_four_channel_input_is_rejected() {
        let converter = converter(|b| b, EncoderBackend::standard(CallRecordingEncoder::new()));
        let frame = Frame::from_array(Array3::zeros((10, 10, 4))).unwrap();
        assert!(matches!(
            converter.patch_image(&frame, &identity_detection()),
            Err(ConvertError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_degenerate_alignment_is_rejected() {
        let converter = converter(|b| b, EncoderBackend::standard(CallRecordingEncoder::new()));
        let detection = DetectedFace::new(
            identity_detection().landmarks,
            AlignmentMatrix::new([[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]),
        );
        assert!(matches!(
            converter.patch_image(&gray_frame(10.0), &detection),
            Err(ConvertError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_encoder_failure_propagates() {
        let converter = converter(|b| b, EncoderBackend::standard(FailingEncoder));
        assert!(matches!(
            converter.patch_image(&gray_frame(10.0), &identity_detection()),
            Err(ConvertError::Encoder(_))
        ));
    }

    #[test]
    fn test_gan_backend_fails_at_synthesis() {
        let converter = converter(|b| b, EncoderBackend::Gan);
        assert_eq!(converter.encoder_name(), "gan");
        assert!(matches!(
            converter.patch_image(&gray_frame(10.0), &identity_detection()),
            Err(ConvertError::UnsupportedEncoder(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ConvertConfig {
            coverage: 0,
            ..ConvertConfig::default()
        };
        assert!(matches!(
            Converter::new(config, EncoderBackend::Gan),
            Err(ConvertError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_timings_are_populated() {
        let converter = converter(|b| b, EncoderBackend::standard(CallRecordingEncoder::new()));
        let result = converter
            .patch_image(&gray_frame(50.0), &identity_detection())
            .unwrap();
        let timings = &result.timings;
        assert!(timings.total_us >= timings.synthesis_us);
        assert!(timings.total_us >= timings.mask_us);
    }
}
