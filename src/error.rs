//! Error types for face patching operations

use thiserror::Error;

/// Result type alias for face patching operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Error types surfaced by the patching pipeline
///
/// Every error is local to the frame being processed; a [`crate::Converter`]
/// stays usable after returning any of these.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Alignment matrix is singular or produced a non-finite scale estimate
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Seamless clone was requested but the mask has no opaque pixel
    #[error("Empty mask: {0}")]
    EmptyMask(String),

    /// Frame, mask or encoder output shapes disagree
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Encoder variant that this pipeline cannot drive
    #[error("Unsupported encoder: {0}")]
    UnsupportedEncoder(String),

    /// Failure reported by the external face encoder
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Image conversion or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Input/output errors when saving previews
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant failures
    #[error("Processing error: {0}")]
    Processing(String),
}

impl ConvertError {
    /// Create a new degenerate geometry error
    pub fn degenerate<S: Into<String>>(msg: S) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    /// Create a new empty mask error
    pub fn empty_mask<S: Into<String>>(msg: S) -> Self {
        Self::EmptyMask(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new encoder error
    pub fn encoder<S: Into<String>>(msg: S) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a shape mismatch error for the named pipeline stage
    pub fn shape_mismatch<C, E, A>(context: C, expected: E, actual: A) -> Self
    where
        C: Into<String>,
        E: std::fmt::Debug,
        A: std::fmt::Debug,
    {
        Self::ShapeMismatch {
            context: context.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

impl From<ndarray::ShapeError> for ConvertError {
    fn from(error: ndarray::ShapeError) -> Self {
        Self::Processing(format!("array shape error: {}", error))
    }
}
