//! Mock encoders for unit tests
//!
//! These implement [`FaceEncoder`] so pipeline stages can be tested without a
//! synthesis model.

use crate::{
    error::{ConvertError, Result},
    synthesis::FaceEncoder,
};
use ndarray::Array3;
use std::sync::{Arc, Mutex};

/// Summary of one `encode` call
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeCall {
    pub shape: (usize, usize, usize),
    pub min: f32,
    pub max: f32,
}

/// Passthrough encoder that records every input it sees
#[derive(Debug, Clone, Default)]
pub struct CallRecordingEncoder {
    call_history: Arc<Mutex<Vec<EncodeCall>>>,
}

impl CallRecordingEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the call history for verification in tests
    #[must_use]
    pub fn history(&self) -> Arc<Mutex<Vec<EncodeCall>>> {
        Arc::clone(&self.call_history)
    }
}

impl FaceEncoder for CallRecordingEncoder {
    fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>> {
        let call = EncodeCall {
            shape: face.dim(),
            min: face.iter().copied().fold(f32::INFINITY, f32::min),
            max: face.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        };
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call);
        }
        Ok(face.clone())
    }

    fn name(&self) -> &str {
        "mock-recording"
    }
}

/// Encoder returning a constant patch
#[derive(Debug, Clone, Copy)]
pub struct ConstantEncoder {
    value: f32,
}

impl ConstantEncoder {
    #[must_use]
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl FaceEncoder for ConstantEncoder {
    fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>> {
        Ok(Array3::from_elem(face.dim(), self.value))
    }

    fn name(&self) -> &str {
        "mock-constant"
    }
}

/// Encoder adding a fixed offset to every sample
#[derive(Debug, Clone, Copy)]
pub struct OffsetEncoder {
    offset: f32,
}

impl OffsetEncoder {
    #[must_use]
    pub fn new(offset: f32) -> Self {
        Self { offset }
    }
}

impl FaceEncoder for OffsetEncoder {
    fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>> {
        Ok(face.mapv(|v| v + self.offset))
    }

    fn name(&self) -> &str {
        "mock-offset"
    }
}

/// Encoder that always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEncoder;

impl FaceEncoder for FailingEncoder {
    fn encode(&self, _face: &Array3<f32>) -> Result<Array3<f32>> {
        Err(ConvertError::encoder("Mock encoder failure"))
    }

    fn name(&self) -> &str {
        "mock-failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_encoder_tracks_calls() {
        let encoder = CallRecordingEncoder::new();
        let history = encoder.history();
        let face = Array3::from_elem((2, 2, 3), 0.25_f32);
        encoder.encode(&face).unwrap();
        encoder.encode(&face).unwrap();

        let calls = history.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].shape, (2, 2, 3));
        assert_eq!(calls[1].min, 0.25);
    }

    #[test]
    fn test_failing_encoder() {
        let face = Array3::<f32>::zeros((2, 2, 3));
        assert!(matches!(
            FailingEncoder.encode(&face),
            Err(ConvertError::Encoder(_))
        ));
    }

    #[test]
    fn test_offset_encoder() {
        let face = Array3::<f32>::zeros((2, 2, 3));
        let out = OffsetEncoder::new(0.5).encode(&face).unwrap();
        assert!(out.iter().all(|&v| v == 0.5));
    }
}
