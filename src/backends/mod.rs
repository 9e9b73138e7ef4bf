//! Encoder implementations bundled with the library
//!
//! The real synthesis model lives outside this crate. What ships here is a
//! passthrough encoder for previews and benchmarks.

use crate::{error::Result, synthesis::FaceEncoder};
use ndarray::Array3;

// Test utilities for encoder testing
#[cfg(test)]
pub mod test_utils;

/// Passthrough encoder: returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEncoder;

impl IdentityEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FaceEncoder for IdentityEncoder {
    fn encode(&self, face: &Array3<f32>) -> Result<Array3<f32>> {
        Ok(face.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}
