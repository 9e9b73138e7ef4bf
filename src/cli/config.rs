//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliSharpenMode};
use crate::{
    config::{ConvertConfig, MaskStrategy, SharpenMode},
    types::DetectedFace,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Convert CLI arguments to a [`ConvertConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from the JSON config file (or defaults) and apply CLI overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<ConvertConfig> {
        let base = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid configuration file {}", path.display()))?
            },
            None => ConvertConfig::default(),
        };
        let config = Self::apply_overrides(base, cli)?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(mut config: ConvertConfig, cli: &Cli) -> Result<ConvertConfig> {
        if let Some(name) = &cli.mask_type {
            config.mask_strategy = MaskStrategy::parse(name).context("Invalid mask type")?;
        }
        if let Some(blur_size) = cli.blur_size {
            config.blur_size = blur_size;
        }
        if let Some(erosion_size) = cli.erosion_size {
            config.erosion_size = erosion_size;
        }
        if let Some(sharpen) = cli.sharpen {
            config.sharpen = match sharpen {
                CliSharpenMode::None => SharpenMode::None,
                CliSharpenMode::Box => SharpenMode::BoxFilter,
                CliSharpenMode::Gaussian => SharpenMode::GaussianFilter,
            };
        }
        if let Some(coverage) = cli.coverage {
            config.coverage = coverage;
        }
        if let Some(training_size) = cli.training_size {
            config.training_size = training_size;
        }
        if let Some(input_size) = cli.input_size {
            config.input_size = input_size;
        }

        config.seamless_clone |= cli.seamless_clone;
        config.match_histogram |= cli.match_histogram;
        config.avg_color_adjust |= cli.avg_color_adjust;
        config.draw_transparent |= cli.draw_transparent;
        Ok(config)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FacesFile {
    Many(Vec<DetectedFace>),
    One(DetectedFace),
}

/// Read detections from a JSON file holding one face or a list of faces
pub(crate) fn load_faces(path: &Path) -> Result<Vec<DetectedFace>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let faces: FacesFile = serde_json::from_str(&text)
        .with_context(|| format!("Invalid face file {}", path.display()))?;
    Ok(match faces {
        FacesFile::Many(faces) => faces,
        FacesFile::One(face) => vec![face],
    })
}
