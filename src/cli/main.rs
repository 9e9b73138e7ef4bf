//! Face patching CLI
//!
//! Patches one or more detected faces in an image using the passthrough
//! encoder. Useful to preview mask strategies and colour corrections.

use super::config::{load_faces, CliConfigBuilder};
use crate::{
    backends::IdentityEncoder,
    processor::Converter,
    synthesis::EncoderBackend,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{Frame, PatchResult},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use instant::Instant;
use ndarray::s;
use std::path::PathBuf;
use tracing::{debug, info};

/// Masked face compositing tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "facepatch")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// JSON file with one detected face or a list of them
    #[arg(short, long, value_name = "FACES")]
    pub faces: PathBuf,

    /// Output image; the format follows the extension
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// JSON converter configuration; command-line options override it
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Save the blend mask of the last face as a grayscale PNG
    #[arg(long, value_name = "PATH")]
    pub mask_output: Option<PathBuf>,

    /// Mask strategy (none, rect, smoothed, facehull, ellipse, facehullandrect, ...)
    #[arg(short, long)]
    pub mask_type: Option<String>,

    /// Mask blur size; values below 1 are relative to the mask area
    #[arg(long)]
    pub blur_size: Option<f32>,

    /// Mask erosion (positive) or dilation (negative) size
    #[arg(long, allow_hyphen_values = true)]
    pub erosion_size: Option<f32>,

    /// Blend with seamless cloning
    #[arg(long)]
    pub seamless_clone: bool,

    /// Match the patch histogram to the original face
    #[arg(long)]
    pub match_histogram: bool,

    /// Shift the patch mean colour to the original face
    #[arg(long)]
    pub avg_color_adjust: bool,

    /// Append an opaque alpha channel
    #[arg(long)]
    pub draw_transparent: bool,

    /// Patch sharpening
    #[arg(long, value_enum)]
    pub sharpen: Option<CliSharpenMode>,

    /// Replaced width inside the training frame, in pixels
    #[arg(long)]
    pub coverage: Option<u32>,

    /// Side of the training frame, in pixels
    #[arg(long)]
    pub training_size: Option<u32>,

    /// Side of the encoder input, in pixels
    #[arg(long)]
    pub input_size: Option<u32>,

    /// Print mask statistics and stage timings
    #[arg(long)]
    pub stats: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliSharpenMode {
    None,
    Box,
    Gaussian,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli).context("Failed to build configuration")?;
    let converter = Converter::new(config, EncoderBackend::standard(IdentityEncoder::new()))
        .context("Failed to create converter")?;
    let _session = spans::session(converter.encoder_name(), converter.config().mask_strategy.name())
        .entered();

    let faces = load_faces(&cli.faces)?;
    if faces.is_empty() {
        anyhow::bail!("No faces listed in {}", cli.faces.display());
    }

    let mut frame = {
        let _span = spans::file_io("load", &cli.input).entered();
        let image = image::open(&cli.input)
            .with_context(|| format!("Failed to open {}", cli.input.display()))?;
        Frame::from_image(&image)
    };
    info!(
        "Loaded {} ({}x{}), {} face(s)",
        cli.input.display(),
        frame.dims().1,
        frame.dims().0,
        faces.len()
    );

    let start = Instant::now();
    let mut last: Option<PatchResult> = None;
    for (index, face) in faces.iter().enumerate() {
        if let Some(previous) = last.take() {
            let colour = previous.image.slice(s![.., .., ..3]).mapv(f32::from);
            frame = Frame::from_array(colour)?;
        }
        let result = converter
            .patch_image(&frame, face)
            .with_context(|| format!("Failed to patch face {}", index))?;
        debug!(face = index, "{}", result.timings.summary());
        if cli.stats {
            print_stats(index, &result);
        }
        last = Some(result);
    }

    let result = last.context("No face was patched")?;
    {
        let _span = spans::file_io("save", &cli.output).entered();
        result
            .save(&cli.output)
            .with_context(|| format!("Failed to save {}", cli.output.display()))?;
    }
    if let Some(mask_path) = &cli.mask_output {
        let _span = spans::file_io("save_mask", mask_path).entered();
        result
            .mask
            .save_png(mask_path)
            .with_context(|| format!("Failed to save mask {}", mask_path.display()))?;
    }

    info!(
        "Patched {} face(s) in {:.2}s -> {}",
        faces.len(),
        start.elapsed().as_secs_f64(),
        cli.output.display()
    );
    Ok(())
}

fn print_stats(index: usize, result: &PatchResult) {
    let stats = result.mask.statistics();
    println!("face {}:", index);
    println!(
        "  mask: {:.1}% coverage, {} opaque, {} partial, {} transparent",
        stats.coverage * 100.0,
        stats.opaque_pixels,
        stats.partial_pixels,
        stats.transparent_pixels
    );
    println!("  {}", result.timings.summary());
}
