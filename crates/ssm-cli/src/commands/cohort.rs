//! ssm cohort command - generate a synthetic shape cohort.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use ssm_core::{CohortConfig, ShapeKind};
use tracing::debug;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct CohortResult {
    shape: &'static str,
    samples: usize,
    output: String,
    meshes: usize,
    segmentations: usize,
    images: usize,
}

pub fn run(config_path: &Path, output_dir: &Path, cli: &Cli) -> Result<()> {
    let config = CohortConfig::from_toml_file(config_path)
        .with_context(|| format!("Failed to load cohort config from {:?}", config_path))?;

    debug!(config = ?config_path, samples = config.samples, "Loaded cohort config");
    output::info(
        &format!("Generating {} samples", config.samples),
        cli.format,
        cli.quiet,
    );
    let files = config
        .run(output_dir)
        .with_context(|| format!("Failed to generate cohort into {:?}", output_dir))?;

    let result = CohortResult {
        shape: match config.shape {
            ShapeKind::Ellipsoid { .. } => "ellipsoid",
            ShapeKind::Supershape { .. } => "supershape",
        },
        samples: config.samples,
        output: output_dir.display().to_string(),
        meshes: files.meshes.len(),
        segmentations: files.segmentations.len(),
        images: files.images.len(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            println!("{}", "Cohort".bold().underline());
            println!("  {}: {}", "Shape".cyan(), result.shape);
            println!("  {}: {}", "Meshes".cyan(), result.meshes);
            println!("  {}: {}", "Segmentations".cyan(), result.segmentations);
            if result.images > 0 {
                println!("  {}: {}", "Images".cyan(), result.images);
            }
            output::success(
                &format!("Wrote cohort to {}", result.output),
                cli.format,
                cli.quiet,
            );
        }
    }

    Ok(())
}
