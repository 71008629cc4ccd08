//! ssm distance command - per-vertex surface distance between two meshes.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use ssm_core::{load_mesh, surface_distance};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct DistanceResult {
    source: String,
    target: String,
    samples: usize,
    mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
}

pub fn run(source: &Path, target: &Path, cli: &Cli) -> Result<()> {
    let source_mesh =
        load_mesh(source).with_context(|| format!("Failed to load mesh from {:?}", source))?;
    let target_mesh =
        load_mesh(target).with_context(|| format!("Failed to load mesh from {:?}", target))?;

    let field = surface_distance(&source_mesh, &target_mesh)?;
    let result = DistanceResult {
        source: source.display().to_string(),
        target: target.display().to_string(),
        samples: field.len(),
        mean: field.mean(),
        min: field.min(),
        max: field.max(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Surface Distance".bold().underline());
                println!("  {}: {}", "Source".cyan(), result.source);
                println!("  {}: {}", "Target".cyan(), result.target);
                println!("  {}: {}", "Samples".cyan(), result.samples);
                println!("  {}: {:.4}", "Mean".cyan(), result.mean);
                if let (Some(min), Some(max)) = (result.min, result.max) {
                    println!("  {}: {:.4} .. {:.4}", "Range".cyan(), min, max);
                }
            }
        }
    }

    Ok(())
}
