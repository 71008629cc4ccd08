//! ssm reference-image / reference-mesh commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use ssm_core::{Mesh, find_reference_image_index, find_reference_mesh_index, load_mesh};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ReferenceResult {
    index: usize,
    path: String,
    candidates: usize,
}

impl ReferenceResult {
    fn new(index: usize, inputs: &[PathBuf]) -> Self {
        Self {
            index,
            path: inputs[index].display().to_string(),
            candidates: inputs.len(),
        }
    }
}

pub fn run_image(inputs: &[PathBuf], cli: &Cli) -> Result<()> {
    output::info(
        &format!("Comparing {} images to their mean", inputs.len()),
        cli.format,
        cli.quiet,
    );
    let index = find_reference_image_index(inputs).context("Reference image selection failed")?;
    report(&ReferenceResult::new(index, inputs), "image", cli);
    Ok(())
}

pub fn run_mesh(inputs: &[PathBuf], cli: &Cli) -> Result<()> {
    let meshes = inputs
        .iter()
        .map(|p| load_mesh(p).with_context(|| format!("Failed to load mesh from {:?}", p)))
        .collect::<Result<Vec<Mesh>>>()?;

    let pairs = meshes.len() * meshes.len().saturating_sub(1) / 2;
    output::info(
        &format!("Computing {} pairwise distances", pairs),
        cli.format,
        cli.quiet,
    );
    let index = find_reference_mesh_index(&meshes).context("Reference mesh selection failed")?;
    report(&ReferenceResult::new(index, inputs), "mesh", cli);
    Ok(())
}

fn report(result: &ReferenceResult, what: &str, cli: &Cli) {
    match cli.format {
        OutputFormat::Json => output::print(result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} {}: {} (index {} of {})",
                    "Reference".bold(),
                    what,
                    result.path.green(),
                    result.index,
                    result.candidates
                );
            }
        }
    }
}
