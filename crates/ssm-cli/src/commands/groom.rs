//! ssm groom command - run a grooming pipeline and optional optimization.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde::Serialize;
use ssm_core::{
    GroomConfig, GroomedSet, ToolRunner, launch_studio, run_optimize, write_analysis_project,
};
use tracing::debug;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct GroomResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    inputs: usize,
    stages: Vec<StageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optimize: Option<OptimizeInfo>,
}

#[derive(Serialize)]
struct StageInfo {
    stage: String,
    files: Vec<String>,
}

#[derive(Serialize)]
struct OptimizeInfo {
    parameter_file: String,
    project: String,
    shapes: usize,
}

fn display_all(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|f| f.display().to_string()).collect()
}

pub fn run(
    config_path: &Path,
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    studio: bool,
    cli: &Cli,
) -> Result<()> {
    let mut config = GroomConfig::from_toml_file(config_path)
        .with_context(|| format!("Failed to load pipeline from {:?}", config_path))?;
    if let Some(dir) = output_dir {
        config.output_dir = dir.to_path_buf();
    }
    debug!(
        config = ?config_path,
        steps = config.steps.len(),
        output_dir = ?config.output_dir,
        "Loaded grooming pipeline"
    );
    if studio && config.optimize.is_none() {
        bail!("--studio needs an [optimize] section in {:?}", config_path);
    }

    let runner = ToolRunner::new().quiet(cli.quiet || matches!(cli.format, OutputFormat::Json));
    let input = GroomedSet::new(inputs.to_vec());

    output::info(
        &format!(
            "Grooming {} file(s) through {} step(s)",
            input.len(),
            config.steps.len()
        ),
        cli.format,
        cli.quiet,
    );
    let stages = config.run(&runner, &input)?;
    let groomed = stages.last().unwrap_or(&input);

    let mut optimize = None;
    if let Some(params) = &config.optimize {
        let out_dir = config.output_dir.join("optimized");
        output::info(
            &format!("Optimizing correspondences for {} file(s)", groomed.len()),
            cli.format,
            cli.quiet,
        );
        let result = run_optimize(&runner, &config.tools, params, &groomed.files, &out_dir)?;
        let project = out_dir.join("analyze.xml");
        write_analysis_project(&project, params, &groomed.files, &result)?;
        if studio {
            launch_studio(&runner, &config.tools, &project)?;
        }
        optimize = Some(OptimizeInfo {
            parameter_file: result.parameter_file.display().to_string(),
            project: project.display().to_string(),
            shapes: groomed.len() / params.domains_per_shape.max(1),
        });
    }

    let result = GroomResult {
        name: config.name.clone(),
        inputs: input.len(),
        stages: stages
            .iter()
            .map(|s| StageInfo {
                stage: s.stage.clone(),
                files: display_all(&s.files),
            })
            .collect(),
        optimize,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            for stage in &result.stages {
                println!(
                    "  {} {} ({} files)",
                    "•".cyan(),
                    stage.stage,
                    stage.files.len()
                );
            }
            output::success(
                &format!(
                    "Groomed {} file(s) into {}",
                    result.inputs,
                    config.output_dir.display()
                ),
                cli.format,
                cli.quiet,
            );
            if let Some(opt) = &result.optimize {
                output::success(
                    &format!("Optimized {} shape(s); project {}", opt.shapes, opt.project),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}
