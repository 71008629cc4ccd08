//! Particle-based correspondence optimization and analysis launch.
//!
//! The optimizer itself is an external program driven by an XML parameter
//! document. This module renders that document, runs the optimizer and
//! reports where it writes the per-shape particle files.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SsmError, SsmResult};
use crate::external::{ToolPaths, ToolRunner};
use crate::tracing_ext::OperationTimer;

/// Kind of shape representation handed to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    /// Distance transform images.
    Image,
    /// Surface meshes.
    Mesh,
    /// Polyline contours.
    Contour,
}

impl DomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::Image => "image",
            DomainType::Mesh => "mesh",
            DomainType::Contour => "contour",
        }
    }

    /// Tag listing the input shapes in an analysis project.
    fn shape_files_tag(&self) -> &'static str {
        match self {
            DomainType::Image => "distance_transform_files",
            DomainType::Mesh => "mesh_files",
            DomainType::Contour => "contour_files",
        }
    }
}

/// Optimizer settings. Per-domain values hold one entry per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeParameters {
    pub number_of_particles: Vec<usize>,
    pub use_normals: Vec<bool>,
    pub normal_weight: Vec<f64>,
    pub checkpointing_interval: usize,
    pub keep_checkpoints: bool,
    pub iterations_per_split: usize,
    pub optimization_iterations: usize,
    pub starting_regularization: f64,
    pub ending_regularization: f64,
    pub recompute_regularization_interval: usize,
    pub domains_per_shape: usize,
    pub domain_type: DomainType,
    pub relative_weighting: f64,
    pub initial_relative_weighting: f64,
    pub procrustes_interval: usize,
    pub procrustes_scaling: bool,
    pub save_init_splits: bool,
    pub verbosity: u32,
}

impl Default for OptimizeParameters {
    fn default() -> Self {
        Self {
            number_of_particles: vec![128],
            use_normals: vec![false],
            normal_weight: vec![1.0],
            checkpointing_interval: 200,
            keep_checkpoints: false,
            iterations_per_split: 500,
            optimization_iterations: 500,
            starting_regularization: 100.0,
            ending_regularization: 0.5,
            recompute_regularization_interval: 2,
            domains_per_shape: 1,
            domain_type: DomainType::Image,
            relative_weighting: 1.0,
            initial_relative_weighting: 0.1,
            procrustes_interval: 0,
            procrustes_scaling: false,
            save_init_splits: false,
            verbosity: 3,
        }
    }
}

/// Files produced by an optimizer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeOutput {
    pub parameter_file: PathBuf,
    /// Particles in each shape's own coordinate frame.
    pub local_points: Vec<PathBuf>,
    /// Particles in the shared world frame.
    pub world_points: Vec<PathBuf>,
}

impl OptimizeParameters {
    /// Check per-domain lists against `domains_per_shape`.
    pub fn validate(&self) -> SsmResult<()> {
        if self.domains_per_shape == 0 {
            return Err(SsmError::config("domains_per_shape must be at least 1"));
        }
        let lists = [
            ("number_of_particles", self.number_of_particles.len()),
            ("use_normals", self.use_normals.len()),
            ("normal_weight", self.normal_weight.len()),
        ];
        for (name, len) in lists {
            if len != self.domains_per_shape {
                return Err(SsmError::config(format!(
                    "{} has {} entries but domains_per_shape is {}",
                    name, len, self.domains_per_shape
                )));
            }
        }
        if self.number_of_particles.contains(&0) {
            return Err(SsmError::config("number_of_particles entries must be positive"));
        }
        Ok(())
    }

    /// Render the optimizer's XML parameter document.
    pub fn to_xml(&self, inputs: &[PathBuf], out_dir: &Path) -> String {
        let mut xml = String::new();
        let flag = |b: bool| if b { "1" } else { "0" };
        let join = |items: Vec<String>| items.join(" ");

        let _ = writeln!(xml, r#"<?xml version="1.0" ?>"#);
        let _ = writeln!(xml, "<root>");
        let mut tag = |name: &str, value: String| {
            let _ = writeln!(xml, "<{name}>{value}</{name}>");
        };
        tag(
            "number_of_particles",
            join(self.number_of_particles.iter().map(|n| n.to_string()).collect()),
        );
        tag(
            "use_normals",
            join(self.use_normals.iter().map(|&b| flag(b).to_string()).collect()),
        );
        tag(
            "normal_weight",
            join(self.normal_weight.iter().map(|w| w.to_string()).collect()),
        );
        tag("checkpointing_interval", self.checkpointing_interval.to_string());
        tag("keep_checkpoints", flag(self.keep_checkpoints).to_string());
        tag("iterations_per_split", self.iterations_per_split.to_string());
        tag("optimization_iterations", self.optimization_iterations.to_string());
        tag("starting_regularization", self.starting_regularization.to_string());
        tag("ending_regularization", self.ending_regularization.to_string());
        tag(
            "recompute_regularization_interval",
            self.recompute_regularization_interval.to_string(),
        );
        tag("domains_per_shape", self.domains_per_shape.to_string());
        tag("domain_type", self.domain_type.as_str().to_string());
        tag("relative_weighting", self.relative_weighting.to_string());
        tag(
            "initial_relative_weighting",
            self.initial_relative_weighting.to_string(),
        );
        tag("procrustes_interval", self.procrustes_interval.to_string());
        tag("procrustes_scaling", flag(self.procrustes_scaling).to_string());
        tag("save_init_splits", flag(self.save_init_splits).to_string());
        tag("verbosity", self.verbosity.to_string());
        tag("output_dir", escape_xml(&out_dir.display().to_string()));
        tag("inputs", file_list(inputs));
        let _ = writeln!(xml, "</root>");
        xml
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn file_list(files: &[PathBuf]) -> String {
    let mut out = String::from("\n");
    for f in files {
        out.push_str(&escape_xml(&f.display().to_string()));
        out.push('\n');
    }
    out
}

fn particle_file(out_dir: &Path, input: &Path, frame: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    out_dir.join(format!("{}_{}.particles", stem, frame))
}

/// Write the parameter document and run the optimizer on `inputs`.
///
/// Inputs are grouped by shape: with `domains_per_shape = d`, files
/// `[k*d, (k+1)*d)` belong to shape `k`.
///
/// # Errors
///
/// - `Config` for inconsistent parameters
/// - `InvalidInput` if there are no inputs or their count is not a multiple
///   of `domains_per_shape`
/// - `IoWrite`, `ToolLaunch` or `ExternalProcess` from the run itself
pub fn run_optimize(
    runner: &ToolRunner,
    tools: &ToolPaths,
    params: &OptimizeParameters,
    inputs: &[PathBuf],
    out_dir: &Path,
) -> SsmResult<OptimizeOutput> {
    params.validate()?;
    if inputs.is_empty() || inputs.len() % params.domains_per_shape != 0 {
        return Err(SsmError::invalid_input(format!(
            "{} input file(s) cannot be split into shapes of {} domain(s)",
            inputs.len(),
            params.domains_per_shape
        )));
    }
    let _timer = OperationTimer::with_count("optimize", inputs.len());

    fs::create_dir_all(out_dir).map_err(|e| SsmError::io_write(out_dir, e))?;
    let particles = params
        .number_of_particles
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("_");
    let parameter_file = out_dir.join(format!("correspondence_{}.xml", particles));
    fs::write(&parameter_file, params.to_xml(inputs, out_dir))
        .map_err(|e| SsmError::io_write(&parameter_file, e))?;

    runner.run(
        &tools.optimize,
        &[parameter_file.display().to_string()],
    )?;

    let local_points = inputs
        .iter()
        .map(|f| particle_file(out_dir, f, "local"))
        .collect();
    let world_points = inputs
        .iter()
        .map(|f| particle_file(out_dir, f, "world"))
        .collect();
    info!(shapes = inputs.len() / params.domains_per_shape, "Optimization finished");

    Ok(OptimizeOutput {
        parameter_file,
        local_points,
        world_points,
    })
}

/// Write an analysis project listing shapes and their particle files.
pub fn write_analysis_project(
    path: &Path,
    params: &OptimizeParameters,
    shapes: &[PathBuf],
    output: &OptimizeOutput,
) -> SsmResult<()> {
    let mut xml = String::new();
    let _ = writeln!(xml, r#"<?xml version="1.0" ?>"#);
    let _ = writeln!(xml, "<root>");
    let _ = writeln!(
        xml,
        "<domains_per_shape>{}</domains_per_shape>",
        params.domains_per_shape
    );
    let tag = params.domain_type.shape_files_tag();
    let _ = writeln!(xml, "<{tag}>{}</{tag}>", file_list(shapes));
    let _ = writeln!(
        xml,
        "<point_files>{}</point_files>",
        file_list(&output.local_points)
    );
    let _ = writeln!(
        xml,
        "<world_point_files>{}</world_point_files>",
        file_list(&output.world_points)
    );
    let _ = writeln!(xml, "</root>");

    fs::write(path, xml).map_err(|e| SsmError::io_write(path, e))
}

/// Open an analysis project in the viewer without waiting for it.
pub fn launch_studio(runner: &ToolRunner, tools: &ToolPaths, project: &Path) -> SsmResult<()> {
    info!("Launching viewer on {:?}", project);
    runner.launch_detached(&tools.studio, &[project.display().to_string()])
}
