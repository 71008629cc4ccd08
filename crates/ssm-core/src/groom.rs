//! Grooming: delegated image preprocessing before optimization.
//!
//! Each [`GroomStep`] takes the files of one stage and produces a new
//! [`GroomedSet`] by running an external tool per file. Stage outputs land
//! at `<output_dir>/<stage_dir>/<stem>.<suffix>.nrrd`, so stems accumulate
//! suffixes as a file moves through the pipeline
//! (`seg.isores.pad.com.nrrd`).
//!
//! # Example TOML
//!
//! ```toml
//! output_dir = "groomed"
//!
//! [tools]
//! resample = "/opt/toolkit/bin/ResampleVolumesToBeIsotropic"
//!
//! [[steps]]
//! operation = "resample"
//! iso_spacing = 1.0
//!
//! [[steps]]
//! operation = "pad"
//! size = 10
//!
//! [[steps]]
//! operation = "center_of_mass"
//!
//! [[steps]]
//! operation = "rigid_align"
//!
//! [[steps]]
//! operation = "distance_transform"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SsmError, SsmResult};
use crate::external::{ToolPaths, ToolRunner};
use crate::nrrd::load_volume;
use crate::optimize::OptimizeParameters;
use crate::reference::find_reference_image_index;
use crate::tracing_ext::{OperationTimer, log_progress};

/// The files produced by one grooming stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroomedSet {
    /// Stage that produced the files (`"input"` for raw inputs).
    pub stage: String,
    pub files: Vec<PathBuf>,
}

impl GroomedSet {
    /// Wrap raw input files.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            stage: "input".to_string(),
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Where and with what a step runs.
#[derive(Debug, Clone, Copy)]
pub struct GroomContext<'a> {
    pub runner: &'a ToolRunner,
    pub tools: &'a ToolPaths,
    pub output_dir: &'a Path,
}

/// Voxel region shared by all images of a crop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

/// A single grooming operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GroomStep {
    /// Resample to isotropic voxel spacing.
    Resample {
        iso_spacing: f64,
        #[serde(default = "default_true")]
        center: bool,
        #[serde(default = "default_true")]
        binary: bool,
    },
    /// Pad every side with a constant value.
    Pad {
        size: usize,
        #[serde(default)]
        value: f64,
    },
    /// Translate each shape so its center of mass sits at the image origin.
    CenterOfMass,
    /// Rigidly align every image to a reference.
    ///
    /// Without an explicit reference, the image closest to the mean image
    /// is used.
    RigidAlign {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<PathBuf>,
    },
    /// Crop all images to the union of their foreground bounding boxes.
    Crop {
        #[serde(default)]
        padding: usize,
    },
    /// Convert segmentations to signed distance transforms.
    DistanceTransform {
        #[serde(default)]
        iso_value: f64,
    },
}

fn default_true() -> bool {
    true
}

impl GroomStep {
    /// Operation name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            GroomStep::Resample { .. } => "resample",
            GroomStep::Pad { .. } => "pad",
            GroomStep::CenterOfMass => "center_of_mass",
            GroomStep::RigidAlign { .. } => "rigid_align",
            GroomStep::Crop { .. } => "crop",
            GroomStep::DistanceTransform { .. } => "distance_transform",
        }
    }

    /// Directory under the output root that receives this step's files.
    pub fn stage_dir(&self) -> &'static str {
        match self {
            GroomStep::Resample { .. } => "resampled",
            GroomStep::Pad { .. } => "padded",
            GroomStep::CenterOfMass => "com_aligned",
            GroomStep::RigidAlign { .. } => "aligned",
            GroomStep::Crop { .. } => "cropped",
            GroomStep::DistanceTransform { .. } => "distance_transforms",
        }
    }

    /// Suffix appended to each file stem.
    pub fn suffix(&self) -> &'static str {
        match self {
            GroomStep::Resample { .. } => "isores",
            GroomStep::Pad { .. } => "pad",
            GroomStep::CenterOfMass => "com",
            GroomStep::RigidAlign { .. } => "aligned",
            GroomStep::Crop { .. } => "cropped",
            GroomStep::DistanceTransform { .. } => "DT",
        }
    }

    /// Output path for `input` under this step.
    pub fn output_path(&self, output_dir: &Path, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        output_dir
            .join(self.stage_dir())
            .join(format!("{}.{}.nrrd", stem, self.suffix()))
    }

    /// Output paths for all `inputs`, rejecting two inputs that map to the
    /// same file (equal stems in different directories).
    fn output_paths(&self, output_dir: &Path, inputs: &[PathBuf]) -> SsmResult<Vec<PathBuf>> {
        let mut seen: HashMap<PathBuf, &Path> = HashMap::with_capacity(inputs.len());
        let mut outputs = Vec::with_capacity(inputs.len());
        for in_path in inputs {
            let out_path = self.output_path(output_dir, in_path);
            if let Some(first) = seen.insert(out_path.clone(), in_path) {
                return Err(SsmError::invalid_input(format!(
                    "{} step: {:?} and {:?} would both be written to {:?}",
                    self.name(),
                    first,
                    in_path,
                    out_path
                )));
            }
            outputs.push(out_path);
        }
        Ok(outputs)
    }

    /// Run this step over every file of `input`.
    ///
    /// The input set is left untouched; the returned set lists the new files
    /// in the same order.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty input set, inputs whose outputs would
    ///   share a path, or a crop with no foreground
    /// - `IoWrite` if the stage directory cannot be created
    /// - `ToolLaunch` / `ExternalProcess` from the first failing tool run
    pub fn apply(&self, input: &GroomedSet, ctx: &GroomContext<'_>) -> SsmResult<GroomedSet> {
        if input.is_empty() {
            return Err(SsmError::invalid_input(format!(
                "{} step received no files",
                self.name()
            )));
        }
        let outputs = self.output_paths(ctx.output_dir, &input.files)?;
        let _timer = OperationTimer::with_count(self.name(), input.len());

        let stage_dir = ctx.output_dir.join(self.stage_dir());
        fs::create_dir_all(&stage_dir).map_err(|e| SsmError::io_write(&stage_dir, e))?;

        // Steps that need all inputs at once resolve their shared arguments first.
        let shared = match self {
            GroomStep::RigidAlign { reference } => {
                let reference = match reference {
                    Some(path) => path.clone(),
                    None => {
                        let idx = find_reference_image_index(&input.files)?;
                        input.files[idx].clone()
                    }
                };
                info!("Rigid alignment reference: {:?}", reference);
                vec!["--refFilename".to_string(), reference.display().to_string()]
            }
            GroomStep::Crop { padding } => {
                let region = crop_region(&input.files, *padding)?;
                info!(start = ?region.start, size = ?region.size, "Crop region");
                let mut args = Vec::with_capacity(12);
                for (axis, name) in ["X", "Y", "Z"].iter().enumerate() {
                    args.push(format!("--startIndex{}", name));
                    args.push(region.start[axis].to_string());
                }
                for (axis, name) in ["X", "Y", "Z"].iter().enumerate() {
                    args.push(format!("--size{}", name));
                    args.push(region.size[axis].to_string());
                }
                args
            }
            _ => Vec::new(),
        };

        let program = self.program(ctx.tools);
        let mut files = Vec::with_capacity(input.len());
        for (i, (in_path, out_path)) in input.files.iter().zip(outputs).enumerate() {
            let mut args = vec![
                "--inFilename".to_string(),
                in_path.display().to_string(),
                "--outFilename".to_string(),
                out_path.display().to_string(),
            ];
            args.extend(self.step_args(&out_path));
            args.extend(shared.iter().cloned());

            ctx.runner.run(program, &args)?;
            debug!("{} -> {:?}", self.name(), out_path);
            log_progress(self.name(), i + 1, input.len());
            files.push(out_path);
        }

        info!(
            step = self.name(),
            files = files.len(),
            "Groom step completed"
        );
        Ok(GroomedSet {
            stage: self.name().to_string(),
            files,
        })
    }

    fn program<'t>(&self, tools: &'t ToolPaths) -> &'t str {
        match self {
            GroomStep::Resample { .. } => &tools.resample,
            GroomStep::Pad { .. } => &tools.pad,
            GroomStep::CenterOfMass => &tools.center_of_mass,
            GroomStep::RigidAlign { .. } => &tools.rigid_align,
            GroomStep::Crop { .. } => &tools.crop,
            GroomStep::DistanceTransform { .. } => &tools.distance_transform,
        }
    }

    /// Per-file arguments beyond input/output names.
    fn step_args(&self, out_path: &Path) -> Vec<String> {
        match self {
            GroomStep::Resample {
                iso_spacing,
                center,
                binary,
            } => {
                let mut args = vec![
                    "--isoSpacing".to_string(),
                    iso_spacing.to_string(),
                    "--isCenterImageOn".to_string(),
                    if *center { "1" } else { "0" }.to_string(),
                ];
                if *binary {
                    args.push("--isBinaryImage".to_string());
                    args.push("1".to_string());
                }
                args
            }
            GroomStep::Pad { size, value } => vec![
                "--paddingSize".to_string(),
                size.to_string(),
                "--paddingValue".to_string(),
                value.to_string(),
            ],
            GroomStep::CenterOfMass => vec![
                "--useCenterOfMass".to_string(),
                "1".to_string(),
                "--parameterFilename".to_string(),
                out_path.with_extension("txt").display().to_string(),
            ],
            GroomStep::DistanceTransform { iso_value } => {
                vec!["--isoValue".to_string(), iso_value.to_string()]
            }
            GroomStep::RigidAlign { .. } | GroomStep::Crop { .. } => Vec::new(),
        }
    }
}

/// Union of foreground bounds across `files`, grown by `padding` and clamped
/// to the smallest image.
pub fn crop_region(files: &[PathBuf], padding: usize) -> SsmResult<CropRegion> {
    let mut smallest = [usize::MAX; 3];
    let mut bounds: Option<([usize; 3], [usize; 3])> = None;

    for path in files {
        let volume = load_volume(path)?;
        for (s, d) in smallest.iter_mut().zip(volume.dims) {
            *s = (*s).min(d);
        }
        if let Some((lo, hi)) = volume.foreground_bounds(0.0) {
            bounds = Some(match bounds {
                None => (lo, hi),
                Some((blo, bhi)) => (
                    [blo[0].min(lo[0]), blo[1].min(lo[1]), blo[2].min(lo[2])],
                    [bhi[0].max(hi[0]), bhi[1].max(hi[1]), bhi[2].max(hi[2])],
                ),
            });
        }
    }

    let (lo, hi) = bounds.ok_or_else(|| {
        SsmError::invalid_input("cannot crop: no input image has foreground voxels")
    })?;

    let mut start = [0; 3];
    let mut size = [0; 3];
    for axis in 0..3 {
        let last = smallest[axis].saturating_sub(1);
        let first = lo[axis].saturating_sub(padding).min(last);
        let end = hi[axis].saturating_add(padding).min(last).max(first);
        start[axis] = first;
        size[axis] = end - first + 1;
    }
    Ok(CropRegion { start, size })
}

/// An ordered grooming pipeline loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroomConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Root directory for all stage outputs.
    pub output_dir: PathBuf,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub steps: Vec<GroomStep>,
    /// Particle optimization run after the last step, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<OptimizeParameters>,
}

impl GroomConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            output_dir: output_dir.into(),
            tools: ToolPaths::default(),
            steps: Vec::new(),
            optimize: None,
        }
    }

    pub fn add_step(mut self, step: GroomStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a configuration, reporting schema errors as `Config`.
    pub fn from_toml(toml_str: &str) -> SsmResult<Self> {
        toml::from_str(toml_str).map_err(|e| SsmError::config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> SsmResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| SsmError::io_read(path, e))?;
        Self::from_toml(&contents)
    }

    pub fn to_toml(&self) -> SsmResult<String> {
        toml::to_string_pretty(self).map_err(|e| SsmError::config(e.to_string()))
    }

    /// Run every step in order, returning each stage's output.
    ///
    /// Stops at the first failing step; earlier stage files stay on disk.
    pub fn run(&self, runner: &ToolRunner, input: &GroomedSet) -> SsmResult<Vec<GroomedSet>> {
        let ctx = GroomContext {
            runner,
            tools: &self.tools,
            output_dir: &self.output_dir,
        };
        let mut stages: Vec<GroomedSet> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let current = stages.last().unwrap_or(input);
            let next = step.apply(current, &ctx)?;
            stages.push(next);
        }
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nrrd::save_volume;
    use crate::{ElementType, Volume};
    use tempfile::TempDir;

    #[test]
    fn test_output_paths_accumulate_suffixes() {
        let step = GroomStep::Pad {
            size: 4,
            value: 0.0,
        };
        let out = step.output_path(Path::new("/work"), Path::new("/data/seg.isores.nrrd"));
        assert_eq!(out, PathBuf::from("/work/padded/seg.isores.pad.nrrd"));
    }

    #[test]
    fn test_resample_args() {
        let step = GroomStep::Resample {
            iso_spacing: 0.5,
            center: false,
            binary: true,
        };
        let args = step.step_args(Path::new("o.nrrd"));
        assert_eq!(
            args,
            vec![
                "--isoSpacing",
                "0.5",
                "--isCenterImageOn",
                "0",
                "--isBinaryImage",
                "1"
            ]
        );
    }

    #[test]
    fn test_center_of_mass_parameter_file() {
        let args = GroomStep::CenterOfMass.step_args(Path::new("/w/com_aligned/a.com.nrrd"));
        assert_eq!(args[3], "/w/com_aligned/a.com.txt");
    }

    #[test]
    fn test_config_from_toml() {
        let config = GroomConfig::from_toml(
            r#"
            output_dir = "out"

            [tools]
            pad = "my-pad"

            [[steps]]
            operation = "resample"
            iso_spacing = 1.0

            [[steps]]
            operation = "pad"
            size = 10

            [[steps]]
            operation = "rigid_align"
            "#,
        )
        .unwrap();
        assert_eq!(config.steps.len(), 3);
        assert_eq!(
            config.steps[0],
            GroomStep::Resample {
                iso_spacing: 1.0,
                center: true,
                binary: true
            }
        );
        assert_eq!(config.steps[2], GroomStep::RigidAlign { reference: None });
        assert_eq!(config.tools.pad, "my-pad");
        assert_eq!(config.tools.crop, "CropImages");
    }

    #[test]
    fn test_config_round_trip() {
        let config = GroomConfig::new("out")
            .add_step(GroomStep::CenterOfMass)
            .add_step(GroomStep::Crop { padding: 2 });
        let text = config.to_toml().unwrap();
        assert_eq!(GroomConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_unknown_operation_is_config_error() {
        let err = GroomConfig::from_toml(
            "output_dir = \"o\"\n[[steps]]\noperation = \"smooth\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, SsmError::Config { .. }));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = GroomContext {
            runner: &ToolRunner::new(),
            tools: &ToolPaths::default(),
            output_dir: dir.path(),
        };
        let err = GroomStep::CenterOfMass
            .apply(&GroomedSet::new(Vec::new()), &ctx)
            .unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_colliding_output_paths_are_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = GroomContext {
            runner: &ToolRunner::new(),
            tools: &ToolPaths {
                pad: "/nonexistent/pad-tool".to_string(),
                ..Default::default()
            },
            output_dir: dir.path(),
        };
        let input = GroomedSet::new(vec![
            PathBuf::from("/data/left/seg.nrrd"),
            PathBuf::from("/data/right/seg.nrrd"),
        ]);
        let step = GroomStep::Pad {
            size: 2,
            value: 0.0,
        };
        // Rejected before any tool is launched
        match step.apply(&input, &ctx).unwrap_err() {
            SsmError::InvalidInput { details } => {
                assert!(details.contains("left/seg.nrrd"));
                assert!(details.contains("right/seg.nrrd"));
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        assert!(!dir.path().join("padded").exists());
    }

    fn blob(dims: [usize; 3], lo: [usize; 3], hi: [usize; 3]) -> Volume {
        let mut v = Volume::filled(dims, 0.0, ElementType::UChar);
        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    v.set(i, j, k, 1.0);
                }
            }
        }
        v
    }

    #[test]
    fn test_crop_region_union_and_clamp() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.nrrd");
        let b = dir.path().join("b.nrrd");
        save_volume(&blob([10, 10, 10], [2, 3, 4], [4, 5, 6]), &a).unwrap();
        save_volume(&blob([12, 10, 10], [5, 1, 4], [9, 2, 5]), &b).unwrap();

        let region = crop_region(&[a, b], 1).unwrap();
        // Union: x 2..=9, y 1..=5, z 4..=6; grown by 1, clamped to 9
        assert_eq!(region.start, [1, 0, 3]);
        assert_eq!(region.size, [9, 7, 5]);
    }

    #[test]
    fn test_crop_without_foreground_is_rejected() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.nrrd");
        save_volume(&Volume::filled([4, 4, 4], 0.0, ElementType::UChar), &a).unwrap();
        let err = crop_region(&[a], 0).unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_huge_crop_padding_covers_whole_image() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.nrrd");
        save_volume(&blob([6, 7, 8], [2, 2, 2], [3, 3, 3]), &a).unwrap();
        let region = crop_region(&[a], usize::MAX).unwrap();
        assert_eq!(region.start, [0, 0, 0]);
        assert_eq!(region.size, [6, 7, 8]);
    }
}
