//! Invocation of external toolkit executables.
//!
//! Grooming, optimization and visualization are delegated to separate
//! programs. [`ToolRunner`] runs them synchronously and turns a non-zero exit
//! status into [`SsmError::ExternalProcess`]. Failures are never retried.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SsmError, SsmResult};
use crate::tracing_ext::log_external_command;

/// Program names (or paths) for each delegated tool.
///
/// Defaults are the bare executable names, resolved through `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub resample: String,
    pub pad: String,
    pub center_of_mass: String,
    pub rigid_align: String,
    pub crop: String,
    pub distance_transform: String,
    pub optimize: String,
    pub studio: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            resample: "ResampleVolumesToBeIsotropic".to_string(),
            pad: "PadVolumeWithConstant".to_string(),
            center_of_mass: "TranslateShapeToImageOrigin".to_string(),
            rigid_align: "AlignVolumesRigidly".to_string(),
            crop: "CropImages".to_string(),
            distance_transform: "ComputeDistanceTransform".to_string(),
            optimize: "ShapeWorksRun".to_string(),
            studio: "ShapeWorksStudio".to_string(),
        }
    }
}

/// Runs external programs.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    /// Working directory for spawned processes; inherits ours when None.
    pub working_dir: Option<PathBuf>,
    /// Discard the tools' stdout instead of passing it through.
    pub quiet: bool,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run `program` to completion.
    ///
    /// # Errors
    ///
    /// - `ToolLaunch` if the program cannot be started
    /// - `ExternalProcess` with the exit code (None if killed by a signal)
    ///   when it exits unsuccessfully
    pub fn run(&self, program: &str, args: &[String]) -> SsmResult<()> {
        log_external_command(program, args);

        let mut cmd = self.command(program, args);
        if self.quiet {
            cmd.stdout(Stdio::null());
        }
        let status = cmd
            .status()
            .map_err(|e| SsmError::tool_launch(program, e))?;

        if status.success() {
            debug!(program, "External tool finished");
            Ok(())
        } else {
            warn!(program, code = ?status.code(), "External tool failed");
            Err(SsmError::external_process(
                command_line(program, args),
                status.code(),
            ))
        }
    }

    /// Start `program` without waiting for it.
    ///
    /// Only a failure to spawn is reported; the child's exit status is never
    /// observed.
    pub fn launch_detached(&self, program: &str, args: &[String]) -> SsmResult<()> {
        log_external_command(program, args);

        let child = self
            .command(program, args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SsmError::tool_launch(program, e))?;
        debug!(program, pid = child.id(), "Launched detached process");
        Ok(())
    }
}

/// Shell-style rendering of a command line for error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|part| {
            if part.is_empty() || part.contains(char::is_whitespace) {
                format!("'{}'", part)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
