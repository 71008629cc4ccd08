//! Error types for shape-modeling operations with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable code for programmatic handling
//! - Context about what was being processed (path, command, element type)
//! - A recovery suggestion where one exists
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `SSM-XXXX`:
//! - `SSM-1xxx`: I/O errors (file reading, writing, parsing)
//! - `SSM-2xxx`: Input validation errors
//! - `SSM-3xxx`: External tool errors
//! - `SSM-4xxx`: Type and format errors
//! - `SSM-5xxx`: Configuration errors
//!
//! # Example
//!
//! ```
//! use ssm_core::{ErrorCode, SsmError};
//!
//! let err = SsmError::invalid_input("no images supplied");
//! assert_eq!(err.code(), ErrorCode::InvalidInput);
//! assert_eq!(err.code().as_str(), "SSM-2001");
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for shape-modeling operations.
pub type SsmResult<T> = Result<T, SsmError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `SSM-XXXX` where:
/// - 1xxx = I/O errors
/// - 2xxx = Input validation errors
/// - 3xxx = External tool errors
/// - 4xxx = Type and format errors
/// - 5xxx = Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// SSM-1001: Failed to read file
    IoRead = 1001,
    /// SSM-1002: Failed to write file
    IoWrite = 1002,
    /// SSM-1003: Failed to parse file contents
    ParseError = 1003,

    // Input errors (2xxx)
    /// SSM-2001: Empty collection, wrong dimensionality, zero point count
    InvalidInput = 2001,
    /// SSM-2002: Mesh has no vertices or faces
    EmptyMesh = 2002,

    // External tool errors (3xxx)
    /// SSM-3001: External command exited with a failure status
    ExternalProcess = 3001,
    /// SSM-3002: External program could not be started
    ToolLaunch = 3002,

    // Type and format errors (4xxx)
    /// SSM-4001: Unsupported voxel element type
    UnsupportedType = 4001,
    /// SSM-4002: Unsupported file format or encoding
    UnsupportedFormat = 4002,

    // Configuration errors (5xxx)
    /// SSM-5001: Invalid pipeline or cohort configuration
    Config = 5001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `SSM-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "SSM-1001",
            ErrorCode::IoWrite => "SSM-1002",
            ErrorCode::ParseError => "SSM-1003",
            ErrorCode::InvalidInput => "SSM-2001",
            ErrorCode::EmptyMesh => "SSM-2002",
            ErrorCode::ExternalProcess => "SSM-3001",
            ErrorCode::ToolLaunch => "SSM-3002",
            ErrorCode::UnsupportedType => "SSM-4001",
            ErrorCode::UnsupportedFormat => "SSM-4002",
            ErrorCode::Config => "SSM-5001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the input files or collection.
    CheckInputs { checks: Vec<String> },
    /// Use a different file format or encoding.
    UseDifferentFormat { suggested: Vec<String> },
    /// Inspect the external tool invocation.
    CheckTool { program: String },
    /// Adjust configuration values.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckInputs { checks } => {
                write!(f, "Check the inputs for: {}", checks.join(", "))
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::CheckTool { program } => {
                write!(
                    f,
                    "Check that `{}` is on PATH and run it by hand with the same arguments",
                    program
                )
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Errors that can occur during shape-modeling operations.
#[derive(Debug, Error, Diagnostic)]
pub enum SsmError {
    /// Error reading from a file.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(ssm::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(ssm::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing file contents.
    #[error("failed to parse {path}: {details}")]
    #[diagnostic(
        code(ssm::parse::error),
        help("The file may be truncated or written by an incompatible tool.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Invalid input to a selector, builder or grooming step.
    #[error("invalid input: {details}")]
    #[diagnostic(code(ssm::input::invalid))]
    InvalidInput { details: String },

    /// Mesh without geometry.
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(ssm::input::empty_mesh),
        help("The mesh must have at least one vertex and one face.")
    )]
    EmptyMesh { details: String },

    /// Delegated external command exited with a failure status.
    #[error("external command failed with {}: {command}", exit_description(.code))]
    #[diagnostic(
        code(ssm::external::failed),
        help("Run the command by hand to see the tool's own diagnostics.")
    )]
    ExternalProcess { command: String, code: Option<i32> },

    /// External program could not be started.
    #[error("failed to launch `{program}`")]
    #[diagnostic(
        code(ssm::external::launch),
        help("Make sure the toolkit's bin directory is on PATH.")
    )]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Voxel element type not supported.
    #[error("unsupported element type: {type_name}")]
    #[diagnostic(
        code(ssm::format::element_type),
        help("Supported types: uchar, char, ushort, short, uint, int, float, double")
    )]
    UnsupportedType { type_name: String },

    /// Unsupported file format or encoding.
    #[error("unsupported format: {extension:?}")]
    #[diagnostic(
        code(ssm::format::unsupported),
        help("Meshes: STL, OBJ, PLY. Volumes: NRRD with raw or ascii encoding.")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Invalid configuration.
    #[error("invalid configuration: {details}")]
    #[diagnostic(code(ssm::config::invalid))]
    Config { details: String },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "termination by signal".to_string(),
    }
}

impl SsmError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SsmError::IoRead { .. } => ErrorCode::IoRead,
            SsmError::IoWrite { .. } => ErrorCode::IoWrite,
            SsmError::ParseError { .. } => ErrorCode::ParseError,
            SsmError::InvalidInput { .. } => ErrorCode::InvalidInput,
            SsmError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            SsmError::ExternalProcess { .. } => ErrorCode::ExternalProcess,
            SsmError::ToolLaunch { .. } => ErrorCode::ToolLaunch,
            SsmError::UnsupportedType { .. } => ErrorCode::UnsupportedType,
            SsmError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            SsmError::Config { .. } => ErrorCode::Config,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            SsmError::IoRead { .. } => RecoverySuggestion::CheckInputs {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            SsmError::IoWrite { .. } => RecoverySuggestion::CheckInputs {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            SsmError::ParseError { .. } => RecoverySuggestion::CheckInputs {
                checks: vec!["file is complete".into(), "header matches payload".into()],
            },
            SsmError::InvalidInput { .. } => RecoverySuggestion::CheckInputs {
                checks: vec![
                    "collection is not empty".into(),
                    "arrays are three-dimensional".into(),
                ],
            },
            SsmError::EmptyMesh { .. } => RecoverySuggestion::CheckInputs {
                checks: vec!["mesh has geometry".into(), "correct export settings".into()],
            },
            SsmError::ExternalProcess { command, .. } => RecoverySuggestion::CheckTool {
                program: command
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            },
            SsmError::ToolLaunch { program, .. } => RecoverySuggestion::CheckTool {
                program: program.clone(),
            },
            SsmError::UnsupportedType { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["float".into(), "short".into(), "uchar".into()],
            },
            SsmError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["STL".into(), "OBJ".into(), "PLY".into(), "NRRD (raw)".into()],
            },
            SsmError::Config { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("config".into(), "see the offending key".into())],
            },
        }
    }

    /// Returns the file path involved, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SsmError::IoRead { path, .. }
            | SsmError::IoWrite { path, .. }
            | SsmError::ParseError { path, .. } => Some(path),
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SsmError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SsmError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        SsmError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(details: impl Into<String>) -> Self {
        SsmError::InvalidInput {
            details: details.into(),
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        SsmError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an ExternalProcess error.
    pub fn external_process(command: impl Into<String>, code: Option<i32>) -> Self {
        SsmError::ExternalProcess {
            command: command.into(),
            code,
        }
    }

    /// Create a ToolLaunch error.
    pub fn tool_launch(program: impl Into<String>, source: std::io::Error) -> Self {
        SsmError::ToolLaunch {
            program: program.into(),
            source,
        }
    }

    /// Create an UnsupportedType error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        SsmError::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        SsmError::UnsupportedFormat { extension }
    }

    /// Create a Config error.
    pub fn config(details: impl Into<String>) -> Self {
        SsmError::Config {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SsmError::invalid_input("empty image list");
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert_eq!(err.code().as_str(), "SSM-2001");

        let err = SsmError::unsupported_type("int64");
        assert_eq!(err.code().to_string(), "SSM-4001");
    }

    #[test]
    fn test_external_process_keeps_command_and_code() {
        let err = SsmError::external_process("PadVolumeWithConstant --inFilename a.nrrd", Some(3));
        let display = err.to_string();
        assert!(display.contains("exit code 3"));
        assert!(display.contains("PadVolumeWithConstant --inFilename a.nrrd"));

        match err.recovery_suggestion() {
            RecoverySuggestion::CheckTool { program } => {
                assert_eq!(program, "PadVolumeWithConstant");
            }
            other => panic!("Expected CheckTool suggestion, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_termination_display() {
        let err = SsmError::external_process("ShapeWorksRun params.xml", None);
        assert!(err.to_string().contains("termination by signal"));
    }

    #[test]
    fn test_path_accessor() {
        let err = SsmError::parse_error("/tmp/a.nrrd", "missing sizes");
        assert_eq!(err.path(), Some(std::path::Path::new("/tmp/a.nrrd")));
        assert!(SsmError::config("bad").path().is_none());
    }
}
