//! ssm: command-line front end for shape-cohort preparation.
//!
//! Selects reference shapes, builds contours, runs grooming pipelines and
//! generates synthetic cohorts, suitable for scripting and CI pipelines.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=ssm_core=info` - Basic operation logging
//! - `RUST_LOG=ssm_core=debug` - Detailed progress logging
//! - `RUST_LOG=ssm_core::timing=debug` - Performance timing
//! - `RUST_LOG=ssm_core::external=info` - Delegated tool command lines
//!
//! # Example
//!
//! ```bash
//! # Pick the reference segmentation for rigid alignment
//! ssm reference-image segs/*.nrrd
//!
//! # Run a grooming pipeline with tool command lines logged
//! ssm -v groom groom.toml segs/*.nrrd
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{cohort, contour, distance, groom, info, reference};

/// ssm - Statistical shape modeling data preparation.
///
/// Select reference shapes, groom image cohorts through the external
/// toolkit, and generate synthetic shape cohorts.
#[derive(Parser)]
#[command(name = "ssm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display volume or mesh information
    Info {
        /// Input file (.nrrd volume, or .stl/.obj/.ply mesh)
        input: PathBuf,
    },

    /// Select the image closest to the cohort mean
    ReferenceImage {
        /// Input volumes (.nrrd)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Select the mesh with the largest summed distance to the others
    ReferenceMesh {
        /// Input meshes
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Surface distance from one mesh to another
    Distance {
        /// Mesh measured against
        source: PathBuf,

        /// Mesh whose vertices are sampled
        target: PathBuf,
    },

    /// Build a contour from a point list and write it as VTK PolyData
    Contour {
        /// Point file, one `x,y,z` per line
        input: PathBuf,

        /// Output .vtp file
        #[arg(short, long)]
        output: PathBuf,

        /// Leave the last point unconnected to the first
        #[arg(long)]
        open: bool,
    },

    /// Run a grooming pipeline described in a TOML file
    Groom {
        /// Pipeline configuration
        config: PathBuf,

        /// Input volumes
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Override the configured output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Open the optimized model in the viewer afterwards
        #[arg(long)]
        studio: bool,
    },

    /// Generate a synthetic shape cohort
    Cohort {
        /// Cohort configuration
        config: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "ssm_core=info,ssm=info",
            2 => "ssm_core=debug,ssm=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Info { input } => info::run(input, &cli),
        Commands::ReferenceImage { inputs } => reference::run_image(inputs, &cli),
        Commands::ReferenceMesh { inputs } => reference::run_mesh(inputs, &cli),
        Commands::Distance { source, target } => distance::run(source, target, &cli),
        Commands::Contour {
            input,
            output,
            open,
        } => contour::run(input, output, *open, &cli),
        Commands::Groom {
            config,
            inputs,
            output_dir,
            studio,
        } => groom::run(config, inputs, output_dir.as_deref(), *studio, &cli),
        Commands::Cohort { config, output } => cohort::run(config, output, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(ssm_err) = e.downcast_ref::<ssm_core::SsmError>() {
                eprintln!("{}: {}", "Error".red().bold(), e);
                eprintln!("  {}: {}", "Code".cyan(), ssm_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    ssm_err.recovery_suggestion()
                );
                if let Some(path) = ssm_err.path() {
                    eprintln!("  {}: {}", "File".yellow(), path.display());
                }
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
