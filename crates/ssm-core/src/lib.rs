//! Shape-cohort preparation for statistical shape modeling.
//!
//! This crate holds the in-process pieces of a shape-modeling workflow and
//! drives the external toolkit programs for everything else (resampling,
//! distance transforms, particle optimization, visualization).
//!
//! # Features
//!
//! - **Reference selection**: pick the image closest to the cohort mean, or
//!   the most peripheral mesh by mean surface distance
//! - **Contours**: line connectivity for open and closed polylines, VTK
//!   PolyData export
//! - **File I/O**: NRRD volumes (raw/ascii), STL/OBJ/PLY meshes
//! - **Grooming**: ordered, TOML-configured preprocessing steps run through
//!   external tools, each producing a new stage record
//! - **Optimization**: parameter document generation and optimizer launch
//! - **Synthetic cohorts**: ellipsoids and supershapes, with segmentations
//!   and noisy grey-level images
//!
//! # Coordinate conventions
//!
//! Volumes store voxels with the first (x) axis varying fastest. Physical
//! positions are `origin + index * spacing` per axis. Mesh faces wind
//! counter-clockwise when viewed from outside.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use ssm_core::{compute_line_indices, find_reference_image_index, load_mesh,
//!                find_reference_mesh_index};
//!
//! let images: Vec<PathBuf> = vec!["a.nrrd".into(), "b.nrrd".into(), "c.nrrd".into()];
//! let reference = find_reference_image_index(&images).unwrap();
//! println!("reference image: {:?}", images[reference]);
//!
//! let meshes = vec![load_mesh("a.ply".as_ref()).unwrap(), load_mesh("b.ply".as_ref()).unwrap()];
//! let reference = find_reference_mesh_index(&meshes).unwrap();
//! println!("reference mesh: {}", reference);
//!
//! let lines = compute_line_indices(4, true).unwrap();
//! assert_eq!(lines.lines, vec![[0, 1], [1, 2], [2, 3], [3, 0]]);
//! ```
//!
//! # Grooming
//!
//! ```no_run
//! use std::path::Path;
//! use ssm_core::{GroomConfig, GroomedSet, ToolRunner};
//!
//! let config = GroomConfig::from_toml_file(Path::new("groom.toml")).unwrap();
//! let inputs = GroomedSet::new(vec!["seg1.nrrd".into(), "seg2.nrrd".into()]);
//! let stages = config.run(&ToolRunner::new(), &inputs).unwrap();
//! for stage in &stages {
//!     println!("{}: {} files", stage.stage, stage.len());
//! }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`SsmResult`]. Errors carry a stable
//! [`ErrorCode`] and a [`RecoverySuggestion`]:
//!
//! ```no_run
//! use ssm_core::{find_reference_mesh_index, Mesh, SsmError};
//!
//! let meshes: Vec<Mesh> = Vec::new();
//! match find_reference_mesh_index(&meshes) {
//!     Ok(i) => println!("reference {}", i),
//!     Err(e @ SsmError::InvalidInput { .. }) => {
//!         eprintln!("[{}] {}", e.code(), e);
//!         eprintln!("hint: {}", e.recovery_suggestion());
//!     }
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

mod error;
mod types;

pub mod cohort;
pub mod contour;
pub mod distance;
pub mod external;
pub mod groom;
pub mod io;
pub mod nrrd;
pub mod optimize;
pub mod reference;
pub mod tracing_ext;
pub mod utils;
pub mod volume;

pub use error::{ErrorCode, RecoverySuggestion, SsmError, SsmResult};
pub use types::{Mesh, Triangle, Vertex};

pub use volume::{ElementType, Volume, VolumeSource, VoxelArray, max_extent};

pub use nrrd::{NrrdHeader, load_volume, read_header, save_volume};

pub use io::{MeshFormat, load_mesh, save_mesh};

pub use distance::{DistanceField, SurfaceDistance, surface_distance};

pub use reference::{find_reference_image_index, find_reference_mesh_index};

pub use contour::{Contour, LineSet, compute_line_indices, save_contour_vtp};

pub use external::{ToolPaths, ToolRunner};

pub use groom::{CropRegion, GroomConfig, GroomContext, GroomStep, GroomedSet};

pub use optimize::{
    DomainType, OptimizeOutput, OptimizeParameters, launch_studio, run_optimize,
    write_analysis_project,
};

pub use cohort::{
    CohortConfig, CohortFiles, CohortGenerator, CohortImages, CohortMeshes, CohortSegmentations,
    EllipsoidGenerator, ImageSynthesis, PlacementOptions, ShapeGenerator, ShapeKind, ShapeSample,
    Supershape, SupershapeGenerator,
};

pub use utils::{files_with_extension, num_subplots, positive_factors, save_meshes, save_volumes};

pub use tracing_ext::OperationTimer;
