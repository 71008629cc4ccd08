//! ssm info command - display volume or mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use ssm_core::{load_mesh, load_volume};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FileInfo {
    Volume(VolumeInfo),
    Mesh(MeshInfo),
}

#[derive(Serialize)]
struct VolumeInfo {
    path: String,
    dims: [usize; 3],
    spacing: [f64; 3],
    origin: [f64; 3],
    element_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_range: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    center_of_mass: Option<[f64; 3]>,
}

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    vertices: usize,
    faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    volume: f64,
    surface_area: f64,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

fn is_volume(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("nrrd"))
}

fn volume_info(input: &Path) -> Result<VolumeInfo> {
    let volume =
        load_volume(input).with_context(|| format!("Failed to load volume from {:?}", input))?;
    Ok(VolumeInfo {
        path: input.display().to_string(),
        dims: volume.dims,
        spacing: [volume.spacing.x, volume.spacing.y, volume.spacing.z],
        origin: [volume.origin.x, volume.origin.y, volume.origin.z],
        element_type: volume.element_type.nrrd_name(),
        value_range: volume.value_range().map(|(lo, hi)| [lo, hi]),
        center_of_mass: volume.center_of_mass().map(|c| [c.x, c.y, c.z]),
    })
}

fn mesh_info(input: &Path) -> Result<MeshInfo> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let bounds = mesh.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });
    Ok(MeshInfo {
        path: input.display().to_string(),
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
        bounds,
        volume: mesh.volume(),
        surface_area: mesh.surface_area(),
    })
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    let info = if is_volume(input) {
        FileInfo::Volume(volume_info(input)?)
    } else {
        FileInfo::Mesh(mesh_info(input)?)
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            match &info {
                FileInfo::Volume(v) => print_volume(v),
                FileInfo::Mesh(m) => print_mesh(m),
            }
        }
    }

    Ok(())
}

fn print_volume(info: &VolumeInfo) {
    println!("{}", "Volume Information".bold().underline());
    println!("  {}: {}", "File".cyan(), info.path);
    println!(
        "  {}: {} x {} x {}",
        "Dimensions".cyan(),
        info.dims[0],
        info.dims[1],
        info.dims[2]
    );
    println!(
        "  {}: ({:.3}, {:.3}, {:.3})",
        "Spacing".cyan(),
        info.spacing[0],
        info.spacing[1],
        info.spacing[2]
    );
    println!(
        "  {}: ({:.2}, {:.2}, {:.2})",
        "Origin".cyan(),
        info.origin[0],
        info.origin[1],
        info.origin[2]
    );
    println!("  {}: {}", "Type".cyan(), info.element_type);
    if let Some([lo, hi]) = info.value_range {
        println!("  {}: {} .. {}", "Value range".cyan(), lo, hi);
    }
    match info.center_of_mass {
        Some(c) => println!(
            "  {}: ({:.2}, {:.2}, {:.2})",
            "Center of mass".cyan(),
            c[0],
            c[1],
            c[2]
        ),
        None => println!("  {}: {}", "Center of mass".cyan(), "empty".yellow()),
    }
}

fn print_mesh(info: &MeshInfo) {
    println!("{}", "Mesh Information".bold().underline());
    println!("  {}: {}", "File".cyan(), info.path);
    println!("  {}: {}", "Vertices".cyan(), info.vertices);
    println!("  {}: {}", "Faces".cyan(), info.faces);

    if let Some(ref b) = info.bounds {
        println!(
            "  {}: {:.2} x {:.2} x {:.2}",
            "Dimensions".cyan(),
            b.dimensions[0],
            b.dimensions[1],
            b.dimensions[2]
        );
        println!(
            "  {}: ({:.2}, {:.2}, {:.2})",
            "Min bounds".cyan(),
            b.min[0],
            b.min[1],
            b.min[2]
        );
        println!(
            "  {}: ({:.2}, {:.2}, {:.2})",
            "Max bounds".cyan(),
            b.max[0],
            b.max[1],
            b.max[2]
        );
    }
    println!("  {}: {:.2}", "Volume".cyan(), info.volume);
    println!("  {}: {:.2}", "Surface area".cyan(), info.surface_area);
}
