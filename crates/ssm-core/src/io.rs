//! Mesh file I/O for STL, OBJ and PLY formats.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{SsmError, SsmResult};
use crate::{Mesh, Vertex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
    Ply,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "stl" => Some(MeshFormat::Stl),
                "obj" => Some(MeshFormat::Obj),
                "ply" => Some(MeshFormat::Ply),
                _ => None,
            })
    }
}

fn unsupported(path: &Path) -> SsmError {
    SsmError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
}

/// Load a mesh from file, auto-detecting format from extension.
///
/// The result is checked for out-of-range face indices and non-finite
/// coordinates; meshes without faces are rejected.
pub fn load_mesh(path: &Path) -> SsmResult<Mesh> {
    let format = MeshFormat::from_path(path).ok_or_else(|| unsupported(path))?;

    info!("Loading mesh from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Ply => load_ply(path)?,
    };

    if mesh.is_empty() {
        return Err(SsmError::empty_mesh(format!(
            "{} has {} vertices and {} faces",
            path.display(),
            mesh.vertex_count(),
            mesh.face_count()
        )));
    }

    let vertex_count = mesh.vertex_count();
    if let Some((face_index, bad)) = mesh.faces.iter().enumerate().find_map(|(i, f)| {
        f.iter()
            .find(|&&v| v as usize >= vertex_count)
            .map(|&v| (i, v))
    }) {
        return Err(SsmError::parse_error(
            path,
            format!(
                "face {} references vertex {}, but mesh only has {} vertices",
                face_index, bad, vertex_count
            ),
        ));
    }
    if let Some(i) = mesh.vertices.iter().position(|v| {
        !(v.position.x.is_finite() && v.position.y.is_finite() && v.position.z.is_finite())
    }) {
        return Err(SsmError::parse_error(
            path,
            format!("vertex {} has a non-finite coordinate", i),
        ));
    }

    if let Some((min, max)) = mesh.bounds() {
        let dims = max - min;
        info!(
            "Loaded mesh: {} vertices, {} faces",
            mesh.vertex_count(),
            mesh.face_count()
        );
        debug!("Dimensions: {:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z);
        if dims.x.max(dims.y).max(dims.z) == 0.0 {
            warn!("Mesh {:?} has zero extent", path);
        }
    }

    Ok(mesh)
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> SsmResult<Mesh> {
    let file = File::open(path).map_err(|e| SsmError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader)
        .map_err(|e| SsmError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices
            .push(Vertex::from_coords(v[0] as f64, v[1] as f64, v[2] as f64));
    }
    for face in &stl.faces {
        let [a, b, c] = face.vertices;
        // Skip degenerate triangles
        if a != b && b != c && a != c {
            mesh.faces.push([a as u32, b as u32, c as u32]);
        }
    }

    debug!(
        "STL loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

/// Load mesh from OBJ file, merging all models.
fn load_obj(path: &Path) -> SsmResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| SsmError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::new();
    let mut vertex_offset = 0u32;

    for model in &models {
        let obj_mesh = &model.mesh;
        for chunk in obj_mesh.positions.chunks_exact(3) {
            mesh.vertices.push(Vertex::from_coords(
                chunk[0] as f64,
                chunk[1] as f64,
                chunk[2] as f64,
            ));
        }
        for chunk in obj_mesh.indices.chunks_exact(3) {
            mesh.faces.push([
                chunk[0] + vertex_offset,
                chunk[1] + vertex_offset,
                chunk[2] + vertex_offset,
            ]);
        }
        vertex_offset = mesh.vertices.len() as u32;
    }

    debug!(
        "OBJ loaded: {} vertices, {} faces from {} models",
        mesh.vertices.len(),
        mesh.faces.len(),
        models.len()
    );
    Ok(mesh)
}

/// Load mesh from PLY file (ASCII or binary).
///
/// Expects `vertex` elements with `x`, `y`, `z` and `face` elements with a
/// `vertex_indices` (or `vertex_index`) list. Polygons are fan-triangulated.
fn load_ply(path: &Path) -> SsmResult<Mesh> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::Property;

    let file = File::open(path).map_err(|e| SsmError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| SsmError::parse_error(path, format!("PLY parse error: {:?}", e)))?;

    let mut mesh = Mesh::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for element in vertices {
            let x = ply_float(element.get("x"), "x", path)?;
            let y = ply_float(element.get("y"), "y", path)?;
            let z = ply_float(element.get("z"), "z", path)?;
            let mut vertex = Vertex::from_coords(x, y, z);

            if let (Some(nx), Some(ny), Some(nz)) =
                (element.get("nx"), element.get("ny"), element.get("nz"))
            {
                if let (Ok(nx), Ok(ny), Ok(nz)) = (
                    ply_float(Some(nx), "nx", path),
                    ply_float(Some(ny), "ny", path),
                    ply_float(Some(nz), "nz", path),
                ) {
                    vertex.normal = Some(nalgebra::Vector3::new(nx, ny, nz));
                }
            }
            mesh.vertices.push(vertex);
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for element in faces {
            let indices: Option<Vec<u32>> = match element
                .get("vertex_indices")
                .or_else(|| element.get("vertex_index"))
            {
                Some(Property::ListInt(v)) => Some(v.iter().map(|&i| i as u32).collect()),
                Some(Property::ListUInt(v)) => Some(v.clone()),
                Some(Property::ListUChar(v)) => Some(v.iter().map(|&i| i as u32).collect()),
                Some(Property::ListUShort(v)) => Some(v.iter().map(|&i| i as u32).collect()),
                Some(Property::ListShort(v)) => Some(v.iter().map(|&i| i as u32).collect()),
                _ => None,
            };
            if let Some(indices) = indices {
                for i in 1..indices.len().saturating_sub(1) {
                    mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
                }
            }
        }
    }

    debug!(
        "PLY loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

/// Extract a float value from a PLY property.
fn ply_float(prop: Option<&ply_rs::ply::Property>, name: &str, path: &Path) -> SsmResult<f64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(SsmError::parse_error(
            path,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

/// Save mesh to file, auto-detecting format from extension.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> SsmResult<()> {
    let format = MeshFormat::from_path(path).ok_or_else(|| unsupported(path))?;

    match format {
        MeshFormat::Stl => save_stl(mesh, path),
        MeshFormat::Obj => save_obj(mesh, path),
        MeshFormat::Ply => save_ply(mesh, path),
    }
}

/// Save mesh to binary STL.
pub fn save_stl(mesh: &Mesh, path: &Path) -> SsmResult<()> {
    info!("Saving mesh to {:?}", path);

    let file = File::create(path).map_err(|e| SsmError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| {
            let n = tri.normal_unnormalized();
            let n = if n.norm() > 0.0 { n.normalize() } else { n };
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [tri.v0, tri.v1, tri.v2]
                    .map(|p| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32])),
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter())
        .and_then(|_| writer.flush())
        .map_err(|e| SsmError::io_write(path, e))?;

    info!("Saved {} triangles to {:?}", mesh.face_count(), path);
    Ok(())
}

/// Save mesh to ASCII OBJ. Vertex order is preserved.
pub fn save_obj(mesh: &Mesh, path: &Path) -> SsmResult<()> {
    info!("Saving mesh to {:?} (OBJ format)", path);

    let file = File::create(path).map_err(|e| SsmError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let write = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
        writeln!(writer, "# OBJ file exported by ssm-core")?;
        writeln!(writer, "# Vertices: {}", mesh.vertices.len())?;
        writeln!(writer, "# Faces: {}", mesh.faces.len())?;
        for v in &mesh.vertices {
            writeln!(
                writer,
                "v {:.6} {:.6} {:.6}",
                v.position.x, v.position.y, v.position.z
            )?;
        }
        for face in &mesh.faces {
            // OBJ uses 1-based indexing
            writeln!(writer, "f {} {} {}", face[0] + 1, face[1] + 1, face[2] + 1)?;
        }
        writer.flush()
    };
    write(&mut writer).map_err(|e| SsmError::io_write(path, e))?;

    info!(
        "Saved {} vertices and {} faces to {:?}",
        mesh.vertices.len(),
        mesh.faces.len(),
        path
    );
    Ok(())
}

/// Save mesh to ASCII PLY.
pub fn save_ply(mesh: &Mesh, path: &Path) -> SsmResult<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    };
    use ply_rs::writer::Writer;

    info!("Saving mesh to {:?} (PLY ASCII format)", path);

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let vertices: Vec<DefaultElement> = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(v.position.x as f32));
            element.insert("y".to_string(), Property::Float(v.position.y as f32));
            element.insert("z".to_string(), Property::Float(v.position.z as f32));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces: Vec<DefaultElement> = mesh
        .faces
        .iter()
        .map(|f| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(vec![f[0] as i32, f[1] as i32, f[2] as i32]),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    ply.make_consistent().map_err(|e| {
        SsmError::io_write(
            path,
            std::io::Error::other(format!("PLY consistency error: {:?}", e)),
        )
    })?;

    let file = File::create(path).map_err(|e| SsmError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .and_then(|_| writer.flush())
        .map_err(|e| SsmError::io_write(path, e))?;

    info!(
        "Saved {} vertices and {} faces to {:?} (PLY ASCII)",
        mesh.vertices.len(),
        mesh.faces.len(),
        path
    );
    Ok(())
}
