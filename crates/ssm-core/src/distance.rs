//! Surface-to-surface distances between meshes.

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{SsmError, SsmResult};
use crate::{Mesh, Triangle};

/// Per-vertex distances from one surface to another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceField {
    /// One value per vertex of the mesh the distances were sampled at.
    pub values: Vec<f64>,
}

impl DistanceField {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Arithmetic mean, 0.0 for an empty field.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }
}

/// Distance from every vertex of `target` to the closest point on `source`.
///
/// Errors with `EmptyMesh` if `source` has no triangles or `target` has no
/// vertices.
pub fn surface_distance(source: &Mesh, target: &Mesh) -> SsmResult<DistanceField> {
    if source.is_empty() {
        return Err(SsmError::empty_mesh(format!(
            "distance source has {} vertices and {} faces",
            source.vertex_count(),
            source.face_count()
        )));
    }
    if target.vertices.is_empty() {
        return Err(SsmError::empty_mesh("distance target has no vertices"));
    }

    let triangles: Vec<Triangle> = source.triangles().collect();
    let values: Vec<f64> = target
        .vertices
        .par_iter()
        .map(|v| closest_distance(&triangles, v.position))
        .collect();

    let field = DistanceField { values };
    debug!(
        samples = field.len(),
        mean = field.mean(),
        "Computed surface distance"
    );
    Ok(field)
}

/// A surface that can be compared against another of the same kind.
pub trait SurfaceDistance {
    /// Distances sampled at `other`'s vertices to this surface.
    fn distance_to(&self, other: &Self) -> SsmResult<DistanceField>;
}

impl SurfaceDistance for Mesh {
    fn distance_to(&self, other: &Self) -> SsmResult<DistanceField> {
        surface_distance(self, other)
    }
}

impl<T: SurfaceDistance + ?Sized> SurfaceDistance for &T {
    fn distance_to(&self, other: &Self) -> SsmResult<DistanceField> {
        (**self).distance_to(*other)
    }
}

fn closest_distance(triangles: &[Triangle], p: Point3<f64>) -> f64 {
    triangles
        .iter()
        .map(|tri| (tri.closest_point(p) - p).norm_squared())
        .fold(f64::INFINITY, f64::min)
        .sqrt()
}
