//! Reference shape selection.
//!
//! Grooming aligns every shape to a single reference. These selectors pick
//! that reference from a cohort of images or meshes:
//!
//! - [`find_reference_image_index`]: the image closest (L2) to the voxel-wise
//!   mean of all images after padding them to a common extent.
//! - [`find_reference_mesh_index`]: the mesh whose summed mean surface
//!   distance to all other meshes is largest.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::distance::SurfaceDistance;
use crate::error::{SsmError, SsmResult};
use crate::tracing_ext::{OperationTimer, log_progress};
use crate::volume::{VolumeSource, VoxelArray, as_shape3, max_extent};

/// Index of the image closest to the mean image.
///
/// Images of different extents are zero-padded symmetrically to the per-axis
/// maximum extent before averaging (see [`VoxelArray::pad_to`]). Ties are
/// resolved in favour of the lowest index, and the result does not depend on
/// thread scheduling.
///
/// # Errors
///
/// - `InvalidInput` if `images` is empty or any image is not 3-D
/// - any error raised while converting an image to an array
pub fn find_reference_image_index<I>(images: &[I]) -> SsmResult<usize>
where
    I: VolumeSource + Sync,
{
    if images.is_empty() {
        return Err(SsmError::invalid_input(
            "cannot select a reference image from an empty list",
        ));
    }
    let _timer = OperationTimer::with_count("find_reference_image_index", images.len());

    let shapes = images
        .iter()
        .map(|img| as_shape3(&img.shape()?))
        .collect::<SsmResult<Vec<_>>>()?;
    let target = max_extent(&shapes);
    debug!(?target, "Common padded extent");

    // Sequential accumulation keeps the floating-point sum order fixed.
    let mut sum = vec![0.0; target.iter().product()];
    for (i, img) in images.iter().enumerate() {
        let padded = padded_array(img, target)?;
        for (acc, v) in sum.iter_mut().zip(padded.values()) {
            *acc += v;
        }
        log_progress("mean_image", i + 1, images.len());
    }
    let n = images.len() as f64;
    let mean = VoxelArray::new(target.to_vec(), sum.into_iter().map(|v| v / n).collect())?;

    let distances = images
        .par_iter()
        .map(|img| padded_array(img, target)?.l2_distance(&mean))
        .collect::<SsmResult<Vec<f64>>>()?;

    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &d) in distances.iter().enumerate() {
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }

    info!(index = best, distance = best_dist, "Selected reference image");
    Ok(best)
}

fn padded_array<I: VolumeSource>(img: &I, target: [usize; 3]) -> SsmResult<VoxelArray> {
    img.to_array()?.pad_to(target)
}

/// Index of the mesh with the largest summed mean distance to the others.
///
/// Builds the symmetric N×N matrix of mean surface distances (upper triangle
/// evaluated, mirrored) and returns the argmax of its row sums. This picks
/// the most peripheral mesh of the cohort. Ties go to the lowest index. A
/// single mesh yields 0.
///
/// # Errors
///
/// - `InvalidInput` if `meshes` is empty
/// - any error raised by [`SurfaceDistance::distance_to`]
pub fn find_reference_mesh_index<M>(meshes: &[M]) -> SsmResult<usize>
where
    M: SurfaceDistance + Sync,
{
    let n = meshes.len();
    if n == 0 {
        return Err(SsmError::invalid_input(
            "cannot select a reference mesh from an empty list",
        ));
    }
    let _timer = OperationTimer::with_count("find_reference_mesh_index", n);

    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();
    debug!(pairs = pairs.len(), "Computing pairwise mesh distances");

    let pair_distances = pairs
        .par_iter()
        .map(|&(i, j)| Ok(meshes[i].distance_to(&meshes[j])?.mean()))
        .collect::<SsmResult<Vec<f64>>>()?;

    let mut matrix = vec![vec![0.0; n]; n];
    for (&(i, j), &d) in pairs.iter().zip(&pair_distances) {
        matrix[i][j] = d;
        matrix[j][i] = d;
    }
    let sums: Vec<f64> = matrix.iter().map(|row| row.iter().sum()).collect();

    let mut best = 0;
    for (i, &s) in sums.iter().enumerate() {
        if s > sums[best] {
            best = i;
        }
    }

    info!(index = best, distance_sum = sums[best], "Selected reference mesh");
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceField;
    use crate::{Mesh, Vertex};
    use nalgebra::Vector3;

    fn filled(shape: [usize; 3], value: f64) -> VoxelArray {
        VoxelArray::new(shape.to_vec(), vec![value; shape.iter().product()]).unwrap()
    }

    /// A point on a line; distance is the absolute difference.
    struct Marker(f64);

    impl SurfaceDistance for Marker {
        fn distance_to(&self, other: &Self) -> SsmResult<DistanceField> {
            Ok(DistanceField {
                values: vec![(self.0 - other.0).abs()],
            })
        }
    }

    fn square(offset: f64) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces = vec![[0, 1, 2], [0, 2, 3]];
        mesh.translate(Vector3::new(0.0, 0.0, offset));
        mesh
    }

    #[test]
    fn test_single_image_is_reference() {
        let images = vec![filled([3, 3, 3], 1.0)];
        assert_eq!(find_reference_image_index(&images).unwrap(), 0);
    }

    #[test]
    fn test_identical_images_pick_first() {
        let images = vec![filled([4, 4, 4], 2.0); 5];
        assert_eq!(find_reference_image_index(&images).unwrap(), 0);
    }

    #[test]
    fn test_outlier_image_is_not_reference() {
        let images = vec![
            filled([10, 10, 10], 1.0),
            filled([10, 10, 10], 0.0),
            filled([10, 10, 10], 0.0),
            filled([10, 10, 10], 0.0),
        ];
        let idx = find_reference_image_index(&images).unwrap();
        assert!((1..4).contains(&idx));
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_mixed_extents_are_padded() {
        let images = vec![
            filled([2, 2, 2], 1.0),
            filled([4, 3, 5], 1.0),
            filled([3, 3, 3], 1.0),
        ];
        let idx = find_reference_image_index(&images).unwrap();
        assert!(idx < 3);
    }

    #[test]
    fn test_image_selection_is_deterministic() {
        let images: Vec<VoxelArray> = (0..6)
            .map(|i| filled([3 + i % 2, 3, 4], i as f64 * 0.5))
            .collect();
        let first = find_reference_image_index(&images).unwrap();
        for _ in 0..5 {
            assert_eq!(find_reference_image_index(&images).unwrap(), first);
        }
    }

    #[test]
    fn test_empty_image_list_is_rejected() {
        let images: Vec<VoxelArray> = Vec::new();
        let err = find_reference_image_index(&images).unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_two_dimensional_image_is_rejected() {
        let images = vec![VoxelArray::new(vec![2, 2], vec![0.0; 4]).unwrap()];
        let err = find_reference_image_index(&images).unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_mesh_selection_is_argmax() {
        // Row sums: 0 -> 1+10=11, 1 -> 1+9=10, 2 -> 10+9=19
        let markers = vec![Marker(0.0), Marker(1.0), Marker(10.0)];
        assert_eq!(find_reference_mesh_index(&markers).unwrap(), 2);
    }

    #[test]
    fn test_mesh_ties_pick_lowest_index() {
        let markers = vec![Marker(0.0), Marker(4.0)];
        assert_eq!(find_reference_mesh_index(&markers).unwrap(), 0);
    }

    #[test]
    fn test_single_mesh_is_reference() {
        let meshes = vec![square(0.0)];
        assert_eq!(find_reference_mesh_index(&meshes).unwrap(), 0);
    }

    #[test]
    fn test_two_real_meshes_tie() {
        let meshes = vec![square(0.0), square(1.0)];
        assert_eq!(find_reference_mesh_index(&meshes).unwrap(), 0);
    }

    #[test]
    fn test_empty_mesh_list_is_rejected() {
        let meshes: Vec<Mesh> = Vec::new();
        let err = find_reference_mesh_index(&meshes).unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_mesh_distance_errors_propagate() {
        let meshes = vec![square(0.0), Mesh::new()];
        let err = find_reference_mesh_index(&meshes).unwrap_err();
        assert!(matches!(err, SsmError::EmptyMesh { .. }));
    }
}
