//! Property-based tests for reference selection, padding and contours.
//!
//! Run with: cargo test -p ssm-core --test proptest_reference

use proptest::prelude::*;
use ssm_core::{
    DistanceField, SsmResult, SurfaceDistance, VoxelArray, compute_line_indices,
    find_reference_image_index, find_reference_mesh_index, max_extent,
};

// =============================================================================
// Strategies
// =============================================================================

fn arb_shape() -> impl Strategy<Value = [usize; 3]> {
    prop::array::uniform3(1usize..6)
}

fn arb_array() -> impl Strategy<Value = VoxelArray> {
    arb_shape().prop_flat_map(|shape| {
        let n: usize = shape.iter().product();
        prop::collection::vec(0.0..10.0f64, n)
            .prop_map(move |values| VoxelArray::new(shape.to_vec(), values).unwrap())
    })
}

/// A point on a line; distance is the absolute difference.
#[derive(Debug, Clone)]
struct Marker(f64);

impl SurfaceDistance for Marker {
    fn distance_to(&self, other: &Self) -> SsmResult<DistanceField> {
        Ok(DistanceField {
            values: vec![(self.0 - other.0).abs()],
        })
    }
}

// =============================================================================
// Padding
// =============================================================================

proptest! {
    #[test]
    fn padding_reaches_target_and_keeps_mass(
        array in arb_array(),
        extra in prop::array::uniform3(0usize..4),
    ) {
        let shape = array.shape3().unwrap();
        let target = [shape[0] + extra[0], shape[1] + extra[1], shape[2] + extra[2]];
        let padded = array.pad_to(target).unwrap();

        prop_assert_eq!(padded.shape(), &target[..]);
        let before: f64 = array.values().iter().sum();
        let after: f64 = padded.values().iter().sum();
        prop_assert!((before - after).abs() < 1e-9);

        // The original sits at the floor-half offset
        let lead = [extra[0] / 2, extra[1] / 2, extra[2] / 2];
        prop_assert_eq!(
            padded.get3(lead[0], lead[1], lead[2]),
            array.get3(0, 0, 0)
        );
    }

    #[test]
    fn padding_smaller_target_fails(array in arb_array()) {
        let shape = array.shape3().unwrap();
        prop_assume!(shape[0] > 1);
        let target = [shape[0] - 1, shape[1], shape[2]];
        prop_assert!(array.pad_to(target).is_err());
    }

    #[test]
    fn max_extent_dominates_all(shapes in prop::collection::vec(arb_shape(), 1..8)) {
        let m = max_extent(&shapes);
        for s in &shapes {
            prop_assert!(s[0] <= m[0] && s[1] <= m[1] && s[2] <= m[2]);
        }
        for axis in 0..3 {
            prop_assert!(shapes.iter().any(|s| s[axis] == m[axis]));
        }
    }
}

// =============================================================================
// Reference selection
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn image_index_is_in_range_and_stable(arrays in prop::collection::vec(arb_array(), 1..6)) {
        let first = find_reference_image_index(&arrays).unwrap();
        prop_assert!(first < arrays.len());
        prop_assert_eq!(find_reference_image_index(&arrays).unwrap(), first);
    }

    #[test]
    fn identical_images_pick_first(array in arb_array(), count in 1usize..5) {
        let arrays = vec![array; count];
        prop_assert_eq!(find_reference_image_index(&arrays).unwrap(), 0);
    }

    #[test]
    fn mesh_index_maximises_row_sum(positions in prop::collection::vec(-50.0..50.0f64, 1..10)) {
        let markers: Vec<Marker> = positions.iter().copied().map(Marker).collect();
        let idx = find_reference_mesh_index(&markers).unwrap();

        let sums: Vec<f64> = positions
            .iter()
            .map(|a| positions.iter().map(|b| (a - b).abs()).sum())
            .collect();
        // Same summation order as the selector, so comparisons are exact
        for (i, s) in sums.iter().enumerate() {
            prop_assert!(*s <= sums[idx]);
            if i < idx {
                prop_assert!(*s < sums[idx]);
            }
        }
    }
}

// =============================================================================
// Contours
// =============================================================================

proptest! {
    #[test]
    fn line_indices_are_valid(n in 1usize..200, closed in any::<bool>()) {
        let lines = compute_line_indices(n, closed).unwrap();
        prop_assert_eq!(lines.len(), if closed { n } else { n - 1 });
        for (i, [a, b]) in lines.iter().enumerate() {
            prop_assert_eq!(*a, i);
            prop_assert!(*b < n);
            prop_assert_eq!(*b, (i + 1) % n);
        }
    }
}
