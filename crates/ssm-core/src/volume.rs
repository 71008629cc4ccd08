//! Volumetric images and the array view used by reference selection.
//!
//! A [`Volume`] is a 3-D scalar grid with a physical-to-index mapping
//! (origin + per-axis spacing). Values are stored as `f64` in x-fastest
//! order regardless of the element type the volume was decoded from; the
//! original [`ElementType`] is kept so it can be written back unchanged.
//!
//! [`VoxelArray`] is the plain N-dimensional array a volume exposes through
//! [`VolumeSource::to_array`]. Selection code works on arrays only and checks
//! their dimensionality itself.

use std::path::{Path, PathBuf};

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{SsmError, SsmResult};

/// Voxel element types understood by the volume reader and writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    UChar,
    Char,
    UShort,
    Short,
    UInt,
    Int,
    Float,
    Double,
}

impl ElementType {
    /// Parse an NRRD `type:` field, accepting the standard aliases.
    ///
    /// Types outside the supported set (`int64`, `block`, ...) are reported
    /// as [`SsmError::UnsupportedType`].
    pub fn from_nrrd(name: &str) -> SsmResult<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        let ty = match normalized.as_str() {
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ElementType::UChar,
            "signed char" | "char" | "int8" | "int8_t" => ElementType::Char,
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ElementType::UShort
            }
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ElementType::Short
            }
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ElementType::UInt,
            "int" | "signed int" | "int32" | "int32_t" => ElementType::Int,
            "float" => ElementType::Float,
            "double" => ElementType::Double,
            _ => return Err(SsmError::unsupported_type(name.trim())),
        };
        Ok(ty)
    }

    /// Canonical NRRD name.
    pub fn nrrd_name(&self) -> &'static str {
        match self {
            ElementType::UChar => "uchar",
            ElementType::Char => "signed char",
            ElementType::UShort => "ushort",
            ElementType::Short => "short",
            ElementType::UInt => "uint",
            ElementType::Int => "int",
            ElementType::Float => "float",
            ElementType::Double => "double",
        }
    }

    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::UChar | ElementType::Char => 1,
            ElementType::UShort | ElementType::Short => 2,
            ElementType::UInt | ElementType::Int | ElementType::Float => 4,
            ElementType::Double => 8,
        }
    }

    /// True for the integer types.
    pub fn is_integer(&self) -> bool {
        !matches!(self, ElementType::Float | ElementType::Double)
    }
}

/// A dense N-dimensional array of `f64`, first axis fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelArray {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl VoxelArray {
    /// Create an array, checking that `values` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> SsmResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(SsmError::invalid_input(format!(
                "array shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Zero-filled 3-D array.
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape: shape.to_vec(),
            values: vec![0.0; shape.iter().product()],
        }
    }

    /// Array shape, one entry per axis.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Flat values, first axis fastest.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Consume the array, returning its flat values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Shape as a fixed 3-tuple, or `InvalidInput` if the array is not 3-D.
    pub fn shape3(&self) -> SsmResult<[usize; 3]> {
        as_shape3(&self.shape)
    }

    /// Value at `(i, j, k)` of a 3-D array.
    #[inline]
    pub fn get3(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[i + self.shape[0] * (j + self.shape[1] * k)]
    }

    /// Zero-pad a 3-D array to `target`.
    ///
    /// Each axis gets `(target - extent) / 2` leading zeros and the remainder
    /// trailing, so an odd difference puts the extra slice at the end.
    pub fn pad_to(&self, target: [usize; 3]) -> SsmResult<VoxelArray> {
        let shape = self.shape3()?;
        if shape.iter().zip(target.iter()).any(|(s, t)| s > t) {
            return Err(SsmError::invalid_input(format!(
                "cannot pad shape {:?} down to {:?}",
                shape, target
            )));
        }
        if shape == target {
            return Ok(self.clone());
        }

        let lead = [
            (target[0] - shape[0]) / 2,
            (target[1] - shape[1]) / 2,
            (target[2] - shape[2]) / 2,
        ];
        let mut padded = VoxelArray::zeros(target);
        for k in 0..shape[2] {
            for j in 0..shape[1] {
                let src = shape[0] * (j + shape[1] * k);
                let dst = lead[0] + target[0] * ((j + lead[1]) + target[1] * (k + lead[2]));
                padded.values[dst..dst + shape[0]]
                    .copy_from_slice(&self.values[src..src + shape[0]]);
            }
        }
        Ok(padded)
    }

    /// Euclidean norm of `self - other` over the flattened arrays.
    pub fn l2_distance(&self, other: &VoxelArray) -> SsmResult<f64> {
        if self.shape != other.shape {
            return Err(SsmError::invalid_input(format!(
                "shape mismatch: {:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        let sum_sq: f64 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Ok(sum_sq.sqrt())
    }
}

pub(crate) fn as_shape3(shape: &[usize]) -> SsmResult<[usize; 3]> {
    match *shape {
        [x, y, z] => Ok([x, y, z]),
        _ => Err(SsmError::invalid_input(format!(
            "expected a 3-D array, got {} dimension(s) with shape {:?}",
            shape.len(),
            shape
        ))),
    }
}

/// Per-axis maximum over a set of 3-D shapes.
pub fn max_extent(shapes: &[[usize; 3]]) -> [usize; 3] {
    shapes.iter().fold([0, 0, 0], |acc, s| {
        [acc[0].max(s[0]), acc[1].max(s[1]), acc[2].max(s[2])]
    })
}

/// Anything that can be viewed as a numeric array.
///
/// `shape` has a default that converts the whole array; implementors that
/// can report the shape cheaply (an in-memory volume, a file header) should
/// override it.
pub trait VolumeSource {
    /// Convert to a dense numeric array.
    fn to_array(&self) -> SsmResult<VoxelArray>;

    /// Shape of the array `to_array` would return.
    fn shape(&self) -> SsmResult<Vec<usize>> {
        Ok(self.to_array()?.shape)
    }
}

impl VolumeSource for VoxelArray {
    fn to_array(&self) -> SsmResult<VoxelArray> {
        Ok(self.clone())
    }

    fn shape(&self) -> SsmResult<Vec<usize>> {
        Ok(self.shape.clone())
    }
}

impl VolumeSource for Volume {
    fn to_array(&self) -> SsmResult<VoxelArray> {
        Ok(VoxelArray {
            shape: self.dims.to_vec(),
            values: self.data.clone(),
        })
    }

    fn shape(&self) -> SsmResult<Vec<usize>> {
        Ok(self.dims.to_vec())
    }
}

/// Files on disk are read lazily, one at a time.
impl VolumeSource for Path {
    fn to_array(&self) -> SsmResult<VoxelArray> {
        crate::nrrd::load_volume(self)?.to_array()
    }

    fn shape(&self) -> SsmResult<Vec<usize>> {
        Ok(crate::nrrd::read_header(self)?.sizes)
    }
}

impl VolumeSource for PathBuf {
    fn to_array(&self) -> SsmResult<VoxelArray> {
        self.as_path().to_array()
    }

    fn shape(&self) -> SsmResult<Vec<usize>> {
        VolumeSource::shape(self.as_path())
    }
}

impl<T: VolumeSource + ?Sized> VolumeSource for &T {
    fn to_array(&self) -> SsmResult<VoxelArray> {
        (**self).to_array()
    }

    fn shape(&self) -> SsmResult<Vec<usize>> {
        (**self).shape()
    }
}

/// A 3-D scalar image with physical geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// Grid dimensions [x, y, z].
    pub dims: [usize; 3],
    /// Physical size of one voxel along each axis.
    pub spacing: Vector3<f64>,
    /// Physical position of voxel (0, 0, 0).
    pub origin: Point3<f64>,
    /// Element type the volume was read from or should be written as.
    pub element_type: ElementType,
    /// Voxel values, x fastest.
    pub data: Vec<f64>,
}

impl Volume {
    /// Create a volume from existing data with unit spacing at the origin.
    pub fn new(dims: [usize; 3], data: Vec<f64>, element_type: ElementType) -> SsmResult<Self> {
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(SsmError::invalid_input(format!(
                "volume {:?} needs {} voxels, got {}",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            dims,
            spacing: Vector3::new(1.0, 1.0, 1.0),
            origin: Point3::origin(),
            element_type,
            data,
        })
    }

    /// Volume filled with a constant.
    pub fn filled(dims: [usize; 3], value: f64, element_type: ElementType) -> Self {
        Self {
            dims,
            spacing: Vector3::new(1.0, 1.0, 1.0),
            origin: Point3::origin(),
            element_type,
            data: vec![value; dims.iter().product()],
        }
    }

    /// Builder-style spacing override.
    pub fn with_spacing(mut self, spacing: Vector3<f64>) -> Self {
        self.spacing = spacing;
        self
    }

    /// Builder-style origin override.
    pub fn with_origin(mut self, origin: Point3<f64>) -> Self {
        self.origin = origin;
        self
    }

    /// Total voxel count.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Value at index `(i, j, k)`; None when out of range.
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        if i < self.dims[0] && j < self.dims[1] && k < self.dims[2] {
            Some(self.data[self.index(i, j, k)])
        } else {
            None
        }
    }

    /// Set the value at `(i, j, k)`. Out-of-range writes are ignored.
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        if i < self.dims[0] && j < self.dims[1] && k < self.dims[2] {
            let idx = self.index(i, j, k);
            self.data[idx] = value;
        }
    }

    /// Physical position of a voxel index.
    pub fn index_to_physical(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        Point3::new(
            self.origin.x + i as f64 * self.spacing.x,
            self.origin.y + j as f64 * self.spacing.y,
            self.origin.z + k as f64 * self.spacing.z,
        )
    }

    /// Minimum and maximum voxel value; None for an empty volume.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let first = *self.data.first()?;
        Some(
            self.data
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Intensity-weighted centroid in physical coordinates.
    ///
    /// Returns None when every voxel is zero.
    pub fn center_of_mass(&self) -> Option<Point3<f64>> {
        let mut total = 0.0;
        let mut acc = Vector3::zeros();
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                for i in 0..self.dims[0] {
                    let v = self.data[self.index(i, j, k)];
                    if v != 0.0 {
                        total += v;
                        acc += Vector3::new(i as f64, j as f64, k as f64) * v;
                    }
                }
            }
        }
        if total == 0.0 {
            return None;
        }
        let idx = acc / total;
        Some(Point3::new(
            self.origin.x + idx.x * self.spacing.x,
            self.origin.y + idx.y * self.spacing.y,
            self.origin.z + idx.z * self.spacing.z,
        ))
    }

    /// Copy whose origin places the image centre at the physical origin.
    pub fn recentered(&self) -> Volume {
        let half_extent = Vector3::new(
            self.dims[0].saturating_sub(1) as f64 * self.spacing.x,
            self.dims[1].saturating_sub(1) as f64 * self.spacing.y,
            self.dims[2].saturating_sub(1) as f64 * self.spacing.z,
        ) / 2.0;
        let mut out = self.clone();
        out.origin = Point3::from(-half_extent);
        out
    }

    /// Copy padded by `padding` voxels of `value` on every side.
    ///
    /// The origin moves so existing voxels keep their physical positions.
    pub fn padded(&self, padding: usize, value: f64) -> Volume {
        let dims = [
            self.dims[0] + 2 * padding,
            self.dims[1] + 2 * padding,
            self.dims[2] + 2 * padding,
        ];
        let mut out = Volume::filled(dims, value, self.element_type)
            .with_spacing(self.spacing)
            .with_origin(Point3::new(
                self.origin.x - padding as f64 * self.spacing.x,
                self.origin.y - padding as f64 * self.spacing.y,
                self.origin.z - padding as f64 * self.spacing.z,
            ));
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                let src = self.index(0, j, k);
                let dst = out.index(padding, j + padding, k + padding);
                out.data[dst..dst + self.dims[0]]
                    .copy_from_slice(&self.data[src..src + self.dims[0]]);
            }
        }
        debug!(
            from = ?self.dims,
            to = ?out.dims,
            padding,
            "Padded volume"
        );
        out
    }

    /// Inclusive index bounds of voxels strictly above `threshold`.
    pub fn foreground_bounds(&self, threshold: f64) -> Option<([usize; 3], [usize; 3])> {
        let mut min = [usize::MAX; 3];
        let mut max = [0usize; 3];
        let mut found = false;
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                for i in 0..self.dims[0] {
                    if self.data[self.index(i, j, k)] > threshold {
                        found = true;
                        for (axis, v) in [i, j, k].into_iter().enumerate() {
                            min[axis] = min[axis].min(v);
                            max[axis] = max[axis].max(v);
                        }
                    }
                }
            }
        }
        found.then_some((min, max))
    }

    /// Separable 3x3x3 box blur applied `passes` times, edges clamped.
    pub fn box_blurred(&self, passes: usize) -> Volume {
        let mut current = self.data.clone();
        let mut scratch = vec![0.0; current.len()];
        let [nx, ny, nz] = self.dims;
        let strides = [1, nx, nx * ny];
        let extents = [nx, ny, nz];

        for _ in 0..passes {
            for axis in 0..3 {
                let stride = strides[axis];
                let extent = extents[axis];
                for k in 0..nz {
                    for j in 0..ny {
                        for i in 0..nx {
                            let idx = i + nx * (j + ny * k);
                            let pos = [i, j, k][axis];
                            let prev = if pos > 0 { idx - stride } else { idx };
                            let next = if pos + 1 < extent { idx + stride } else { idx };
                            scratch[idx] = (current[prev] + current[idx] + current[next]) / 3.0;
                        }
                    }
                }
                std::mem::swap(&mut current, &mut scratch);
            }
        }

        let mut out = self.clone();
        out.data = current;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    fn ramp(shape: [usize; 3]) -> VoxelArray {
        let n: usize = shape.iter().product();
        VoxelArray::new(shape.to_vec(), (0..n).map(|v| v as f64 + 1.0).collect()).unwrap()
    }

    #[test]
    fn test_element_type_aliases() {
        assert_eq!(ElementType::from_nrrd("unsigned char").unwrap(), ElementType::UChar);
        assert_eq!(ElementType::from_nrrd("int16").unwrap(), ElementType::Short);
        assert_eq!(ElementType::from_nrrd(" float ").unwrap(), ElementType::Float);
        assert_eq!(ElementType::Double.size_bytes(), 8);
        assert!(ElementType::UShort.is_integer());
    }

    #[test]
    fn test_unsupported_element_type() {
        let err = ElementType::from_nrrd("int64").unwrap_err();
        assert!(matches!(err, SsmError::UnsupportedType { ref type_name } if type_name == "int64"));
    }

    #[test]
    fn test_array_shape_must_match_values() {
        assert!(VoxelArray::new(vec![2, 2, 2], vec![0.0; 7]).is_err());
        assert!(VoxelArray::new(vec![2, 2, 2], vec![0.0; 8]).is_ok());
    }

    #[test]
    fn test_shape3_rejects_other_dimensionality() {
        let flat = VoxelArray::new(vec![4, 4], vec![0.0; 16]).unwrap();
        let err = flat.shape3().unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }

    #[test]
    fn test_pad_even_difference_is_centered() {
        let a = ramp([2, 2, 2]);
        let p = a.pad_to([4, 4, 4]).unwrap();
        assert_eq!(p.shape(), &[4, 4, 4]);
        assert!(approx_eq(p.get3(0, 0, 0), 0.0));
        assert!(approx_eq(p.get3(1, 1, 1), a.get3(0, 0, 0)));
        assert!(approx_eq(p.get3(2, 2, 2), a.get3(1, 1, 1)));
        assert!(approx_eq(p.get3(3, 3, 3), 0.0));
    }

    #[test]
    fn test_pad_odd_difference_puts_extra_at_end() {
        let a = ramp([1, 1, 1]);
        let p = a.pad_to([2, 4, 1]).unwrap();
        assert_eq!(p.shape(), &[2, 4, 1]);
        // x: lead 0, trail 1; y: lead 1, trail 2
        assert!(approx_eq(p.get3(0, 1, 0), 1.0));
        let total: f64 = p.values().iter().sum();
        assert!(approx_eq(total, 1.0));
    }

    #[test]
    fn test_pad_to_smaller_shape_fails() {
        let a = ramp([3, 3, 3]);
        assert!(a.pad_to([2, 3, 3]).is_err());
    }

    #[test]
    fn test_max_extent() {
        assert_eq!(max_extent(&[[3, 1, 4], [1, 5, 9], [2, 6, 5]]), [3, 6, 9]);
        assert_eq!(max_extent(&[]), [0, 0, 0]);
    }

    #[test]
    fn test_l2_distance() {
        let a = VoxelArray::zeros([2, 1, 1]);
        let b = VoxelArray::new(vec![2, 1, 1], vec![3.0, 4.0]).unwrap();
        assert!(approx_eq(a.l2_distance(&b).unwrap(), 5.0));
        assert!(a.l2_distance(&VoxelArray::zeros([1, 2, 1])).is_err());
    }

    #[test]
    fn test_center_of_mass() {
        let mut v = Volume::filled([5, 5, 5], 0.0, ElementType::UChar)
            .with_spacing(Vector3::new(2.0, 1.0, 1.0))
            .with_origin(Point3::new(10.0, 0.0, 0.0));
        v.set(1, 2, 3, 1.0);
        v.set(3, 2, 3, 1.0);
        let com = v.center_of_mass().unwrap();
        assert!(approx_eq(com.x, 10.0 + 2.0 * 2.0));
        assert!(approx_eq(com.y, 2.0));
        assert!(approx_eq(com.z, 3.0));

        let empty = Volume::filled([2, 2, 2], 0.0, ElementType::UChar);
        assert!(empty.center_of_mass().is_none());
    }

    #[test]
    fn test_recentered_origin() {
        let v = Volume::filled([11, 21, 3], 0.0, ElementType::Float)
            .with_spacing(Vector3::new(1.0, 0.5, 2.0));
        let r = v.recentered();
        assert!(approx_eq(r.origin.x, -5.0));
        assert!(approx_eq(r.origin.y, -5.0));
        assert!(approx_eq(r.origin.z, -2.0));
        assert_eq!(r.data, v.data);
    }

    #[test]
    fn test_padded_keeps_physical_positions() {
        let mut v = Volume::filled([2, 2, 2], 0.0, ElementType::Short);
        v.set(1, 1, 1, 7.0);
        let p = v.padded(2, -1.0);
        assert_eq!(p.dims, [6, 6, 6]);
        assert_eq!(p.get(3, 3, 3), Some(7.0));
        assert_eq!(p.get(0, 0, 0), Some(-1.0));
        assert_eq!(p.index_to_physical(3, 3, 3), v.index_to_physical(1, 1, 1));
    }

    #[test]
    fn test_foreground_bounds() {
        let mut v = Volume::filled([6, 6, 6], 0.0, ElementType::UChar);
        assert!(v.foreground_bounds(0.0).is_none());
        v.set(1, 2, 3, 1.0);
        v.set(4, 2, 5, 1.0);
        let (min, max) = v.foreground_bounds(0.0).unwrap();
        assert_eq!(min, [1, 2, 3]);
        assert_eq!(max, [4, 2, 5]);
    }

    #[test]
    fn test_box_blur_preserves_constant() {
        let v = Volume::filled([4, 3, 2], 5.0, ElementType::Float);
        let b = v.box_blurred(2);
        assert!(b.data.iter().all(|&x| approx_eq(x, 5.0)));
    }

    #[test]
    fn test_box_blur_spreads_impulse() {
        let mut v = Volume::filled([5, 5, 5], 0.0, ElementType::Float);
        v.set(2, 2, 2, 27.0);
        let b = v.box_blurred(1);
        assert!(approx_eq(b.get(2, 2, 2).unwrap(), 1.0));
        assert!(approx_eq(b.get(1, 1, 1).unwrap(), 1.0));
        assert!(approx_eq(b.get(0, 0, 0).unwrap(), 0.0));
    }
}
