//! Synthetic shape cohorts for testing and tutorials.
//!
//! Generation runs in stages, each producing a new immutable record:
//!
//! ```text
//! CohortGenerator::generate(n) -> CohortMeshes
//!     .segmentations(spacing)  -> CohortSegmentations
//!     .images(&synthesis)      -> CohortImages
//! ```
//!
//! Nothing touches the filesystem until one of the `save` methods is called.
//! All randomness comes from seeded [`StdRng`]s, so a seed fully determines
//! the cohort.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SsmError, SsmResult};
use crate::tracing_ext::{OperationTimer, log_mesh_stats};
use crate::utils::{save_meshes, save_volumes};
use crate::{ElementType, Mesh, Vertex, Volume};

/// A family of random shapes.
///
/// Shapes are described in their own local frame; placement in the world is
/// handled by [`CohortGenerator`].
pub trait ShapeGenerator: Clone + Send + Sync {
    /// Parameters of one drawn shape.
    type Shape: Clone + Debug + Send + Sync;

    /// Short name used for output files.
    fn name(&self) -> &'static str;

    /// Draw random shape parameters.
    fn sample(&self, rng: &mut StdRng) -> Self::Shape;

    /// Closed triangle surface of `shape`, outward winding.
    fn mesh(&self, shape: &Self::Shape) -> Mesh;

    /// Whether the local-frame point `p` lies inside `shape`.
    fn contains(&self, shape: &Self::Shape, p: Point3<f64>) -> bool;
}

/// Axis-aligned ellipsoid with random semi-axes.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsoidGenerator {
    pub min_radius: f64,
    pub max_radius: f64,
    /// Samples around the equator; half as many rings pole to pole.
    pub resolution: usize,
}

impl Default for EllipsoidGenerator {
    fn default() -> Self {
        Self {
            min_radius: 5.0,
            max_radius: 25.0,
            resolution: 32,
        }
    }
}

impl ShapeGenerator for EllipsoidGenerator {
    type Shape = Vector3<f64>;

    fn name(&self) -> &'static str {
        "ellipsoid"
    }

    fn sample(&self, rng: &mut StdRng) -> Vector3<f64> {
        Vector3::from_fn(|_, _| rng.random_range(self.min_radius..=self.max_radius))
    }

    fn mesh(&self, radii: &Vector3<f64>) -> Mesh {
        parametric_surface(self.resolution, |theta, phi| {
            Point3::new(
                radii.x * phi.cos() * theta.cos(),
                radii.y * phi.cos() * theta.sin(),
                radii.z * phi.sin(),
            )
        })
    }

    fn contains(&self, radii: &Vector3<f64>, p: Point3<f64>) -> bool {
        p.coords.component_div(radii).norm_squared() <= 1.0
    }
}

/// Superformula shape parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Supershape {
    /// Rotational symmetry order.
    pub m: f64,
    /// Shared exponent (n1 = n2 = n3).
    pub n: f64,
}

impl Supershape {
    /// Superformula radius at angle `angle`.
    fn radius(&self, angle: f64) -> f64 {
        let t = self.m * angle / 4.0;
        (t.cos().abs().powf(self.n) + t.sin().abs().powf(self.n)).powf(-1.0 / self.n)
    }
}

/// 3-D supershapes with `m`-fold symmetry and random exponents.
#[derive(Debug, Clone, PartialEq)]
pub struct SupershapeGenerator {
    pub m: u32,
    /// Scale applied to the unit supershape.
    pub size: f64,
    pub min_exponent: f64,
    pub max_exponent: f64,
    pub resolution: usize,
}

impl SupershapeGenerator {
    pub fn new(m: u32, size: f64) -> Self {
        Self {
            m,
            size,
            ..Default::default()
        }
    }
}

impl Default for SupershapeGenerator {
    fn default() -> Self {
        Self {
            m: 3,
            size: 20.0,
            min_exponent: 0.75,
            max_exponent: 3.0,
            resolution: 48,
        }
    }
}

impl ShapeGenerator for SupershapeGenerator {
    type Shape = Supershape;

    fn name(&self) -> &'static str {
        "supershape"
    }

    fn sample(&self, rng: &mut StdRng) -> Supershape {
        Supershape {
            m: self.m as f64,
            n: rng.random_range(self.min_exponent..=self.max_exponent),
        }
    }

    fn mesh(&self, shape: &Supershape) -> Mesh {
        parametric_surface(self.resolution, |theta, phi| {
            let r1 = shape.radius(theta);
            let r2 = shape.radius(phi);
            Point3::new(
                self.size * r1 * theta.cos() * r2 * phi.cos(),
                self.size * r1 * theta.sin() * r2 * phi.cos(),
                self.size * r2 * phi.sin(),
            )
        })
    }

    fn contains(&self, shape: &Supershape, p: Point3<f64>) -> bool {
        let q = p.coords / self.size;
        let dist = q.norm();
        if dist == 0.0 {
            return true;
        }
        let theta = q.y.atan2(q.x);
        let elevation = q.z.atan2(q.x.hypot(q.y));
        let r1 = shape.radius(theta);
        // Surface parameter whose point lies in the direction of `q`.
        let phi = (r1 * elevation.sin()).atan2(elevation.cos());
        let r2 = shape.radius(phi);
        let surface = r2 * (r1 * r1 * phi.cos().powi(2) + phi.sin().powi(2)).sqrt();
        dist <= surface
    }
}

/// Closed surface over longitude `theta` in [-pi, pi) and latitude `phi`
/// in [-pi/2, pi/2], with single-vertex poles.
fn parametric_surface<F>(resolution: usize, f: F) -> Mesh
where
    F: Fn(f64, f64) -> Point3<f64>,
{
    let segments = resolution.max(3);
    let rings = (resolution / 2).max(2);
    let ring_count = rings - 1;

    let mut mesh = Mesh::with_capacity(2 + segments * ring_count, 2 * segments * rings);
    mesh.vertices.push(Vertex::new(f(0.0, FRAC_PI_2)));
    mesh.vertices.push(Vertex::new(f(0.0, -FRAC_PI_2)));

    for r in 1..rings {
        let phi = FRAC_PI_2 - PI * r as f64 / rings as f64;
        for s in 0..segments {
            let theta = -PI + 2.0 * PI * s as f64 / segments as f64;
            mesh.vertices.push(Vertex::new(f(theta, phi)));
        }
    }

    let ring = |r: usize, s: usize| (2 + r * segments + s % segments) as u32;
    for s in 0..segments {
        mesh.faces.push([0, ring(0, s), ring(0, s + 1)]);
    }
    for r in 0..ring_count - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            mesh.faces.push([a, c, d]);
            mesh.faces.push([a, d, b]);
        }
    }
    let last = ring_count - 1;
    for s in 0..segments {
        mesh.faces.push([1, ring(last, s + 1), ring(last, s)]);
    }
    mesh
}

/// Placement options for generated samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementOptions {
    pub randomize_center: bool,
    pub randomize_rotation: bool,
    /// Centers are drawn from `[-center_range, center_range]` per axis.
    pub center_range: f64,
    pub seed: u64,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            randomize_center: true,
            randomize_rotation: true,
            center_range: 10.0,
            seed: 0,
        }
    }
}

impl PlacementOptions {
    /// `center_range` must be a finite, non-negative half-width.
    pub fn validate(&self) -> SsmResult<()> {
        if !(self.center_range >= 0.0 && self.center_range.is_finite()) {
            return Err(SsmError::config(format!(
                "center_range must be finite and non-negative, got {}",
                self.center_range
            )));
        }
        Ok(())
    }
}

fn is_positive_finite(x: f64) -> bool {
    x > 0.0 && x.is_finite()
}

/// One generated shape: its parameters, world placement and surface.
#[derive(Debug, Clone)]
pub struct ShapeSample<T> {
    pub shape: T,
    /// Local-to-world transform.
    pub transform: Isometry3<f64>,
    /// Surface in world coordinates.
    pub mesh: Mesh,
}

/// Draws cohorts from a [`ShapeGenerator`].
#[derive(Debug, Clone)]
pub struct CohortGenerator<S> {
    pub generator: S,
    pub placement: PlacementOptions,
}

impl<S: ShapeGenerator> CohortGenerator<S> {
    pub fn new(generator: S, placement: PlacementOptions) -> Self {
        Self {
            generator,
            placement,
        }
    }

    /// Draw `count` shapes.
    pub fn generate(&self, count: usize) -> SsmResult<CohortMeshes<S>> {
        if count == 0 {
            return Err(SsmError::invalid_input("a cohort needs at least one sample"));
        }
        self.placement.validate()?;
        let _timer = OperationTimer::with_count("generate_cohort", count);
        let mut rng = StdRng::seed_from_u64(self.placement.seed);

        let mut samples = Vec::with_capacity(count);
        for i in 0..count {
            let shape = self.generator.sample(&mut rng);
            let center = if self.placement.randomize_center {
                let range = self.placement.center_range;
                Vector3::from_fn(|_, _| rng.random_range(-range..=range))
            } else {
                Vector3::zeros()
            };
            let rotation = if self.placement.randomize_rotation {
                UnitQuaternion::from_euler_angles(
                    rng.random_range(0.0..2.0 * PI),
                    rng.random_range(0.0..2.0 * PI),
                    rng.random_range(0.0..2.0 * PI),
                )
            } else {
                UnitQuaternion::identity()
            };
            let transform = Isometry3::from_parts(Translation3::from(center), rotation);

            let mut mesh = self.generator.mesh(&shape);
            for v in &mut mesh.vertices {
                v.position = transform * v.position;
            }
            debug!(index = i, ?shape, "Generated shape");
            log_mesh_stats(&mesh, self.generator.name());
            samples.push(ShapeSample {
                shape,
                transform,
                mesh,
            });
        }

        info!(
            count,
            kind = self.generator.name(),
            "Generated cohort meshes"
        );
        Ok(CohortMeshes {
            generator: self.generator.clone(),
            samples,
        })
    }
}

fn sample_names(kind: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}_{:02}", kind, i)).collect()
}

/// Generated surfaces.
#[derive(Debug, Clone)]
pub struct CohortMeshes<S: ShapeGenerator> {
    pub generator: S,
    pub samples: Vec<ShapeSample<S::Shape>>,
}

impl<S: ShapeGenerator> CohortMeshes<S> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        sample_names(self.generator.name(), self.samples.len())
    }

    pub fn meshes(&self) -> Vec<Mesh> {
        self.samples.iter().map(|s| s.mesh.clone()).collect()
    }

    /// Voxelise every sample into a binary segmentation.
    ///
    /// Each grid covers the sample's bounding box plus `margin` voxels on
    /// every side at isotropic `spacing`. Voxels whose centre lies inside the
    /// shape are 1, all others 0.
    pub fn segmentations(&self, spacing: f64, margin: usize) -> SsmResult<CohortSegmentations> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SsmError::invalid_input(format!(
                "voxel spacing must be positive, got {}",
                spacing
            )));
        }
        let _timer = OperationTimer::with_count("voxelise_cohort", self.samples.len());

        let volumes = self
            .samples
            .par_iter()
            .map(|sample| self.voxelise(sample, spacing, margin))
            .collect::<SsmResult<Vec<_>>>()?;

        Ok(CohortSegmentations {
            names: self.names(),
            volumes,
        })
    }

    fn voxelise(
        &self,
        sample: &ShapeSample<S::Shape>,
        spacing: f64,
        margin: usize,
    ) -> SsmResult<Volume> {
        let (min, max) = sample
            .mesh
            .bounds()
            .ok_or_else(|| SsmError::empty_mesh("generated sample has no vertices"))?;
        let pad = margin as f64 * spacing;
        let origin = min - Vector3::repeat(pad);
        let extent = max - min;
        let dims = [
            (extent.x / spacing).ceil() as usize + 1 + 2 * margin,
            (extent.y / spacing).ceil() as usize + 1 + 2 * margin,
            (extent.z / spacing).ceil() as usize + 1 + 2 * margin,
        ];

        let mut volume = Volume::filled(dims, 0.0, ElementType::UChar)
            .with_spacing(Vector3::repeat(spacing))
            .with_origin(origin);
        let inverse = sample.transform.inverse();
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let local = inverse * volume.index_to_physical(i, j, k);
                    if self.generator.contains(&sample.shape, local) {
                        volume.set(i, j, k, 1.0);
                    }
                }
            }
        }
        Ok(volume)
    }

    /// Write meshes as `<dir>/meshes/<name>.ply`.
    pub fn save(&self, dir: &Path) -> SsmResult<Vec<PathBuf>> {
        save_meshes(&dir.join("meshes"), &self.meshes(), &self.names(), "ply")
    }
}

/// Binary segmentations, one per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortSegmentations {
    pub names: Vec<String>,
    pub volumes: Vec<Volume>,
}

/// Intensity model for synthetic images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSynthesis {
    /// Number of box-blur passes softening the segmentation boundary.
    pub blur_factor: usize,
    pub foreground_mean: f64,
    pub foreground_var: f64,
    pub background_mean: f64,
    pub background_var: f64,
    pub seed: u64,
}

impl Default for ImageSynthesis {
    fn default() -> Self {
        Self {
            blur_factor: 1,
            foreground_mean: 180.0,
            foreground_var: 30.0,
            background_mean: 80.0,
            background_var: 30.0,
            seed: 0,
        }
    }
}

/// Standard normal draw (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

impl CohortSegmentations {
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Synthesise grey-level images from the segmentations.
    ///
    /// Each segmentation is blurred, then every voxel gets a mean and
    /// variance interpolated between background and foreground by its
    /// blurred value, plus Gaussian noise.
    pub fn images(&self, synthesis: &ImageSynthesis) -> SsmResult<CohortImages> {
        if synthesis.foreground_var < 0.0 || synthesis.background_var < 0.0 {
            return Err(SsmError::invalid_input("intensity variances must be non-negative"));
        }
        let _timer = OperationTimer::with_count("synthesise_images", self.volumes.len());

        let volumes = self
            .volumes
            .par_iter()
            .enumerate()
            .map(|(i, seg)| {
                let mut rng = StdRng::seed_from_u64(synthesis.seed.wrapping_add(i as u64));
                let mut image = seg.box_blurred(synthesis.blur_factor);
                image.element_type = ElementType::Float;
                for v in &mut image.data {
                    let w = v.clamp(0.0, 1.0);
                    let mean = synthesis.background_mean
                        + w * (synthesis.foreground_mean - synthesis.background_mean);
                    let var = synthesis.background_var
                        + w * (synthesis.foreground_var - synthesis.background_var);
                    *v = mean + var.sqrt() * standard_normal(&mut rng);
                }
                image
            })
            .collect();

        Ok(CohortImages {
            names: self.names.clone(),
            volumes,
        })
    }

    /// Write segmentations as `<dir>/segmentations/<name>.nrrd`.
    pub fn save(&self, dir: &Path) -> SsmResult<Vec<PathBuf>> {
        save_volumes(&dir.join("segmentations"), &self.volumes, &self.names, "nrrd")
    }
}

/// Synthetic grey-level images, one per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortImages {
    pub names: Vec<String>,
    pub volumes: Vec<Volume>,
}

impl CohortImages {
    /// Write images as `<dir>/images/<name>.nrrd`.
    pub fn save(&self, dir: &Path) -> SsmResult<Vec<PathBuf>> {
        save_volumes(&dir.join("images"), &self.volumes, &self.names, "nrrd")
    }
}

/// Shape family selection for configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeKind {
    Ellipsoid {
        #[serde(default = "default_min_radius")]
        min_radius: f64,
        #[serde(default = "default_max_radius")]
        max_radius: f64,
    },
    Supershape {
        #[serde(default = "default_m")]
        m: u32,
        #[serde(default = "default_size")]
        size: f64,
    },
}

fn default_min_radius() -> f64 {
    5.0
}

fn default_max_radius() -> f64 {
    25.0
}

fn default_m() -> u32 {
    3
}

fn default_size() -> f64 {
    20.0
}

/// A complete cohort description.
///
/// ```toml
/// samples = 10
/// spacing = 1.0
///
/// [shape]
/// kind = "supershape"
/// m = 4
///
/// [placement]
/// seed = 42
///
/// [synthesis]
/// blur_factor = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortConfig {
    pub shape: ShapeKind,
    pub samples: usize,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default = "default_margin")]
    pub margin: usize,
    #[serde(default)]
    pub placement: PlacementOptions,
    /// Also synthesise grey-level images when set.
    #[serde(default)]
    pub synthesis: Option<ImageSynthesis>,
}

fn default_spacing() -> f64 {
    1.0
}

fn default_margin() -> usize {
    5
}

/// Paths written by [`CohortConfig::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortFiles {
    pub meshes: Vec<PathBuf>,
    pub segmentations: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
}

impl CohortConfig {
    pub fn from_toml(toml_str: &str) -> SsmResult<Self> {
        toml::from_str(toml_str).map_err(|e| SsmError::config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> SsmResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SsmError::io_read(path, e))?;
        Self::from_toml(&contents)
    }

    /// Generate the cohort and write every stage under `dir`.
    pub fn run(&self, dir: &Path) -> SsmResult<CohortFiles> {
        self.placement.validate()?;
        match &self.shape {
            ShapeKind::Ellipsoid {
                min_radius,
                max_radius,
            } => {
                if !(is_positive_finite(*min_radius)
                    && is_positive_finite(*max_radius)
                    && min_radius <= max_radius)
                {
                    return Err(SsmError::config(format!(
                        "invalid ellipsoid radius range {}..{}",
                        min_radius, max_radius
                    )));
                }
                let generator = EllipsoidGenerator {
                    min_radius: *min_radius,
                    max_radius: *max_radius,
                    ..Default::default()
                };
                self.run_with(generator, dir)
            }
            ShapeKind::Supershape { m, size } => {
                if !is_positive_finite(*size) {
                    return Err(SsmError::config(format!(
                        "supershape size must be positive and finite, got {}",
                        size
                    )));
                }
                self.run_with(SupershapeGenerator::new(*m, *size), dir)
            }
        }
    }

    fn run_with<S: ShapeGenerator>(&self, generator: S, dir: &Path) -> SsmResult<CohortFiles> {
        let meshes = CohortGenerator::new(generator, self.placement.clone()).generate(self.samples)?;
        let segmentations = meshes.segmentations(self.spacing, self.margin)?;

        let mut files = CohortFiles {
            meshes: meshes.save(dir)?,
            segmentations: segmentations.save(dir)?,
            images: Vec::new(),
        };
        if let Some(synthesis) = &self.synthesis {
            files.images = segmentations.images(synthesis)?.save(dir)?;
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixed_placement() -> PlacementOptions {
        PlacementOptions {
            randomize_center: false,
            randomize_rotation: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_ellipsoid_mesh_volume() {
        let generator = EllipsoidGenerator {
            resolution: 96,
            ..Default::default()
        };
        let radii = Vector3::new(3.0, 4.0, 5.0);
        let mesh = generator.mesh(&radii);
        let expected = 4.0 / 3.0 * PI * 60.0;
        let volume = mesh.signed_volume();
        assert!(volume > 0.0, "winding should face outward");
        assert!((volume - expected).abs() / expected < 0.02);
    }

    #[test]
    fn test_ellipsoid_contains() {
        let generator = EllipsoidGenerator::default();
        let radii = Vector3::new(2.0, 4.0, 6.0);
        assert!(generator.contains(&radii, Point3::new(1.9, 0.0, 0.0)));
        assert!(!generator.contains(&radii, Point3::new(2.1, 0.0, 0.0)));
        assert!(generator.contains(&radii, Point3::new(0.0, 0.0, -5.9)));
    }

    #[test]
    fn test_supershape_with_exponent_two_is_sphere() {
        let generator = SupershapeGenerator::new(3, 10.0);
        let shape = Supershape { m: 3.0, n: 2.0 };
        assert!(generator.contains(&shape, Point3::new(9.9, 0.0, 0.0)));
        assert!(!generator.contains(&shape, Point3::new(0.0, 7.2, 7.2)));
        let mesh = generator.mesh(&shape);
        for v in &mesh.vertices {
            assert!((v.position.coords.norm() - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_supershape_surface_points_are_on_boundary() {
        let generator = SupershapeGenerator::new(5, 1.0);
        let shape = Supershape { m: 5.0, n: 1.3 };
        let mesh = generator.mesh(&shape);
        for v in mesh.vertices.iter().skip(2) {
            assert!(generator.contains(&shape, Point3::from(v.position.coords * 0.98)));
            assert!(!generator.contains(&shape, Point3::from(v.position.coords * 1.02)));
        }
    }

    #[test]
    fn test_generation_is_seeded() {
        let cohort = CohortGenerator::new(EllipsoidGenerator::default(), PlacementOptions::default());
        let a = cohort.generate(3).unwrap();
        let b = cohort.generate(3).unwrap();
        for (x, y) in a.samples.iter().zip(&b.samples) {
            assert_eq!(x.shape, y.shape);
            assert_eq!(x.transform, y.transform);
        }
        assert_eq!(a.names(), vec!["ellipsoid_00", "ellipsoid_01", "ellipsoid_02"]);
    }

    #[test]
    fn test_zero_samples_is_rejected() {
        let cohort = CohortGenerator::new(EllipsoidGenerator::default(), fixed_placement());
        assert!(matches!(
            cohort.generate(0).unwrap_err(),
            SsmError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_segmentation_fill_fraction() {
        let generator = EllipsoidGenerator {
            min_radius: 6.0,
            max_radius: 6.0,
            resolution: 32,
        };
        let meshes = CohortGenerator::new(generator, fixed_placement())
            .generate(1)
            .unwrap();
        let segs = meshes.segmentations(0.5, 2).unwrap();
        let seg = &segs.volumes[0];
        let filled = seg.data.iter().filter(|&&v| v == 1.0).count() as f64;
        let expected = 4.0 / 3.0 * PI * 216.0 / 0.125;
        assert!((filled - expected).abs() / expected < 0.05);
        assert_eq!(seg.get(0, 0, 0), Some(0.0));
    }

    #[test]
    fn test_images_follow_intensity_model() {
        let meshes = CohortGenerator::new(EllipsoidGenerator::default(), fixed_placement())
            .generate(1)
            .unwrap();
        let segs = meshes.segmentations(2.0, 3).unwrap();
        let synthesis = ImageSynthesis {
            blur_factor: 0,
            foreground_var: 0.0,
            background_var: 0.0,
            ..Default::default()
        };
        let images = segs.images(&synthesis).unwrap();
        let (seg, img) = (&segs.volumes[0], &images.volumes[0]);
        for (s, v) in seg.data.iter().zip(&img.data) {
            let expected = if *s == 1.0 { 180.0 } else { 80.0 };
            assert!((v - expected).abs() < 1e-9);
        }
        assert_eq!(img.element_type, ElementType::Float);
    }

    #[test]
    fn test_config_run_writes_all_stages() {
        let dir = TempDir::new().unwrap();
        let config = CohortConfig::from_toml(
            r#"
            samples = 2
            spacing = 2.0
            margin = 1

            [shape]
            kind = "supershape"
            size = 6.0

            [placement]
            seed = 7

            [synthesis]
            blur_factor = 1
            "#,
        )
        .unwrap();
        let files = config.run(dir.path()).unwrap();
        assert_eq!(files.meshes.len(), 2);
        assert_eq!(files.images.len(), 2);
        assert_eq!(
            files.segmentations[1],
            dir.path().join("segmentations/supershape_01.nrrd")
        );
        assert!(files.images.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_invalid_center_range_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = CohortConfig::from_toml(
            r#"
            samples = 1

            [shape]
            kind = "ellipsoid"

            [placement]
            randomize_center = true
            center_range = -1.0
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.run(dir.path()).unwrap_err(),
            SsmError::Config { .. }
        ));

        for range in [-1.0, f64::NAN, f64::INFINITY] {
            let placement = PlacementOptions {
                center_range: range,
                ..Default::default()
            };
            let cohort = CohortGenerator::new(EllipsoidGenerator::default(), placement);
            assert!(matches!(
                cohort.generate(1).unwrap_err(),
                SsmError::Config { .. }
            ));
        }
    }

    #[test]
    fn test_non_finite_shape_parameters_are_rejected() {
        let dir = TempDir::new().unwrap();
        let shapes = [
            ShapeKind::Supershape {
                m: 3,
                size: f64::NAN,
            },
            ShapeKind::Supershape { m: 3, size: 0.0 },
            ShapeKind::Ellipsoid {
                min_radius: 5.0,
                max_radius: f64::INFINITY,
            },
            ShapeKind::Ellipsoid {
                min_radius: f64::NAN,
                max_radius: 5.0,
            },
        ];
        for shape in shapes {
            let config = CohortConfig {
                shape,
                samples: 1,
                spacing: 1.0,
                margin: 1,
                placement: fixed_placement(),
                synthesis: None,
            };
            assert!(matches!(
                config.run(dir.path()).unwrap_err(),
                SsmError::Config { .. }
            ));
        }
    }
}
