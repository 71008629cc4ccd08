//! Benchmarks for reference selection and surface distances.
//!
//! Run with: cargo bench -p ssm-core
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p ssm-core -- --save-baseline main
//! 2. After changes: cargo bench -p ssm-core -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ssm_core::{
    CohortGenerator, EllipsoidGenerator, Mesh, PlacementOptions, VoxelArray,
    compute_line_indices, find_reference_image_index, find_reference_mesh_index,
    surface_distance,
};

fn ellipsoid_meshes(count: usize, resolution: usize) -> Vec<Mesh> {
    let generator = EllipsoidGenerator {
        resolution,
        ..Default::default()
    };
    CohortGenerator::new(generator, PlacementOptions::default())
        .generate(count)
        .map(|cohort| cohort.meshes())
        .unwrap_or_default()
}

fn ramp_arrays(count: usize, extent: usize) -> Vec<VoxelArray> {
    (0..count)
        .filter_map(|i| {
            let shape = [extent + i % 3, extent, extent + i % 2];
            let n: usize = shape.iter().product();
            let values = (0..n).map(|v| ((v + i) % 7) as f64).collect();
            VoxelArray::new(shape.to_vec(), values).ok()
        })
        .collect()
}

fn bench_reference_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_image");
    for extent in [16, 32, 48] {
        let arrays = ramp_arrays(8, extent);
        group.throughput(Throughput::Elements((extent * extent * extent * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(extent), &arrays, |b, arrays| {
            b.iter(|| find_reference_image_index(black_box(arrays)))
        });
    }
    group.finish();
}

fn bench_reference_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_mesh");
    group.sample_size(20);
    for count in [4, 8, 12] {
        let meshes = ellipsoid_meshes(count, 24);
        group.bench_with_input(BenchmarkId::from_parameter(count), &meshes, |b, meshes| {
            b.iter(|| find_reference_mesh_index(black_box(meshes)))
        });
    }
    group.finish();
}

fn bench_surface_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface_distance");
    for resolution in [16, 32, 64] {
        let meshes = ellipsoid_meshes(2, resolution);
        if meshes.len() < 2 {
            continue;
        }
        group.throughput(Throughput::Elements(meshes[1].vertex_count() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(resolution),
            &meshes,
            |b, meshes| b.iter(|| surface_distance(black_box(&meshes[0]), black_box(&meshes[1]))),
        );
    }
    group.finish();
}

fn bench_line_indices(c: &mut Criterion) {
    c.bench_function("line_indices_10k_closed", |b| {
        b.iter(|| compute_line_indices(black_box(10_000), true))
    });
}

criterion_group!(
    benches,
    bench_reference_image,
    bench_reference_mesh,
    bench_surface_distance,
    bench_line_indices
);
criterion_main!(benches);
