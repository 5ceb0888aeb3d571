//! Benchmarks for mesh construction and Laplacian application.

use criterion::{criterion_group, criterion_main, Criterion};

use calvaria::prelude::*;
use nalgebra::Point3;

/// A cap of `rings` sensor rings on the unit sphere, plus the apex.
fn cap_positions(rings: usize, per_ring: usize) -> Vec<Point3<f64>> {
    let mut positions = vec![Point3::new(0.0, 0.0, 1.0)];
    for r in 1..=rings {
        let polar = r as f64 / rings as f64 * std::f64::consts::FRAC_PI_2;
        for k in 0..per_ring {
            let azimuth = k as f64 / per_ring as f64 * std::f64::consts::TAU + r as f64 * 0.1;
            positions.push(Point3::new(
                polar.sin() * azimuth.cos(),
                polar.sin() * azimuth.sin(),
                polar.cos(),
            ));
        }
    }
    positions
}

fn bench_construction(c: &mut Criterion) {
    let positions = cap_positions(6, 10);

    c.bench_function("build_cap_61", |b| {
        b.iter(|| {
            let cloud = SensorCloud::from_positions(&positions);
            ConvexMesh::build(cloud).unwrap()
        });
    });
}

fn bench_application(c: &mut Criterion) {
    let positions = cap_positions(6, 10);
    let cloud = SensorCloud::from_positions(&positions);
    let mesh = ConvexMesh::build(cloud).unwrap();
    let laplacian = Laplacian::fit(&mesh, LaplacianMode::Normal).unwrap();

    let frames: Vec<Vec<f64>> = (0..256)
        .map(|f| {
            (0..positions.len())
                .map(|i| ((f * 17 + i) as f64 * 0.13).sin())
                .collect()
        })
        .collect();

    c.bench_function("laplacian_fit_cap_61", |b| {
        b.iter(|| Laplacian::fit(&mesh, LaplacianMode::Normal).unwrap());
    });

    c.bench_function("apply_epoch_256_frames", |b| {
        b.iter(|| laplacian.apply_epoch(&frames).unwrap());
    });
}

criterion_group!(benches, bench_construction, bench_application);
criterion_main!(benches);
