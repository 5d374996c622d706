//! Benchmarks for the remeshing pipeline stages.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{Point2, Point3};
use requad::prelude::*;

fn grid(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);

    for j in 0..=n {
        for i in 0..=n {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }
    (vertices, faces)
}

fn bench_mesh_construction(c: &mut Criterion) {
    let (vertices, faces) = grid(50);

    c.bench_function("build_grid_50x50", |b| {
        b.iter(|| build_from_triangles(&vertices, &faces).unwrap());
    });
}

fn bench_normals(c: &mut Criterion) {
    let (vertices, faces) = grid(50);
    let mut mesh = build_from_triangles(&vertices, &faces).unwrap();

    c.bench_function("update_normals_50x50", |b| {
        b.iter(|| mesh.update_normals());
    });
}

fn bench_quad_extraction(c: &mut Criterion) {
    // A planar patch parameterized by its own coordinates: every grid line
    // becomes an iso-line.
    let (vertices, faces) = grid(30);
    let uvs: Vec<[Point2<f64>; 3]> = faces
        .iter()
        .map(|t| t.map(|v| Point2::new(vertices[v].x, vertices[v].y)))
        .collect();

    c.bench_function("extract_grid_30x30", |b| {
        b.iter(|| {
            let mut extractor = QuadExtractor::new(&vertices, &faces, &uvs);
            extractor.extract()
        });
    });
}

fn bench_relative_heights(c: &mut Criterion) {
    let (mut vertices, faces) = grid(30);
    for (i, v) in vertices.iter_mut().enumerate() {
        v.z = ((i % 7) as f64 - 3.0) * 0.05;
    }

    c.bench_function("relative_heights_30x30", |b| {
        b.iter(|| requad::height::relative_heights(&vertices, &faces));
    });
}

criterion_group!(
    benches,
    bench_mesh_construction,
    bench_normals,
    bench_quad_extraction,
    bench_relative_heights
);
criterion_main!(benches);
