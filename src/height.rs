//! Relative-height analysis.
//!
//! A BFS-based curvature proxy: for each vertex, nearby vertices within five
//! average edge lengths are projected onto the vertex normal, and the span of
//! those projections (signed by bulge direction) becomes the vertex's
//! relative height. Heights are normalized by the global maximum into
//! [-1, 1]. The driver uses the result to classify surface regions as flat
//! or bumpy when biasing the area budget.

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::{Point3, Vector3};

use crate::geom;
use crate::mesh::{Mesh, VertexId};

/// Coarse surface classification derived from relative heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Mostly planar; coarser quads are acceptable.
    Flat,
    /// Pronounced local relief; quads should stay denser.
    Bumpy,
}

/// Mean absolute relative height above which a surface counts as bumpy.
const BUMPY_MEAN_HEIGHT: f64 = 0.1;

/// BFS radius as a multiple of the average edge length.
const NEARBY_RADIUS_FACTOR: f64 = 5.0;

/// Per-vertex relative heights for a triangle mesh, in [-1, 1].
///
/// Pure function of the geometry; returns one scalar per input vertex
/// (zero for vertices not referenced by any triangle).
pub fn relative_heights(vertices: &[Point3<f64>], triangles: &[[usize; 3]]) -> Vec<f64> {
    let normals = vertex_normals(vertices, triangles);
    let neighbors = vertex_neighbors(vertices.len(), triangles);
    let avg_edge = average_edge_length(vertices, triangles);
    let max_squared_distance = (NEARBY_RADIUS_FACTOR * avg_edge).powi(2);

    let mut heights = vec![0.0f64; vertices.len()];
    let mut max_height = 0.0f64;

    for v in 0..vertices.len() {
        if neighbors[v].is_empty() {
            continue;
        }
        let normal = normals[v];
        if geom::is_zero(normal.norm()) {
            continue;
        }

        let mut low = 0.0f64;
        let mut high = 0.0f64;
        for nearby in collect_nearby_vertices(v, vertices, &neighbors, max_squared_distance) {
            let offset = (vertices[nearby] - vertices[v]).dot(&normal);
            low = low.min(offset);
            high = high.max(offset);
        }

        let span = high - low;
        // Neighbors mostly below the tangent plane mean the surface bulges
        // outward here; count that as positive height.
        heights[v] = if high <= low.abs() { span } else { -span };
        max_height = max_height.max(span);
    }

    if !geom::is_zero(max_height) {
        for h in &mut heights {
            *h /= max_height;
        }
    }
    heights
}

/// Compute relative heights for a mesh and record them on its vertices.
///
/// Sets `relative_height` and `relative_height_valid` on every live vertex;
/// [`classify_mesh_surface`] reads them back.
pub fn update_relative_heights(mesh: &mut Mesh) {
    let ids: Vec<VertexId> = mesh.vertex_ids().collect();
    let mut dense: HashMap<VertexId, usize> = HashMap::with_capacity(ids.len());
    let mut positions = Vec::with_capacity(ids.len());
    for (i, &v) in ids.iter().enumerate() {
        dense.insert(v, i);
        positions.push(mesh.vertex(v).position);
    }
    let triangles: Vec<[usize; 3]> = mesh
        .face_ids()
        .map(|f| mesh.face_triangle(f).map(|v| dense[&v]))
        .collect();

    let heights = relative_heights(&positions, &triangles);
    for (&v, &h) in ids.iter().zip(heights.iter()) {
        let vertex = mesh.vertex_mut(v);
        vertex.relative_height = h;
        vertex.relative_height_valid = true;
    }
}

/// Classify a mesh from the heights recorded on its vertices.
pub fn classify_mesh_surface(mesh: &Mesh) -> SurfaceKind {
    let heights: Vec<f64> = mesh
        .vertex_ids()
        .filter(|&v| mesh.vertex(v).relative_height_valid)
        .map(|v| mesh.vertex(v).relative_height)
        .collect();
    classify_surface(&heights)
}

/// Classify a surface from its relative heights.
pub fn classify_surface(heights: &[f64]) -> SurfaceKind {
    if heights.is_empty() {
        return SurfaceKind::Flat;
    }
    let mean = heights.iter().map(|h| h.abs()).sum::<f64>() / heights.len() as f64;
    if mean > BUMPY_MEAN_HEIGHT {
        SurfaceKind::Bumpy
    } else {
        SurfaceKind::Flat
    }
}

/// Area-weighted vertex normals (normalized sums of face cross products).
fn vertex_normals(vertices: &[Point3<f64>], triangles: &[[usize; 3]]) -> Vec<Vector3<f64>> {
    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for tri in triangles {
        let a = &vertices[tri[0]];
        let b = &vertices[tri[1]];
        let c = &vertices[tri[2]];
        // Unnormalized cross product weights by twice the face area.
        let n = (b - a).cross(&(c - a));
        for &v in tri {
            normals[v] += n;
        }
    }
    for n in &mut normals {
        let len = n.norm();
        if !geom::is_zero(len) {
            *n /= len;
        }
    }
    normals
}

fn vertex_neighbors(vertex_count: usize, triangles: &[[usize; 3]]) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); vertex_count];
    for tri in triangles {
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            if !neighbors[a].contains(&b) {
                neighbors[a].push(b);
            }
            if !neighbors[b].contains(&a) {
                neighbors[b].push(a);
            }
        }
    }
    neighbors
}

fn average_edge_length(vertices: &[Point3<f64>], triangles: &[[usize; 3]]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    let mut seen = HashSet::new();
    for tri in triangles {
        for i in 0..3 {
            let key = crate::islands::edge_key(tri[i], tri[(i + 1) % 3]);
            if seen.insert(key) {
                total += (vertices[key.0] - vertices[key.1]).norm();
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Vertices reachable from `start` by BFS while staying within
/// `max_squared_distance` of it. Excludes `start` itself.
fn collect_nearby_vertices(
    start: usize,
    vertices: &[Point3<f64>],
    neighbors: &[Vec<usize>],
    max_squared_distance: f64,
) -> Vec<usize> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut nearby = Vec::new();
    visited.insert(start);
    queue.push_back(start);
    while let Some(v) = queue.pop_front() {
        for &n in &neighbors[v] {
            if visited.contains(&n) {
                continue;
            }
            if (vertices[n] - vertices[start]).norm_squared() > max_squared_distance {
                continue;
            }
            visited.insert(n);
            nearby.push(n);
            queue.push_back(n);
        }
    }
    nearby
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_patch(n: usize, spacing: f64) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Point3::new(x as f64 * spacing, y as f64 * spacing, 0.0));
            }
        }
        let idx = |x: usize, y: usize| y * (n + 1) + x;
        let mut triangles = Vec::new();
        for y in 0..n {
            for x in 0..n {
                triangles.push([idx(x, y), idx(x + 1, y), idx(x + 1, y + 1)]);
                triangles.push([idx(x, y), idx(x + 1, y + 1), idx(x, y + 1)]);
            }
        }
        (vertices, triangles)
    }

    #[test]
    fn test_planar_patch_heights_zero() {
        let (vertices, triangles) = grid_patch(4, 1.0);
        let heights = relative_heights(&vertices, &triangles);
        for h in heights {
            assert!(h.abs() < 1e-9, "planar patch height should be ~0, got {}", h);
        }
    }

    #[test]
    fn test_bump_is_positive_at_apex() {
        let (mut vertices, triangles) = grid_patch(4, 1.0);
        // Raise the center vertex of the 5x5 grid.
        let center = 2 * 5 + 2;
        vertices[center].z = 1.0;
        let heights = relative_heights(&vertices, &triangles);
        // The apex bulges outward relative to its neighborhood.
        assert!(heights[center] > 0.0);
        // Normalization bound.
        for h in &heights {
            assert!(h.abs() <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_classify_surfaces() {
        let (vertices, triangles) = grid_patch(4, 1.0);
        let heights = relative_heights(&vertices, &triangles);
        assert_eq!(classify_surface(&heights), SurfaceKind::Flat);

        let bumpy: Vec<f64> = (0..25).map(|i| if i % 2 == 0 { 0.5 } else { -0.4 }).collect();
        assert_eq!(classify_surface(&bumpy), SurfaceKind::Bumpy);
    }

    #[test]
    fn test_mesh_heights_recorded_on_vertices() {
        let (mut vertices, triangles) = grid_patch(4, 1.0);
        vertices[2 * 5 + 2].z = 1.0;
        let expected = relative_heights(&vertices, &triangles);

        let mut mesh = crate::mesh::build_from_triangles(&vertices, &triangles).unwrap();
        update_relative_heights(&mut mesh);
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            let vertex = mesh.vertex(v);
            assert!(vertex.relative_height_valid);
            assert!((vertex.relative_height - expected[v.index()]).abs() < 1e-12);
        }
        assert_eq!(classify_mesh_surface(&mesh), classify_surface(&expected));
    }
}
