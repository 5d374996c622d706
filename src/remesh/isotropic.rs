//! Built-in isotropic remesher.
//!
//! Iteratively applies the classic four-step schedule (Botsch & Kobbelt,
//! 2004) to a face-vertex triangle list:
//!
//! 1. split edges longer than 4/3 of the target length,
//! 2. collapse edges shorter than 4/5 of the target length,
//! 3. flip edges toward ideal vertex valence,
//! 4. tangentially smooth vertex positions.
//!
//! Boundary edges and edges whose dihedral angle exceeds the sharp-edge
//! threshold are treated as features: they are never collapsed or flipped,
//! and their vertices are never smoothed. Constrained vertices keep their
//! exact input positions.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::geom;
use crate::islands::{self, edge_key};

use super::IsotropicRemesher;

const MAX_SPLIT_ROUNDS: usize = 10;
const MAX_COLLAPSE_ROUNDS: usize = 10;
const MAX_FLIP_ROUNDS: usize = 10;

/// Default implementation of the [`IsotropicRemesher`] collaborator.
#[derive(Debug, Clone)]
pub struct DefaultIsotropicRemesher {
    iterations: usize,
    smoothing_iterations: usize,
    smoothing_lambda: f64,
}

impl Default for DefaultIsotropicRemesher {
    fn default() -> Self {
        Self {
            iterations: 5,
            smoothing_iterations: 3,
            smoothing_lambda: 0.5,
        }
    }
}

impl DefaultIsotropicRemesher {
    /// Set the number of remeshing iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the number of smoothing passes per iteration.
    pub fn with_smoothing_iterations(mut self, iterations: usize) -> Self {
        self.smoothing_iterations = iterations;
        self
    }

    /// Set the tangential relaxation factor.
    pub fn with_smoothing_lambda(mut self, lambda: f64) -> Self {
        self.smoothing_lambda = lambda;
        self
    }
}

impl IsotropicRemesher for DefaultIsotropicRemesher {
    fn remesh(
        &self,
        vertices: &[Point3<f64>],
        triangles: &[[usize; 3]],
        target_edge_length: f64,
        sharp_edge_degrees: f64,
        constrained_vertices: Option<&HashSet<usize>>,
    ) -> Option<(Vec<Point3<f64>>, Vec<[usize; 3]>)> {
        if triangles.is_empty() || target_edge_length <= 0.0 {
            return None;
        }
        let high = target_edge_length * 4.0 / 3.0;
        let low = target_edge_length * 4.0 / 5.0;
        let sharp_cos = sharp_edge_degrees.to_radians().cos();
        let locked = constrained_vertices.cloned().unwrap_or_default();

        let mut vertices = vertices.to_vec();
        let mut faces = triangles.to_vec();

        for iteration in 0..self.iterations {
            split_long_edges(&mut vertices, &mut faces, high);
            collapse_short_edges(&mut vertices, &mut faces, low, high, sharp_cos, &locked);
            flip_edges_for_valence(&vertices, &mut faces, sharp_cos);
            for _ in 0..self.smoothing_iterations {
                tangential_smooth(
                    &mut vertices,
                    &faces,
                    self.smoothing_lambda,
                    sharp_cos,
                    &locked,
                );
            }
            debug!(
                iteration,
                vertices = vertices.len(),
                faces = faces.len(),
                "isotropic iteration finished"
            );
        }

        if faces.is_empty() {
            return None;
        }
        Some(compact(&vertices, &faces))
    }
}

/// Cached connectivity for one round of local operations.
struct Topology {
    edge_faces: HashMap<(usize, usize), Vec<usize>>,
    feature_edges: HashSet<(usize, usize)>,
    feature_vertices: HashSet<usize>,
    neighbors: Vec<HashSet<usize>>,
}

impl Topology {
    fn build(vertices: &[Point3<f64>], faces: &[[usize; 3]], sharp_cos: f64) -> Self {
        let edge_faces = islands::build_edge_to_face_map(faces);
        let face_normals: Vec<Vector3<f64>> = faces
            .iter()
            .map(|f| geom::triangle_normal(&vertices[f[0]], &vertices[f[1]], &vertices[f[2]]))
            .collect();

        // Boundary, non-manifold and sharp-dihedral edges all count as
        // features.
        let mut feature_edges = HashSet::new();
        for (&edge, incident) in &edge_faces {
            let feature = match incident.as_slice() {
                [f0, f1] => face_normals[*f0].dot(&face_normals[*f1]) < sharp_cos,
                _ => true,
            };
            if feature {
                feature_edges.insert(edge);
            }
        }

        let mut neighbors: Vec<HashSet<usize>> = vec![HashSet::new(); vertices.len()];
        for face in faces {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                neighbors[a].insert(b);
                neighbors[b].insert(a);
            }
        }

        let mut feature_vertices = HashSet::new();
        for &(a, b) in &feature_edges {
            feature_vertices.insert(a);
            feature_vertices.insert(b);
        }

        Self {
            edge_faces,
            feature_edges,
            feature_vertices,
            neighbors,
        }
    }

    fn is_fixed(&self, v: usize, locked: &HashSet<usize>) -> bool {
        locked.contains(&v) || self.feature_vertices.contains(&v)
    }
}

/// Split every edge longer than `high`, repeating until none remain.
///
/// Midpoints are shared through an edge-keyed map, so adjacent faces agree
/// on the subdivision and no T-vertices appear.
fn split_long_edges(vertices: &mut Vec<Point3<f64>>, faces: &mut Vec<[usize; 3]>, high: f64) {
    let high_sq = high * high;
    for _ in 0..MAX_SPLIT_ROUNDS {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        for face in faces.iter() {
            for i in 0..3 {
                let key = edge_key(face[i], face[(i + 1) % 3]);
                if midpoints.contains_key(&key) {
                    continue;
                }
                if (vertices[key.0] - vertices[key.1]).norm_squared() > high_sq {
                    let mid = Point3::from((vertices[key.0].coords + vertices[key.1].coords) * 0.5);
                    midpoints.insert(key, vertices.len());
                    vertices.push(mid);
                }
            }
        }
        if midpoints.is_empty() {
            break;
        }
        let mut subdivided = Vec::with_capacity(faces.len() * 2);
        for &face in faces.iter() {
            subdivide_face(face, &midpoints, &mut subdivided);
        }
        *faces = subdivided;
    }
}

/// Replace one face by its subdivision against the shared midpoint map.
fn subdivide_face(
    face: [usize; 3],
    midpoints: &HashMap<(usize, usize), usize>,
    out: &mut Vec<[usize; 3]>,
) {
    let [a, b, c] = face;
    let mid = |x: usize, y: usize| midpoints.get(&edge_key(x, y)).copied();
    match (mid(a, b), mid(b, c), mid(c, a)) {
        (None, None, None) => out.push(face),
        (Some(m), None, None) => {
            out.push([a, m, c]);
            out.push([m, b, c]);
        }
        (None, Some(m), None) => {
            out.push([a, b, m]);
            out.push([a, m, c]);
        }
        (None, None, Some(m)) => {
            out.push([a, b, m]);
            out.push([m, b, c]);
        }
        (Some(m0), Some(m1), None) => {
            out.push([a, m0, c]);
            out.push([m0, b, m1]);
            out.push([m0, m1, c]);
        }
        (None, Some(m1), Some(m2)) => {
            out.push([a, b, m1]);
            out.push([a, m1, m2]);
            out.push([m1, c, m2]);
        }
        (Some(m0), None, Some(m2)) => {
            out.push([m2, a, m0]);
            out.push([m0, b, c]);
            out.push([m0, c, m2]);
        }
        (Some(m0), Some(m1), Some(m2)) => {
            out.push([a, m0, m2]);
            out.push([m0, b, m1]);
            out.push([m2, m1, c]);
            out.push([m0, m1, m2]);
        }
    }
}

/// Collapse edges shorter than `low` in shortest-first batches of
/// vertex-disjoint candidates.
fn collapse_short_edges(
    vertices: &mut [Point3<f64>],
    faces: &mut Vec<[usize; 3]>,
    low: f64,
    high: f64,
    sharp_cos: f64,
    locked: &HashSet<usize>,
) {
    for _ in 0..MAX_COLLAPSE_ROUNDS {
        let topology = Topology::build(vertices, faces, sharp_cos);
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for &(a, b) in topology.edge_faces.keys() {
            let length = (vertices[a] - vertices[b]).norm();
            if length >= low {
                continue;
            }
            if can_collapse(vertices, &topology, a, b, high, locked) {
                candidates.push((length, a, b));
            }
        }
        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(Ordering::Equal));

        let mut used: HashSet<usize> = HashSet::new();
        let mut collapsed = false;
        for (_, a, b) in candidates {
            if used.contains(&a) || used.contains(&b) {
                continue;
            }
            used.insert(a);
            used.insert(b);
            // A fixed endpoint survives the merge and keeps its position.
            let (from, to) = if topology.is_fixed(a, locked) {
                (b, a)
            } else {
                (a, b)
            };
            if !topology.is_fixed(to, locked) {
                vertices[to] = Point3::from((vertices[from].coords + vertices[to].coords) * 0.5);
            }
            for face in faces.iter_mut() {
                for v in face.iter_mut() {
                    if *v == from {
                        *v = to;
                    }
                }
            }
            collapsed = true;
        }
        faces.retain(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
        if !collapsed {
            break;
        }
    }
}

fn can_collapse(
    vertices: &[Point3<f64>],
    topology: &Topology,
    a: usize,
    b: usize,
    high: f64,
    locked: &HashSet<usize>,
) -> bool {
    if topology.feature_edges.contains(&edge_key(a, b)) {
        return false;
    }
    let a_fixed = topology.is_fixed(a, locked);
    let b_fixed = topology.is_fixed(b, locked);
    if a_fixed && b_fixed {
        return false;
    }
    // Link condition: an interior edge has exactly two common neighbors.
    let common = topology.neighbors[a].intersection(&topology.neighbors[b]).count();
    if common != 2 {
        return false;
    }
    let target = if a_fixed {
        vertices[a]
    } else if b_fixed {
        vertices[b]
    } else {
        Point3::from((vertices[a].coords + vertices[b].coords) * 0.5)
    };
    for &n in topology.neighbors[a].iter().chain(topology.neighbors[b].iter()) {
        if n == a || n == b {
            continue;
        }
        if (vertices[n] - target).norm() > high {
            return false;
        }
    }
    true
}

/// Flip interior edges when the flip reduces total valence deviation from
/// the ideal (6 interior, 4 on features).
fn flip_edges_for_valence(vertices: &[Point3<f64>], faces: &mut [[usize; 3]], sharp_cos: f64) {
    for _ in 0..MAX_FLIP_ROUNDS {
        let topology = Topology::build(vertices, faces, sharp_cos);
        let mut touched: HashSet<usize> = HashSet::new();
        let mut flips: Vec<(usize, usize, usize, usize, usize, usize)> = Vec::new();

        for (&(a, b), incident) in &topology.edge_faces {
            let [f0, f1] = match incident.as_slice() {
                [f0, f1] => [*f0, *f1],
                _ => continue,
            };
            if topology.feature_edges.contains(&(a, b)) {
                continue;
            }
            let (Some(c), Some(d)) = (third_vertex(&faces[f0], a, b), third_vertex(&faces[f1], a, b))
            else {
                continue;
            };
            // The flipped edge may already exist elsewhere.
            if topology.neighbors[c].contains(&d) {
                continue;
            }
            if [a, b, c, d].iter().any(|v| touched.contains(v)) {
                continue;
            }
            if !flip_improves_valence(&topology, a, b, c, d) {
                continue;
            }
            if !flip_keeps_orientation(vertices, &faces[f0], &faces[f1], a, b, c, d) {
                continue;
            }
            flips.push((f0, f1, a, b, c, d));
            touched.extend([a, b, c, d]);
        }
        if flips.is_empty() {
            break;
        }
        for (f0, f1, a, b, c, d) in flips {
            apply_flip(faces, f0, f1, a, b, c, d);
        }
    }
}

fn third_vertex(face: &[usize; 3], a: usize, b: usize) -> Option<usize> {
    face.iter().copied().find(|&v| v != a && v != b)
}

fn has_directed_edge(face: &[usize; 3], from: usize, to: usize) -> bool {
    (0..3).any(|i| face[i] == from && face[(i + 1) % 3] == to)
}

fn ideal_valence(topology: &Topology, v: usize) -> i32 {
    if topology.feature_vertices.contains(&v) {
        4
    } else {
        6
    }
}

fn flip_improves_valence(topology: &Topology, a: usize, b: usize, c: usize, d: usize) -> bool {
    let deviation = |v: usize, delta: i32| {
        (topology.neighbors[v].len() as i32 + delta - ideal_valence(topology, v)).abs()
    };
    let before = deviation(a, 0) + deviation(b, 0) + deviation(c, 0) + deviation(d, 0);
    let after = deviation(a, -1) + deviation(b, -1) + deviation(c, 1) + deviation(d, 1);
    after < before
}

/// Reject flips that would fold a triangle over (either new normal opposing
/// the combined normal of the two old faces).
fn flip_keeps_orientation(
    vertices: &[Point3<f64>],
    f0: &[usize; 3],
    f1: &[usize; 3],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
) -> bool {
    let old_normal = geom::triangle_normal(&vertices[f0[0]], &vertices[f0[1]], &vertices[f0[2]])
        + geom::triangle_normal(&vertices[f1[0]], &vertices[f1[1]], &vertices[f1[2]]);
    let (a, b) = if has_directed_edge(f0, a, b) {
        (a, b)
    } else {
        (b, a)
    };
    let n0 = geom::triangle_normal(&vertices[c], &vertices[a], &vertices[d]);
    let n1 = geom::triangle_normal(&vertices[d], &vertices[b], &vertices[c]);
    n0.dot(&old_normal) > 0.0 && n1.dot(&old_normal) > 0.0
}

fn apply_flip(faces: &mut [[usize; 3]], f0: usize, f1: usize, a: usize, b: usize, c: usize, d: usize) {
    let (a, b) = if has_directed_edge(&faces[f0], a, b) {
        (a, b)
    } else {
        (b, a)
    };
    faces[f0] = [c, a, d];
    faces[f1] = [d, b, c];
}

/// Move each free vertex toward its neighborhood centroid, restricted to
/// the tangent plane of its normal.
fn tangential_smooth(
    vertices: &mut [Point3<f64>],
    faces: &[[usize; 3]],
    lambda: f64,
    sharp_cos: f64,
    locked: &HashSet<usize>,
) {
    let topology = Topology::build(vertices, faces, sharp_cos);

    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for face in faces {
        let n = (vertices[face[1]] - vertices[face[0]])
            .cross(&(vertices[face[2]] - vertices[face[0]]));
        for &v in face {
            normals[v] += n;
        }
    }
    for n in &mut normals {
        let len = n.norm();
        if !geom::is_zero(len) {
            *n /= len;
        }
    }

    let updated: Vec<Point3<f64>> = (0..vertices.len())
        .map(|v| {
            let position = vertices[v];
            if topology.is_fixed(v, locked) || topology.neighbors[v].is_empty() {
                return position;
            }
            let mut centroid = Vector3::zeros();
            for &n in &topology.neighbors[v] {
                centroid += vertices[n].coords;
            }
            centroid /= topology.neighbors[v].len() as f64;
            let displacement = centroid - position.coords;
            let tangential = displacement - normals[v].dot(&displacement) * normals[v];
            position + lambda * tangential
        })
        .collect();
    vertices.copy_from_slice(&updated);
}

/// Drop unreferenced vertices and reindex the faces.
fn compact(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut old_to_new: HashMap<usize, usize> = HashMap::new();
    let mut compact_vertices = Vec::new();
    let compact_faces = faces
        .iter()
        .map(|face| {
            face.map(|v| {
                *old_to_new.entry(v).or_insert_with(|| {
                    compact_vertices.push(vertices[v]);
                    compact_vertices.len() - 1
                })
            })
        })
        .collect();
    (compact_vertices, compact_faces)
}
