//! Mesh construction and export.
//!
//! This module builds half-edge meshes from face-vertex triangle lists and
//! exports them back, assigning output indices to surviving vertices.
//!
//! Non-manifold input is accepted: a directed edge seen twice bumps the
//! mesh's repeated-half-edge counter and the extra occurrence is left without
//! an opposite. Half-edges whose reverse never appears bump the alone counter.
//! Callers inspect the counters to decide whether to proceed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::Mesh;
use super::index::{HalfEdgeId, VertexId};
use crate::error::{RemeshError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Example
/// ```
/// use requad::mesh::build_from_triangles;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<Mesh> {
    if vertices.is_empty() || faces.is_empty() {
        return Err(RemeshError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= vertices.len() {
                return Err(RemeshError::InvalidVertexIndex {
                    face: fi,
                    vertex: vi,
                });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(RemeshError::DegenerateFace { face: fi });
        }
    }

    let mut mesh = Mesh::new();

    let vertex_ids: Vec<VertexId> = vertices
        .iter()
        .enumerate()
        .map(|(i, &pos)| mesh.alloc_vertex(pos, i))
        .collect();

    // Directed edge (v0, v1) -> half-edge; first occurrence wins, later
    // occurrences are the repeated-half-edge diagnostic.
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::new();
    let mut repeated = 0usize;

    for face in faces {
        let ids = [
            mesh.alloc_halfedge(),
            mesh.alloc_halfedge(),
            mesh.alloc_halfedge(),
        ];
        let face_id = mesh.alloc_face(ids[0]);

        for corner in 0..3 {
            let h = ids[corner];
            let start = vertex_ids[face[corner]];
            {
                let he = mesh.halfedge_mut(h);
                he.start_vertex = start;
                he.next = ids[(corner + 1) % 3];
                he.prev = ids[(corner + 2) % 3];
                he.left_face = face_id;
            }
            {
                let vertex = mesh.vertex_mut(start);
                if !vertex.halfedge.is_valid() {
                    vertex.halfedge = h;
                }
                vertex.halfedge_count += 1;
            }

            let directed = (face[corner], face[(corner + 1) % 3]);
            match edge_map.entry(directed) {
                Entry::Occupied(_) => repeated += 1,
                Entry::Vacant(slot) => {
                    slot.insert(h);
                }
            }
        }
    }

    // Resolve opposites against the reverse directed edge.
    for (&(a, b), &h) in &edge_map {
        if let Some(&o) = edge_map.get(&(b, a)) {
            mesh.halfedge_mut(h).opposite = o;
        }
    }

    let alone = mesh
        .halfedge_ids()
        .filter(|&h| !mesh.halfedge(h).opposite.is_valid())
        .count();
    mesh.repeated_half_edges = repeated;
    mesh.alone_half_edges = alone;

    Ok(mesh)
}

/// Export a mesh back to a face-vertex triangle list.
///
/// Assigns each surviving vertex a dense output index (recorded on the
/// vertex) and returns positions plus triangles over those indices.
pub fn to_face_vertex(mesh: &mut Mesh) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut positions = Vec::with_capacity(mesh.num_vertices());
    for v in mesh.vertex_ids().collect::<Vec<_>>() {
        let output_index = positions.len();
        let vertex = mesh.vertex_mut(v);
        vertex.output_index = output_index;
        positions.push(vertex.position);
    }

    let mut triangles = Vec::with_capacity(mesh.num_faces());
    for f in mesh.face_ids().collect::<Vec<_>>() {
        let [v0, v1, v2] = mesh.face_triangle(f);
        triangles.push([
            mesh.vertex(v0).output_index,
            mesh.vertex(v1).output_index,
            mesh.vertex(v2).output_index,
        ]);
    }

    (positions, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        (
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_single_triangle() {
        let (vertices, faces) = single_triangle();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.num_halfedges(), 3);
        assert_eq!(mesh.alone_half_edges(), 3);
        assert_eq!(mesh.repeated_half_edges(), 0);
        assert!(mesh.is_valid());
        assert!(!mesh.is_watertight());
    }

    #[test]
    fn test_two_triangles_share_edge() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_halfedges(), 6);
        // One shared edge resolved, four boundary edges.
        assert_eq!(mesh.alone_half_edges(), 4);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_empty_mesh_error() {
        let result = build_from_triangles(&[], &[]);
        assert!(matches!(result, Err(RemeshError::EmptyMesh)));
    }

    #[test]
    fn test_invalid_index_error() {
        let (vertices, _) = single_triangle();
        let result = build_from_triangles(&vertices, &[[0, 1, 7]]);
        assert!(matches!(
            result,
            Err(RemeshError::InvalidVertexIndex { face: 0, vertex: 7 })
        ));
    }

    #[test]
    fn test_degenerate_face_error() {
        let (vertices, _) = single_triangle();
        let result = build_from_triangles(&vertices, &[[0, 1, 1]]);
        assert!(matches!(
            result,
            Err(RemeshError::DegenerateFace { face: 0 })
        ));
    }

    #[test]
    fn test_repeated_edge_counted_not_fatal() {
        // Three triangles sharing the directed edge (0, 1) via inconsistent
        // winding: (0,1,2) and (0,1,3) both emit the directed edge 0->1.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 1, 3]];
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.repeated_half_edges(), 1);
        assert!(!mesh.is_watertight());
    }

    #[test]
    fn test_to_face_vertex_round_trip() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        let mut mesh = build_from_triangles(&vertices, &faces).unwrap();
        let (out_vertices, out_faces) = to_face_vertex(&mut mesh);
        assert_eq!(out_vertices.len(), 4);
        assert_eq!(out_faces.len(), 4);
        for face in &out_faces {
            for &v in face {
                assert!(v < out_vertices.len());
            }
        }
    }

    #[test]
    fn test_export_skips_freed_vertices() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(5.0, 5.0, 5.0),
        ];
        // Vertex 3 is never referenced.
        let faces = vec![[0, 1, 2]];
        let mut mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.prune_isolated_vertices(), 1);
        let (out_vertices, out_faces) = to_face_vertex(&mut mesh);
        assert_eq!(out_vertices.len(), 3);
        assert_eq!(out_faces, vec![[0, 1, 2]]);
    }
}
