//! Quad extraction from a UV-annotated triangle mesh.
//!
//! Consumes a triangle mesh plus one 2D parameterization coordinate per
//! triangle corner (from an external cross-field integration) and
//! reconstructs a quad-dominant polygon mesh:
//!
//! 1. trace integer iso-line crossings into a cross-point graph
//!    ([`connections`]),
//! 2. simplify the graph to a fixed point ([`graph`]),
//! 3. walk 4-cycles into quads, oriented against the source triangles,
//! 4. repair the result: flipped faces, isolated and non-manifold faces,
//!    and boundary holes ([`holes`]).
//!
//! The extractor never panics on degenerate input; [`QuadExtractor::extract`]
//! reports failure by returning false.

mod connections;
mod graph;
mod holes;

use std::collections::{BTreeSet, HashMap, HashSet};

use nalgebra::{Point2, Point3, Vector3};
use tracing::debug;

use crate::geom;
use graph::CrossGraph;

/// Extracts a quad-dominant mesh from triangles and per-corner UVs.
///
/// # Example
///
/// ```no_run
/// use requad::extract::QuadExtractor;
/// # let (vertices, triangles, uvs) = (vec![], vec![], vec![]);
///
/// let mut extractor = QuadExtractor::new(&vertices, &triangles, &uvs);
/// if extractor.extract() {
///     let quads = extractor.remeshed_polygons();
///     let points = extractor.remeshed_vertices();
/// }
/// ```
pub struct QuadExtractor<'a> {
    vertices: &'a [Point3<f64>],
    triangles: &'a [[usize; 3]],
    triangle_uvs: &'a [[Point2<f64>; 3]],

    remeshed_vertices: Vec<Point3<f64>>,
    remeshed_polygons: Vec<Vec<usize>>,
    good_half_edges: HashSet<(usize, usize)>,
}

impl<'a> QuadExtractor<'a> {
    /// Create an extractor over borrowed mesh data.
    ///
    /// `triangle_uvs` must be parallel to `triangles`: one UV per corner.
    pub fn new(
        vertices: &'a [Point3<f64>],
        triangles: &'a [[usize; 3]],
        triangle_uvs: &'a [[Point2<f64>; 3]],
    ) -> Self {
        Self {
            vertices,
            triangles,
            triangle_uvs,
            remeshed_vertices: Vec::new(),
            remeshed_polygons: Vec::new(),
            good_half_edges: HashSet::new(),
        }
    }

    /// Extracted vertex positions.
    pub fn remeshed_vertices(&self) -> &[Point3<f64>] {
        &self.remeshed_vertices
    }

    /// Extracted polygons (predominantly quads) over the extracted vertices.
    pub fn remeshed_polygons(&self) -> &[Vec<usize>] {
        &self.remeshed_polygons
    }

    /// Run the full extraction pipeline.
    ///
    /// Returns false when the simplified graph is too degenerate to produce
    /// any polygon; the caller should treat the island as failed.
    pub fn extract(&mut self) -> bool {
        if self.triangles.is_empty() || self.triangles.len() != self.triangle_uvs.len() {
            return false;
        }

        debug!(triangles = self.triangles.len(), "extracting connections");
        let mut extracted =
            connections::extract_connections(self.vertices, self.triangles, self.triangle_uvs);

        debug!(
            cross_points = extracted.cross_points.len(),
            connections = extracted.connections.len(),
            "simplifying cross-point graph"
        );
        let mut graph = CrossGraph::from_connections(&extracted.connections);
        graph.dissolve_chains();
        graph.simplify(&mut extracted.cross_points);

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "extracting mesh"
        );
        let polygons = self.extract_mesh(
            &extracted.cross_points,
            &extracted.source_triangles,
            &graph,
        );

        // Compact the used cross points into the output vertex list.
        let mut old_to_new: HashMap<usize, usize> = HashMap::new();
        self.remeshed_vertices.clear();
        self.remeshed_polygons.clear();
        for polygon in polygons {
            let mapped = polygon
                .into_iter()
                .map(|v| {
                    *old_to_new.entry(v).or_insert_with(|| {
                        self.remeshed_vertices.push(extracted.cross_points[v]);
                        self.remeshed_vertices.len() - 1
                    })
                })
                .collect();
            self.remeshed_polygons.push(mapped);
        }

        self.fix_flipped_faces();
        self.remove_isolated_faces();
        while self.remove_non_manifold_faces() {
            self.remove_isolated_faces();
        }
        self.record_good_quads();
        self.fix_holes();

        debug!(
            polygons = self.remeshed_polygons.len(),
            vertices = self.remeshed_vertices.len(),
            "extraction finished"
        );
        !self.remeshed_polygons.is_empty()
    }

    /// Walk 4-cycles of the simplified graph into quads.
    ///
    /// Each cycle is accepted once, guarded by corner and half-edge conflict
    /// sets, and wound to agree with the normal of the triangle its first
    /// cross point came from.
    fn extract_mesh(
        &self,
        points: &[Point3<f64>],
        point_source_triangles: &[usize],
        graph: &CrossGraph,
    ) -> Vec<Vec<usize>> {
        let mut quads: Vec<Vec<usize>> = Vec::new();
        let mut corners: BTreeSet<(usize, usize, usize)> = BTreeSet::new();
        let mut half_edges: BTreeSet<(usize, usize)> = BTreeSet::new();

        let calculate_face_normal = |cycle: &[usize; 4]| -> Vector3<f64> {
            let mut sum = Vector3::zeros();
            for i in 0..4 {
                sum += geom::triangle_normal(
                    &points[cycle[i]],
                    &points[cycle[(i + 1) % 4]],
                    &points[cycle[(i + 2) % 4]],
                );
            }
            let len = sum.norm();
            if geom::is_zero(len) {
                sum
            } else {
                sum / len
            }
        };
        let corner_used = |corners: &BTreeSet<(usize, usize, usize)>,
                           previous: usize,
                           current: usize,
                           next: usize| {
            corners.contains(&(previous, current, next)) || corners.contains(&(next, current, previous))
        };
        let quad_corner_conflicts =
            |corners: &BTreeSet<(usize, usize, usize)>, q: &[usize; 4]| {
                corner_used(corners, q[0], q[1], q[2])
                    || corner_used(corners, q[1], q[2], q[3])
                    || corner_used(corners, q[3], q[0], q[1])
            };
        let quad_half_edge_conflicts = |half_edges: &BTreeSet<(usize, usize)>, q: &[usize; 4]| {
            half_edges.contains(&(q[0], q[1]))
                || half_edges.contains(&(q[1], q[2]))
                || half_edges.contains(&(q[2], q[3]))
                || half_edges.contains(&(q[3], q[0]))
        };
        let mut accept = |q: [usize; 4],
                          corners: &mut BTreeSet<(usize, usize, usize)>,
                          half_edges: &mut BTreeSet<(usize, usize)>| {
            for i in 0..4 {
                let previous = q[(i + 3) % 4];
                let current = q[i];
                let next = q[(i + 1) % 4];
                corners.insert((previous, current, next));
                corners.insert((next, current, previous));
                half_edges.insert((current, next));
            }
            quads.push(q.to_vec());
        };

        for (&level0, neighbors0) in &graph.adjacency {
            let source = &self.triangles[point_source_triangles[level0]];
            let triangle_normal = geom::triangle_normal(
                &self.vertices[source[0]],
                &self.vertices[source[1]],
                &self.vertices[source[2]],
            );
            for &level1 in neighbors0 {
                let Some(neighbors1) = graph.adjacency.get(&level1) else {
                    continue;
                };
                for &level2 in neighbors1 {
                    if level2 == level0 {
                        continue;
                    }
                    let Some(neighbors2) = graph.adjacency.get(&level2) else {
                        continue;
                    };
                    for &level3 in neighbors2 {
                        if level3 == level1 {
                            continue;
                        }
                        let Some(neighbors3) = graph.adjacency.get(&level3) else {
                            continue;
                        };
                        if !neighbors3.contains(&level0) {
                            continue;
                        }
                        let forward = [level0, level1, level2, level3];
                        if quad_corner_conflicts(&corners, &forward) {
                            continue;
                        }
                        let face_normal = calculate_face_normal(&forward);
                        if face_normal.dot(&triangle_normal) > 0.0 {
                            if !quad_half_edge_conflicts(&half_edges, &forward) {
                                accept(forward, &mut corners, &mut half_edges);
                            }
                        } else {
                            let reversed = [level3, level2, level1, level0];
                            if !quad_half_edge_conflicts(&half_edges, &reversed) {
                                accept(reversed, &mut corners, &mut half_edges);
                            }
                        }
                    }
                }
            }
        }
        quads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangulated axis-aligned cube spanning [0, size]^3, with per-face
    /// dominant-axis UVs scaled so iso-lines land on integer coordinates.
    pub(super) fn cube_with_uvs(
        size: f64,
    ) -> (Vec<Point3<f64>>, Vec<[usize; 3]>, Vec<[Point2<f64>; 3]>) {
        let s = size;
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(s, 0.0, 0.0),
            Point3::new(s, s, 0.0),
            Point3::new(0.0, s, 0.0),
            Point3::new(0.0, 0.0, s),
            Point3::new(s, 0.0, s),
            Point3::new(s, s, s),
            Point3::new(0.0, s, s),
        ];
        // Outward-facing winding per face.
        let quads: [([usize; 4], [usize; 2]); 6] = [
            ([3, 2, 1, 0], [0, 1]), // bottom (z=0), uv = (x, y)
            ([4, 5, 6, 7], [0, 1]), // top (z=s)
            ([0, 1, 5, 4], [0, 2]), // front (y=0), uv = (x, z)
            ([2, 3, 7, 6], [0, 2]), // back (y=s)
            ([3, 0, 4, 7], [1, 2]), // left (x=0), uv = (y, z)
            ([1, 2, 6, 5], [1, 2]), // right (x=s)
        ];
        let mut triangles = Vec::new();
        let mut uvs = Vec::new();
        for (quad, axes) in quads {
            for tri in [[quad[0], quad[1], quad[2]], [quad[0], quad[2], quad[3]]] {
                triangles.push(tri);
                let uv = tri.map(|v| {
                    let p = vertices[v];
                    Point2::new(p[axes[0]], p[axes[1]])
                });
                uvs.push(uv);
            }
        }
        (vertices, triangles, uvs)
    }

    #[test]
    fn test_extract_empty_input_fails() {
        let mut extractor = QuadExtractor::new(&[], &[], &[]);
        assert!(!extractor.extract());
    }

    #[test]
    fn test_extract_cube_all_quads() {
        let (vertices, triangles, uvs) = cube_with_uvs(3.0);
        let mut extractor = QuadExtractor::new(&vertices, &triangles, &uvs);
        assert!(extractor.extract());
        assert!(!extractor.remeshed_polygons().is_empty());
        for polygon in extractor.remeshed_polygons() {
            assert!(
                polygon.len() == 3 || polygon.len() == 4,
                "unexpected {}-gon",
                polygon.len()
            );
        }
    }

    #[test]
    fn test_extract_cube_area_preserved() {
        let (vertices, triangles, uvs) = cube_with_uvs(3.0);
        let input_area: f64 = triangles
            .iter()
            .map(|t| {
                0.5 * geom::triangle_double_area(
                    &vertices[t[0]],
                    &vertices[t[1]],
                    &vertices[t[2]],
                )
            })
            .sum();

        let mut extractor = QuadExtractor::new(&vertices, &triangles, &uvs);
        assert!(extractor.extract());

        let points = extractor.remeshed_vertices();
        let output_area: f64 = extractor
            .remeshed_polygons()
            .iter()
            .map(|polygon| {
                let mut area = 0.0;
                for i in 1..polygon.len() - 1 {
                    area += 0.5
                        * geom::triangle_double_area(
                            &points[polygon[0]],
                            &points[polygon[i]],
                            &points[polygon[i + 1]],
                        );
                }
                area
            })
            .sum();
        let deviation = (output_area - input_area).abs() / input_area;
        assert!(
            deviation < 0.05,
            "area deviation {:.3} exceeds 5% (input {}, output {})",
            deviation,
            input_area,
            output_area
        );
    }

    #[test]
    fn test_extract_no_crossings_fails() {
        // All UVs inside (0, 1): no integer iso-line crosses any triangle.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let triangles = vec![[0, 1, 2]];
        let uvs = vec![[
            Point2::new(0.1, 0.1),
            Point2::new(0.9, 0.1),
            Point2::new(0.1, 0.9),
        ]];
        let mut extractor = QuadExtractor::new(&vertices, &triangles, &uvs);
        assert!(!extractor.extract());
    }
}
