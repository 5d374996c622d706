//! Iso-line crossing extraction.
//!
//! For every triangle, the integer iso-lines of the two UV coordinate
//! functions are intersected with the triangle's edges; the intersections
//! become cross points (the raw vertices of the quad mesh) and co-occurring
//! intersections within one triangle become connections. Segments of one UV
//! family are additionally split wherever the other family's iso-lines cross
//! them, so grid cells close into 4-cycles.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{Point2, Point3};

use crate::geom;

/// Quantized 3D position used to merge coincident cross points.
///
/// Coordinates are scaled by 1e5 and rounded, so points closer than half a
/// unit of that grid collapse into one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) struct PositionKey {
    x: i64,
    y: i64,
    z: i64,
}

const POSITION_KEY_SCALE: f64 = 100_000.0;

impl PositionKey {
    pub(super) fn new(p: &Point3<f64>) -> Self {
        Self {
            x: (p.x * POSITION_KEY_SCALE).round() as i64,
            y: (p.y * POSITION_KEY_SCALE).round() as i64,
            z: (p.z * POSITION_KEY_SCALE).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CrossPoint {
    position3: Point3<f64>,
    position2: Point2<f64>,
    integer: i32,
}

/// Result of the crossing extraction over one triangle mesh.
pub(super) struct Connections {
    /// Deduplicated cross-point positions.
    pub cross_points: Vec<Point3<f64>>,
    /// Source triangle of each cross point, parallel to `cross_points`.
    pub source_triangles: Vec<usize>,
    /// Undirected connections between cross points, as (min, max) pairs.
    pub connections: BTreeSet<(usize, usize)>,
}

/// Extract cross points and their connections from a UV-annotated mesh.
pub(super) fn extract_connections(
    vertices: &[Point3<f64>],
    triangles: &[[usize; 3]],
    triangle_uvs: &[[Point2<f64>; 3]],
) -> Connections {
    let mut cross_points: Vec<Point3<f64>> = Vec::new();
    let mut source_triangles: Vec<usize> = Vec::new();
    let mut connections: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut cross_point_map: BTreeMap<PositionKey, usize> = BTreeMap::new();

    let mut add_cross_point = |position3: &Point3<f64>,
                               triangle_index: usize,
                               cross_points: &mut Vec<Point3<f64>>,
                               source_triangles: &mut Vec<usize>| {
        *cross_point_map
            .entry(PositionKey::new(position3))
            .or_insert_with(|| {
                cross_points.push(*position3);
                source_triangles.push(triangle_index);
                cross_points.len() - 1
            })
    };

    for (triangle_index, (corner_indices, corner_uvs)) in
        triangles.iter().zip(triangle_uvs.iter()).enumerate()
    {
        // Per UV axis: iso-integer -> list of segments crossing the triangle.
        let mut lines: [BTreeMap<i32, Vec<[CrossPoint; 2]>>; 2] =
            [BTreeMap::new(), BTreeMap::new()];
        let mut edge_collapsed = [[false; 3]; 2];

        for axis in 0..2 {
            for j in 0..3 {
                let k = (j + 1) % 3;
                let current = corner_uvs[j][axis];
                let next = corner_uvs[k][axis];
                // An edge lying exactly on an integer iso-line is itself a
                // segment of that iso-line.
                if geom::is_zero((current as i32) as f64 - current)
                    && geom::is_zero(current - next)
                {
                    let integer = current as i32;
                    edge_collapsed[axis][j] = true;
                    let from_point = CrossPoint {
                        position3: vertices[corner_indices[j]],
                        position2: corner_uvs[j],
                        integer,
                    };
                    let to_point = CrossPoint {
                        position3: vertices[corner_indices[k]],
                        position2: corner_uvs[k],
                        integer,
                    };
                    lines[axis]
                        .entry(integer)
                        .or_default()
                        .push([from_point, to_point]);
                }
            }

            let mut points: BTreeMap<i32, Vec<CrossPoint>> = BTreeMap::new();
            for j in 0..3 {
                let k = (j + 1) % 3;
                let current = corner_uvs[j][axis];
                let next = corner_uvs[k][axis];
                let distance = (current - next).abs();
                // Truncation-toward-zero comparison; the sign check catches
                // edges straddling zero whose truncations agree.
                if (current as i32) != (next as i32) || (current > 0.0) != (next > 0.0) {
                    let (low_integer, high_integer, from_position, from_index, to_index) =
                        if current < next {
                            (current as i32, next as i32, current, j, k)
                        } else {
                            (next as i32, current as i32, next, k, j)
                        };
                    for integer in low_integer..=high_integer {
                        let ratio = (integer as f64 - from_position) / distance;
                        if !(0.0..=1.0).contains(&ratio) {
                            continue;
                        }
                        if (geom::is_zero(ratio) || geom::is_zero(ratio - 1.0))
                            && edge_collapsed[axis][j]
                        {
                            continue;
                        }
                        let p_from = &vertices[corner_indices[from_index]];
                        let p_to = &vertices[corner_indices[to_index]];
                        let uv_from = &corner_uvs[from_index];
                        let uv_to = &corner_uvs[to_index];
                        points.entry(integer).or_default().push(CrossPoint {
                            position3: Point3::from(
                                p_from.coords * (1.0 - ratio) + p_to.coords * ratio,
                            ),
                            position2: Point2::from(
                                uv_from.coords * (1.0 - ratio) + uv_to.coords * ratio,
                            ),
                            integer,
                        });
                    }
                }
            }
            for (integer, group) in points {
                for point_index in 0..group.len() {
                    let next_point_index = (point_index + 1) % group.len();
                    lines[axis]
                        .entry(integer)
                        .or_default()
                        .push([group[point_index], group[next_point_index]]);
                }
            }
        }

        // Split each family's segments at the other family's iso positions.
        for axis in 0..2 {
            let other = (axis + 1) % 2;
            let split_positions: Vec<f64> = lines[other]
                .values()
                .filter_map(|group| group.first())
                .map(|segment| segment[0].position2[other])
                .collect();
            for group in lines[axis].values() {
                for target in group {
                    let mut segments: Vec<[CrossPoint; 2]> = vec![*target];
                    for &segment_position in &split_positions {
                        for segment_index in (0..segments.len()).rev() {
                            let segment = &segments[segment_index];
                            let uv0 = segment[0].position2[other];
                            let uv1 = segment[1].position2[other];
                            let distance = (uv0 - uv1).abs();
                            if geom::is_zero(distance) {
                                continue;
                            }
                            let (from_position, to_position, from_index, to_index) = if uv0 < uv1 {
                                (uv0, uv1, 0usize, 1usize)
                            } else {
                                (uv1, uv0, 1usize, 0usize)
                            };
                            if segment_position < from_position || segment_position > to_position {
                                continue;
                            }
                            let ratio = (segment_position - from_position) / distance;
                            let from = segments[segment_index][from_index];
                            let to = segments[segment_index][to_index];
                            let new_from_point = CrossPoint {
                                position3: Point3::from(
                                    from.position3.coords * (1.0 - ratio)
                                        + to.position3.coords * ratio,
                                ),
                                position2: Point2::from(
                                    from.position2.coords * (1.0 - ratio)
                                        + to.position2.coords * ratio,
                                ),
                                integer: to.integer,
                            };
                            segments[segment_index][to_index] = new_from_point;
                            segments.push([new_from_point, to]);
                        }
                    }
                    for segment in &segments {
                        let from = add_cross_point(
                            &segment[0].position3,
                            triangle_index,
                            &mut cross_points,
                            &mut source_triangles,
                        );
                        let to = add_cross_point(
                            &segment[1].position3,
                            triangle_index,
                            &mut cross_points,
                            &mut source_triangles,
                        );
                        if from != to {
                            connections.insert((from.min(to), from.max(to)));
                        }
                    }
                }
            }
        }
    }

    Connections {
        cross_points,
        source_triangles,
        connections,
    }
}
