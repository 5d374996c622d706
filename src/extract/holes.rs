//! Repair passes over the extracted polygon mesh.
//!
//! Winding repair, isolated- and non-manifold-face removal, boundary loop
//! search over the canonical directed half-edge set, and greedy hole filling
//! with scored quads (ear clipping for quads). Holes that shrink to three
//! vertices are closed with a triangle face.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::geom;
use crate::islands;

use super::QuadExtractor;

/// Boundary loops longer than this are left open rather than filled.
const MAX_HOLE_LENGTH: usize = 65;

impl QuadExtractor<'_> {
    /// Reverse faces whose winding disagrees with most of their neighbors.
    ///
    /// A directed half-edge shared by two faces means the faces wind
    /// oppositely across that edge; a face collecting three or more such
    /// conflicts is the flipped one and gets reversed.
    pub(super) fn fix_flipped_faces(&mut self) {
        let mut half_edge_to_faces: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for (fi, face) in self.remeshed_polygons.iter().enumerate() {
            for j in 0..face.len() {
                let k = (j + 1) % face.len();
                half_edge_to_faces
                    .entry((face[j], face[k]))
                    .or_default()
                    .push(fi);
            }
        }
        let mut face_conflicts: HashMap<usize, usize> = HashMap::new();
        for faces in half_edge_to_faces.values() {
            if faces.len() == 1 {
                continue;
            }
            for &fi in faces {
                *face_conflicts.entry(fi).or_insert(0) += 1;
            }
        }
        for (&fi, &conflicts) in &face_conflicts {
            if conflicts >= 3 {
                self.remeshed_polygons[fi].reverse();
            }
        }
    }

    /// Keep only the largest edge-connected polygon island.
    pub(super) fn remove_isolated_faces(&mut self) -> bool {
        let polygon_islands = islands::split_to_islands(&self.remeshed_polygons);
        let Some(largest) = polygon_islands.iter().max_by_key(|island| island.len()) else {
            return false;
        };
        let keep: Vec<Vec<usize>> = largest
            .iter()
            .map(|&fi| self.remeshed_polygons[fi].clone())
            .collect();
        self.remeshed_polygons = keep;
        true
    }

    /// Drop faces touching a vertex with more than two open boundary edges.
    ///
    /// Returns whether anything was removed; callers loop this with isolated
    /// face removal until stable.
    pub(super) fn remove_non_manifold_faces(&mut self) -> bool {
        let mut directed: BTreeSet<(usize, usize)> = BTreeSet::new();
        for face in &self.remeshed_polygons {
            for j in 0..face.len() {
                let k = (j + 1) % face.len();
                directed.insert((face[j], face[k]));
            }
        }
        let mut vertex_open_boundary_count: HashMap<usize, usize> = HashMap::new();
        for &(a, b) in &directed {
            if directed.contains(&(b, a)) {
                continue;
            }
            *vertex_open_boundary_count.entry(a).or_insert(0) += 1;
            *vertex_open_boundary_count.entry(b).or_insert(0) += 1;
        }
        let mut changed = false;
        let mut manifold_faces = Vec::with_capacity(self.remeshed_polygons.len());
        for face in std::mem::take(&mut self.remeshed_polygons) {
            let non_manifold = face
                .iter()
                .any(|v| vertex_open_boundary_count.get(v).copied().unwrap_or(0) > 2);
            if non_manifold {
                changed = true;
                continue;
            }
            manifold_faces.push(face);
        }
        self.remeshed_polygons = manifold_faces;
        changed
    }

    /// Snapshot the current half-edges as protected: hole filling refuses
    /// candidate quads whose directed edges collide with them.
    pub(super) fn record_good_quads(&mut self) {
        self.good_half_edges.clear();
        for face in &self.remeshed_polygons {
            for j in 0..face.len() {
                let k = (j + 1) % face.len();
                self.good_half_edges.insert((face[j], face[k]));
            }
        }
    }

    /// Find open boundary loops.
    ///
    /// A directed half-edge without a reverse lies on a boundary; chaining
    /// such edges head to tail yields the loops, in face-winding direction.
    pub(super) fn search_boundaries(&self) -> Vec<Vec<usize>> {
        let mut directed: BTreeSet<(usize, usize)> = BTreeSet::new();
        for face in &self.remeshed_polygons {
            for j in 0..face.len() {
                let k = (j + 1) % face.len();
                directed.insert((face[j], face[k]));
            }
        }
        let mut next: BTreeMap<usize, usize> = BTreeMap::new();
        for &(a, b) in &directed {
            if !directed.contains(&(b, a)) {
                next.insert(a, b);
            }
        }
        let mut loops = Vec::new();
        let mut visited: BTreeSet<usize> = BTreeSet::new();
        let starts: Vec<usize> = next.keys().copied().collect();
        for start in starts {
            if visited.contains(&start) {
                continue;
            }
            let mut loop_vertices = vec![start];
            visited.insert(start);
            let mut current = start;
            let closed = loop {
                let Some(&following) = next.get(&current) else {
                    break false;
                };
                if following == start {
                    break true;
                }
                if visited.contains(&following) {
                    break false;
                }
                visited.insert(following);
                loop_vertices.push(following);
                current = following;
            };
            if closed && loop_vertices.len() > 1 {
                loops.push(loop_vertices);
            }
        }
        loops
    }

    /// Close every boundary loop short enough to fill.
    ///
    /// Each loop is filled twice: first with the quality gate on, then, if
    /// four or more vertices remain, unconditionally.
    pub(super) fn fix_holes(&mut self) {
        let loops = self.search_boundaries();
        debug!(holes = loops.len(), "fixing holes");
        for mut hole in loops {
            if hole.len() > MAX_HOLE_LENGTH {
                debug!(length = hole.len(), "ignoring long hole");
                continue;
            }
            if hole.len() == 1 {
                continue;
            }
            self.fix_hole_with_quads(&mut hole, true);
            if hole.len() >= 4 {
                self.fix_hole_with_quads(&mut hole, false);
            }
        }
    }

    /// Greedily clip quads off a boundary loop.
    ///
    /// Each round scores every loop position by the alignment of its two
    /// flanking edge directions and consumes the best-scoring corner pair as
    /// a quad. With `check_score` set, a best score at or below zero aborts
    /// the fill and leaves the remaining hole for the unconditional pass.
    /// Candidates that collide with protected half-edges or that would trap
    /// another loop vertex inside their plane are skipped. A loop reduced to
    /// three vertices closes with a triangle.
    pub(super) fn fix_hole_with_quads(&mut self, hole: &mut Vec<usize>, check_score: bool) {
        loop {
            if hole.len() <= 2 {
                return;
            }
            if hole.len() == 3 {
                self.remeshed_polygons
                    .push(vec![hole[2], hole[1], hole[0]]);
                hole.clear();
                return;
            }
            if hole.len() == 4 {
                self.remeshed_polygons
                    .push(vec![hole[3], hole[2], hole[1], hole[0]]);
                hole.clear();
                return;
            }

            let mut edge_scores: Vec<(usize, f64)> = Vec::with_capacity(hole.len());
            for i in 0..hole.len() {
                let h = (i + hole.len() - 1) % hole.len();
                let j = (i + 1) % hole.len();
                let k = (j + 1) % hole.len();
                let left =
                    (self.remeshed_vertices[hole[h]] - self.remeshed_vertices[hole[i]]).normalize();
                let right =
                    (self.remeshed_vertices[hole[k]] - self.remeshed_vertices[hole[j]]).normalize();
                edge_scores.push((i, left.dot(&right)));
            }
            edge_scores.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            let mut hole_changed = false;
            for &(i, score) in edge_scores.iter().rev() {
                if check_score && score <= 0.0 {
                    debug!(score, "hole fill stopped at low score");
                    return;
                }
                let h = (i + hole.len() - 1) % hole.len();
                let j = (i + 1) % hole.len();
                let k = (j + 1) % hole.len();
                let candidate = [hole[k], hole[j], hole[i], hole[h]];
                let collides = (0..4).any(|c| {
                    self.good_half_edges
                        .contains(&(candidate[c], candidate[(c + 1) % 4]))
                });
                if collides {
                    continue;
                }
                let remain: Vec<usize> = (0..hole.len())
                    .filter(|&w| w != i && w != j && w != h && w != k)
                    .map(|w| hole[w])
                    .collect();
                let traps_point = remain.iter().any(|&p| {
                    geom::point_in_triangle(
                        &self.remeshed_vertices[candidate[0]],
                        &self.remeshed_vertices[candidate[1]],
                        &self.remeshed_vertices[candidate[2]],
                        &self.remeshed_vertices[p],
                    ) || geom::point_in_triangle(
                        &self.remeshed_vertices[candidate[2]],
                        &self.remeshed_vertices[candidate[3]],
                        &self.remeshed_vertices[candidate[0]],
                        &self.remeshed_vertices[p],
                    )
                });
                if traps_point {
                    continue;
                }
                self.remeshed_polygons.push(candidate.to_vec());
                // Clip i and j out of the loop; h and k become neighbors of
                // the new quad's far edge.
                let new_hole: Vec<usize> = (0..hole.len())
                    .filter(|&w| w != i && w != j)
                    .map(|w| hole[w])
                    .collect();
                *hole = new_hole;
                hole_changed = true;
                break;
            }
            if !hole_changed {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::cube_with_uvs;
    use super::super::QuadExtractor;
    use nalgebra::Point3;

    fn extractor_with_polygons<'a>(
        vertices: &'a [Point3<f64>],
        positions: Vec<Point3<f64>>,
        polygons: Vec<Vec<usize>>,
    ) -> QuadExtractor<'a> {
        let mut e = QuadExtractor::new(vertices, &[], &[]);
        e.remeshed_vertices = positions;
        e.remeshed_polygons = polygons;
        e
    }

    fn unit_grid_positions(n: usize) -> Vec<Point3<f64>> {
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        positions
    }

    fn grid_quads(n: usize) -> Vec<Vec<usize>> {
        let idx = |x: usize, y: usize| y * (n + 1) + x;
        let mut quads = Vec::new();
        for y in 0..n {
            for x in 0..n {
                quads.push(vec![idx(x, y), idx(x + 1, y), idx(x + 1, y + 1), idx(x, y + 1)]);
            }
        }
        quads
    }

    #[test]
    fn test_fix_flipped_face() {
        let positions = unit_grid_positions(3);
        let mut quads = grid_quads(3);
        // Reverse the center quad.
        quads[4].reverse();
        let flipped = quads[4].clone();
        let mut e = extractor_with_polygons(&[], positions, quads);
        e.fix_flipped_faces();
        let mut expected = flipped;
        expected.reverse();
        assert_eq!(e.remeshed_polygons[4], expected);
    }

    #[test]
    fn test_remove_isolated_faces_keeps_largest() {
        let mut positions = unit_grid_positions(2);
        positions.push(Point3::new(50.0, 50.0, 0.0));
        positions.push(Point3::new(51.0, 50.0, 0.0));
        positions.push(Point3::new(51.0, 51.0, 0.0));
        positions.push(Point3::new(50.0, 51.0, 0.0));
        let mut quads = grid_quads(2);
        let offset = 9;
        quads.push(vec![offset, offset + 1, offset + 2, offset + 3]);
        let mut e = extractor_with_polygons(&[], positions, quads);
        assert!(e.remove_isolated_faces());
        assert_eq!(e.remeshed_polygons.len(), 4);
    }

    #[test]
    fn test_search_boundaries_grid_patch() {
        let positions = unit_grid_positions(2);
        let quads = grid_quads(2);
        let e = extractor_with_polygons(&[], positions, quads);
        let loops = e.search_boundaries();
        // One outer boundary with all 8 rim vertices.
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 8);
    }

    #[test]
    fn test_search_boundaries_closed_mesh_none() {
        let (vertices, triangles, uvs) = cube_with_uvs(3.0);
        let mut e = QuadExtractor::new(&vertices, &triangles, &uvs);
        assert!(e.extract());
        assert!(e.search_boundaries().is_empty());
    }

    #[test]
    fn test_fix_square_hole_with_one_quad() {
        // 3x3 grid with the center quad missing.
        let positions = unit_grid_positions(3);
        let mut quads = grid_quads(3);
        let removed = quads.remove(4);
        let mut e = extractor_with_polygons(&[], positions, quads);
        e.record_good_quads();
        // The patch has two loops: the center hole and the outer rim. Fill
        // just the center hole.
        let loops = e.search_boundaries();
        let mut hole = loops.iter().find(|l| l.len() == 4).unwrap().clone();
        e.fix_hole_with_quads(&mut hole, true);
        assert!(hole.is_empty());
        assert_eq!(e.remeshed_polygons.len(), 9);
        let filled = e.remeshed_polygons.last().unwrap();
        let mut expected: Vec<usize> = removed.clone();
        expected.sort_unstable();
        let mut got = filled.clone();
        got.sort_unstable();
        assert_eq!(got, expected);
        // Only the outer rim remains open.
        assert_eq!(e.search_boundaries().len(), 1);
    }

    #[test]
    fn test_fix_triangle_hole_with_triangle() {
        // A hexagonal ring of quads around a missing triangle is hard to
        // build by hand; instead check the 3-loop fallback directly.
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let mut e = extractor_with_polygons(&[], positions, vec![]);
        let mut hole = vec![0, 1, 2];
        e.fix_hole_with_quads(&mut hole, true);
        assert!(hole.is_empty());
        assert_eq!(e.remeshed_polygons, vec![vec![2, 1, 0]]);
    }

    #[test]
    fn test_long_hole_left_open() {
        // A thin strip of quads missing one long side would exceed the hole
        // limit; emulate with a synthetic loop length check.
        let n = 40;
        let positions = unit_grid_positions(n);
        let mut quads = grid_quads(n);
        // Remove the entire interior, keeping only the outer ring of quads.
        quads.retain(|q| {
            q.iter().any(|&v| {
                let x = v % (n + 1);
                let y = v / (n + 1);
                x == 0 || y == 0 || x == n || y == n
            })
        });
        let mut e = extractor_with_polygons(&[], positions, quads);
        e.record_good_quads();
        let before = e.remeshed_polygons.len();
        let loops = e.search_boundaries();
        assert!(loops.iter().any(|l| l.len() > super::MAX_HOLE_LENGTH));
        e.fix_holes();
        // The long interior hole stays open.
        assert_eq!(e.remeshed_polygons.len(), before);
    }
}
