//! Cross-point graph simplification.
//!
//! The raw connection set becomes a sparse planar graph over cross points.
//! Degree-2 chain vertices are dissolved so that grid cells appear as
//! 4-cycles, then three local rewrite rules run to a fixed point:
//! short-edge collapse, 3-cycle elimination and dangling-vertex removal.
//! Each rule strictly shrinks the graph, so the loop terminates.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Point3;

/// Fraction of the average edge length below which an edge collapses.
const COLLAPSE_LENGTH_FACTOR: f64 = 0.01;

/// Adjacency over cross points, kept in ordered maps for deterministic
/// iteration. Vertices with no edges have no entry.
#[derive(Debug, Default)]
pub(super) struct CrossGraph {
    pub adjacency: BTreeMap<usize, BTreeSet<usize>>,
}

impl CrossGraph {
    /// Build the adjacency map from the raw connection set.
    pub fn from_connections(connections: &BTreeSet<(usize, usize)>) -> Self {
        let mut adjacency: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for &(a, b) in connections {
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }
        Self { adjacency }
    }

    /// Number of vertices with at least one edge.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Dissolve degree-2 chain vertices, connecting their two neighbors
    /// directly. Repeats until no chain vertex remains.
    ///
    /// A vertex is skipped in a round when either neighbor was already
    /// dissolved in the same round, so rewiring stays well defined.
    pub fn dissolve_chains(&mut self) {
        loop {
            let mut dissolved: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
            let candidates: Vec<usize> = self
                .adjacency
                .iter()
                .filter(|(_, n)| n.len() == 2)
                .map(|(&v, _)| v)
                .collect();
            for v in candidates {
                let neighbors = &self.adjacency[&v];
                if neighbors.len() != 2 {
                    continue;
                }
                let mut it = neighbors.iter();
                let first = *it.next().unwrap();
                let second = *it.next().unwrap();
                if dissolved.contains_key(&first) || dissolved.contains_key(&second) {
                    continue;
                }
                dissolved.insert(v, (first, second));
                self.adjacency.remove(&v);
            }
            if dissolved.is_empty() {
                break;
            }
            for (&v, &(first, second)) in &dissolved {
                if let Some(n) = self.adjacency.get_mut(&first) {
                    n.remove(&v);
                    n.insert(second);
                }
                if let Some(n) = self.adjacency.get_mut(&second) {
                    n.remove(&v);
                    n.insert(first);
                }
            }
        }
    }

    /// Collapse one edge: `b` absorbs `a` at their midpoint.
    ///
    /// No-op when the edge no longer exists.
    pub fn collapse_edge(&mut self, points: &mut [Point3<f64>], a: usize, b: usize) {
        let connected = self
            .adjacency
            .get(&a)
            .is_some_and(|n| n.contains(&b))
            && self.adjacency.get(&b).is_some_and(|n| n.contains(&a));
        if !connected {
            return;
        }
        points[b] = Point3::from((points[a].coords + points[b].coords) * 0.5);
        let a_neighbors: Vec<usize> = self.adjacency[&a].iter().copied().collect();
        for neighbor in a_neighbors {
            if neighbor == b {
                continue;
            }
            if let Some(n) = self.adjacency.get_mut(&b) {
                n.insert(neighbor);
            }
            if let Some(n) = self.adjacency.get_mut(&neighbor) {
                n.insert(b);
                n.remove(&a);
            }
        }
        self.adjacency.remove(&a);
        if let Some(n) = self.adjacency.get_mut(&b) {
            n.remove(&a);
            if n.is_empty() {
                self.adjacency.remove(&b);
            }
        }
    }

    /// Collapse all edges shorter than 1% of the average edge length.
    pub fn collapse_short_edges(&mut self, points: &mut [Point3<f64>]) -> bool {
        let mut edge_lengths: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut total_length = 0.0;
        for (&v, neighbors) in &self.adjacency {
            for &neighbor in neighbors {
                if edge_lengths.contains_key(&(neighbor, v)) {
                    continue;
                }
                let length = (points[v] - points[neighbor]).norm();
                total_length += length;
                edge_lengths.insert((v, neighbor), length);
            }
        }
        if edge_lengths.is_empty() {
            return false;
        }
        let average = total_length / edge_lengths.len() as f64;
        let collapse_below = average * COLLAPSE_LENGTH_FACTOR;
        let mut collapsed = false;
        for (&(a, b), &length) in &edge_lengths {
            if length > collapse_below {
                continue;
            }
            self.collapse_edge(points, a, b);
            collapsed = true;
        }
        collapsed
    }

    /// Eliminate 3-cycles by collapsing each cycle's shortest edge.
    pub fn collapse_triangles(&mut self, points: &mut [Point3<f64>]) -> bool {
        let mut cycles: Vec<[usize; 3]> = Vec::new();
        for (&a, neighbors) in &self.adjacency {
            let sorted: Vec<usize> = neighbors.iter().copied().filter(|&n| n > a).collect();
            for (i, &b) in sorted.iter().enumerate() {
                for &c in &sorted[i + 1..] {
                    if self.adjacency[&b].contains(&c) {
                        cycles.push([a, b, c]);
                    }
                }
            }
        }
        let mut collapsed = false;
        for [a, b, c] in cycles {
            // The cycle may already be gone.
            let intact = [(a, b), (b, c), (a, c)].iter().all(|&(x, y)| {
                self.adjacency.get(&x).is_some_and(|n| n.contains(&y))
            });
            if !intact {
                continue;
            }
            let edges = [(a, b), (b, c), (a, c)];
            let shortest = edges
                .iter()
                .min_by(|&&(x0, y0), &&(x1, y1)| {
                    let l0 = (points[x0] - points[y0]).norm_squared();
                    let l1 = (points[x1] - points[y1]).norm_squared();
                    l0.partial_cmp(&l1).unwrap_or(std::cmp::Ordering::Equal)
                })
                .copied()
                .unwrap_or((a, b));
            self.collapse_edge(points, shortest.0, shortest.1);
            collapsed = true;
        }
        collapsed
    }

    /// Remove degree-1 vertices until none remain.
    pub fn remove_single_endpoints(&mut self) -> bool {
        let mut changed = false;
        loop {
            let dangling: Vec<usize> = self
                .adjacency
                .iter()
                .filter(|(_, n)| n.len() <= 1)
                .map(|(&v, _)| v)
                .collect();
            if dangling.is_empty() {
                break;
            }
            changed = true;
            for v in dangling {
                if let Some(neighbors) = self.adjacency.remove(&v) {
                    for neighbor in neighbors {
                        if let Some(n) = self.adjacency.get_mut(&neighbor) {
                            n.remove(&v);
                            if n.is_empty() {
                                self.adjacency.remove(&neighbor);
                            }
                        }
                    }
                }
            }
        }
        changed
    }

    /// Run the three rewrite rules to a fixed point, re-dissolving chains
    /// after any round that changed the graph.
    pub fn simplify(&mut self, points: &mut [Point3<f64>]) {
        loop {
            let mut changed = false;
            changed |= self.collapse_short_edges(points);
            changed |= self.collapse_triangles(points);
            changed |= self.remove_single_endpoints();
            if !changed {
                break;
            }
            self.dissolve_chains();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(edges: &[(usize, usize)]) -> CrossGraph {
        let connections: BTreeSet<(usize, usize)> = edges.iter().copied().collect();
        CrossGraph::from_connections(&connections)
    }

    fn grid_points(n: usize) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| Point3::new(i as f64, 0.0, 0.0))
            .collect()
    }

    #[test]
    fn test_dissolve_chain_into_cycle() {
        // 0-1-2-3-0 square with a chain vertex 4 between 0 and 1.
        let mut g = graph_of(&[(0, 4), (4, 1), (1, 2), (2, 3), (3, 0)]);
        g.dissolve_chains();
        // Every vertex of a pure cycle has degree 2, so the whole cycle
        // dissolves down to nothing or a minimal core; what matters is that
        // no degree-2 vertex remains.
        assert!(g.adjacency.values().all(|n| n.len() != 2));
    }

    #[test]
    fn test_collapse_edge_merges_neighbors() {
        let mut points = grid_points(4);
        let mut g = graph_of(&[(0, 1), (1, 2), (2, 3), (3, 0)]);
        g.collapse_edge(&mut points, 0, 1);
        assert!(!g.adjacency.contains_key(&0));
        assert!(g.adjacency[&1].contains(&3));
        assert!(g.adjacency[&3].contains(&1));
        // Midpoint of 0 and 1.
        assert!((points[1].x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_collapse_short_edges_threshold() {
        // Edge (1,2) is far below 1% of the average length.
        let mut points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.000001, 0.0, 0.0),
            Point3::new(20.0, 0.0, 0.0),
        ];
        let mut g = graph_of(&[(0, 1), (1, 2), (2, 3)]);
        assert!(g.collapse_short_edges(&mut points));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_collapse_triangles() {
        let mut points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 0.1, 0.0),
            Point3::new(0.5, 2.0, 0.0),
        ];
        // Triangle 0-1-2 plus a tail 2-3.
        let mut g = graph_of(&[(0, 1), (1, 2), (0, 2), (2, 3)]);
        assert!(g.collapse_triangles(&mut points));
        // No 3-cycle left.
        let mut has_triangle = false;
        for (&a, neighbors) in &g.adjacency {
            for &b in neighbors {
                for &c in neighbors {
                    if b < c && g.adjacency[&b].contains(&c) && a < b {
                        has_triangle = true;
                    }
                }
            }
        }
        assert!(!has_triangle);
    }

    #[test]
    fn test_remove_single_endpoints_cascades() {
        // A path hanging off a square: removal cascades down the path.
        let mut g = graph_of(&[(0, 1), (1, 2), (2, 3), (3, 0), (0, 4), (4, 5), (5, 6)]);
        assert!(g.remove_single_endpoints());
        assert!(!g.adjacency.contains_key(&6));
        assert!(!g.adjacency.contains_key(&5));
        assert!(!g.adjacency.contains_key(&4));
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn test_simplify_terminates_and_cleans() {
        let mut points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.5, 0.0),
            Point3::new(1.0000001, 0.0, 0.0),
        ];
        // Square with a dangling tail at 4 and a micro-edge 1-5.
        let mut g = graph_of(&[(0, 1), (1, 2), (2, 3), (3, 0), (2, 4), (1, 5)]);
        g.simplify(&mut points);
        for neighbors in g.adjacency.values() {
            assert!(neighbors.len() > 1);
        }
    }
}
