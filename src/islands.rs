//! Connected-component analysis over face lists.
//!
//! Faces are adjacent when they share an undirected edge. Edges incident to
//! more than two faces are non-manifold and act as hard boundaries: the
//! flood fill never crosses them, so islands stay manifold-connected.
//!
//! Works on arbitrary polygon faces; the driver uses it on triangles and the
//! quad extractor uses it on extracted polygon loops.

use std::collections::{HashMap, VecDeque};

/// Canonical undirected edge key.
#[inline]
pub fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Map each undirected edge to the faces incident on it.
pub fn build_edge_to_face_map<F: AsRef<[usize]>>(
    faces: &[F],
) -> HashMap<(usize, usize), Vec<usize>> {
    let mut map: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        for i in 0..face.len() {
            let key = edge_key(face[i], face[(i + 1) % face.len()]);
            map.entry(key).or_default().push(fi);
        }
    }
    map
}

/// Partition faces into edge-connected islands.
///
/// Returns one list of face indices per island, in deterministic order:
/// islands are seeded at the lowest unvisited face index and grown
/// breadth-first, so the same input always yields the same partition.
pub fn split_to_islands<F: AsRef<[usize]>>(faces: &[F]) -> Vec<Vec<usize>> {
    let edge_to_faces = build_edge_to_face_map(faces);
    let mut visited = vec![false; faces.len()];
    let mut islands = Vec::new();

    for seed in 0..faces.len() {
        if visited[seed] {
            continue;
        }
        let mut island = Vec::new();
        let mut queue = VecDeque::new();
        visited[seed] = true;
        queue.push_back(seed);
        while let Some(fi) = queue.pop_front() {
            island.push(fi);
            let face = faces[fi].as_ref();
            for i in 0..face.len() {
                let key = edge_key(face[i], face[(i + 1) % face.len()]);
                let incident = &edge_to_faces[&key];
                if incident.len() > 2 {
                    // Non-manifold edge; do not cross.
                    continue;
                }
                for &other in incident {
                    if !visited[other] {
                        visited[other] = true;
                        queue.push_back(other);
                    }
                }
            }
        }
        islands.push(island);
    }
    islands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_canonical() {
        assert_eq!(edge_key(5, 2), (2, 5));
        assert_eq!(edge_key(2, 5), (2, 5));
    }

    #[test]
    fn test_single_island() {
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let islands = split_to_islands(&faces);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0], vec![0, 1]);
    }

    #[test]
    fn test_two_islands() {
        // Two triangles sharing only vertex 2 (vertex adjacency is not edge
        // adjacency).
        let faces = vec![[0, 1, 2], [2, 3, 4]];
        let islands = split_to_islands(&faces);
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0], vec![0]);
        assert_eq!(islands[1], vec![1]);
    }

    #[test]
    fn test_every_face_in_exactly_one_island() {
        let faces = vec![[0, 1, 2], [0, 2, 3], [4, 5, 6], [5, 6, 7], [8, 9, 10]];
        let islands = split_to_islands(&faces);
        let mut seen = vec![0usize; faces.len()];
        for island in &islands {
            for &fi in island {
                seen[fi] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
        assert_eq!(islands.len(), 3);
    }

    #[test]
    fn test_non_manifold_edge_is_boundary() {
        // Three triangles fanning around the edge (0, 1).
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let islands = split_to_islands(&faces);
        assert_eq!(islands.len(), 3);
    }

    #[test]
    fn test_polygon_faces() {
        let faces: Vec<Vec<usize>> = vec![vec![0, 1, 2, 3], vec![1, 4, 5, 2], vec![6, 7, 8]];
        let islands = split_to_islands(&faces);
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0], vec![0, 1]);
    }
}
