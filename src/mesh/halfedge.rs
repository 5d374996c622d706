//! Half-edge mesh data structure.
//!
//! This module provides a half-edge (doubly-connected edge list) representation
//! for triangle meshes, with deferred deletion so that topological surgery can
//! mark elements dead mid-traversal and reclaim them in a later pass.
//!
//! # Structure
//!
//! - Each interior edge is split into two **half-edges** pointing in opposite
//!   directions; a half-edge with no opposite lies on an open boundary
//! - Each half-edge knows its **opposite**, **next**/**prev** around its face,
//!   its **start vertex**, its **left face**, and carries the UV coordinate of
//!   its start vertex for that face corner
//! - Each vertex stores one outgoing half-edge and a count of outgoing
//!   half-edges
//!
//! # Storage
//!
//! Elements live in arena vectors addressed by [`VertexId`], [`HalfEdgeId`]
//! and [`FaceId`] slot indices. Freed slots go onto free lists and are reused
//! by later allocations, so handles stay stable across deletions.
//!
//! # Deferred Deletion
//!
//! `defer_free_*` marks an element for removal without reclaiming its slot;
//! traversals in flight keep working and can query liveness via `is_*_alive`.
//! [`Mesh::collect_garbage`] reclaims all marked slots at once. Deferring the
//! same element twice is a no-op.

use nalgebra::{Point2, Point3, Vector3};

use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::geom;

/// A vertex in the half-edge mesh.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// Vertex normal (normalized sum of incident face normals).
    /// Zero until [`Mesh::update_normals`] runs.
    pub normal: Vector3<f64>,

    /// Neighborhood-averaged normal, a smoothed variant of `normal`.
    pub averaged_normal: Vector3<f64>,

    /// Relative-height scalar in [-1, 1], filled by the height analysis.
    pub relative_height: f64,

    /// Whether `relative_height` has been computed for this vertex.
    pub relative_height_valid: bool,

    /// Index of this vertex in the input vertex list.
    pub source_index: usize,

    /// Index assigned when the vertex survives into the exported mesh.
    pub output_index: usize,

    /// One outgoing half-edge from this vertex.
    pub halfedge: HalfEdgeId,

    /// Number of outgoing half-edges.
    pub halfedge_count: usize,

    alive: bool,
    pending_removal: bool,
}

impl Vertex {
    fn new(position: Point3<f64>, source_index: usize) -> Self {
        Self {
            position,
            normal: Vector3::zeros(),
            averaged_normal: Vector3::zeros(),
            relative_height: 0.0,
            relative_height_valid: false,
            source_index,
            output_index: usize::MAX,
            halfedge: HalfEdgeId::invalid(),
            halfedge_count: 0,
            alive: true,
            pending_removal: false,
        }
    }
}

/// A half-edge in the mesh.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge {
    /// The vertex this half-edge originates from.
    pub start_vertex: VertexId,

    /// The face on the left of this half-edge.
    pub left_face: FaceId,

    /// The previous half-edge around the face.
    pub prev: HalfEdgeId,

    /// The next half-edge around the face (counter-clockwise).
    pub next: HalfEdgeId,

    /// The opposite half-edge. Invalid for boundary half-edges.
    pub opposite: HalfEdgeId,

    /// UV coordinate of the start vertex for this face corner.
    pub uv: Point2<f64>,

    alive: bool,
    pending_removal: bool,
}

impl HalfEdge {
    fn new() -> Self {
        Self {
            start_vertex: VertexId::invalid(),
            left_face: FaceId::invalid(),
            prev: HalfEdgeId::invalid(),
            next: HalfEdgeId::invalid(),
            opposite: HalfEdgeId::invalid(),
            uv: Point2::origin(),
            alive: true,
            pending_removal: false,
        }
    }

    /// Check if this half-edge is on an open boundary.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        !self.opposite.is_valid()
    }
}

/// A face in the half-edge mesh. Always a triangle.
#[derive(Debug, Clone, Copy)]
pub struct Face {
    /// One half-edge on the boundary of this face.
    pub halfedge: HalfEdgeId,

    /// Face normal. Zero until [`Mesh::update_normals`] runs.
    pub normal: Vector3<f64>,

    alive: bool,
    pending_removal: bool,
}

impl Face {
    fn new(halfedge: HalfEdgeId) -> Self {
        Self {
            halfedge,
            normal: Vector3::zeros(),
            alive: true,
            pending_removal: false,
        }
    }
}

/// A triangle mesh stored as arenas of vertices, half-edges and faces.
///
/// Built with [`build_from_triangles`](super::build_from_triangles). Counts of
/// repeated and alone half-edges recorded at construction time are diagnostic:
/// the mesh stays usable, but [`Mesh::is_watertight`] reports false when any
/// half-edge lacks an opposite.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    halfedges: Vec<HalfEdge>,
    faces: Vec<Face>,

    free_vertices: Vec<VertexId>,
    free_halfedges: Vec<HalfEdgeId>,
    free_faces: Vec<FaceId>,

    pending_vertices: Vec<VertexId>,
    pending_halfedges: Vec<HalfEdgeId>,
    pending_faces: Vec<FaceId>,

    num_vertices: usize,
    num_halfedges: usize,
    num_faces: usize,

    pub(super) repeated_half_edges: usize,
    pub(super) alone_half_edges: usize,
}

impl Mesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- counts ----

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Number of live half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        self.num_halfedges
    }

    /// Number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.num_faces
    }

    /// Number of directed edges seen more than once during construction.
    ///
    /// Non-zero means the input was non-manifold; the extra occurrences were
    /// left without opposites.
    #[inline]
    pub fn repeated_half_edges(&self) -> usize {
        self.repeated_half_edges
    }

    /// Number of half-edges whose reverse never appeared during construction
    /// (true boundary edges, or casualties of repeated edges).
    #[inline]
    pub fn alone_half_edges(&self) -> usize {
        self.alone_half_edges
    }

    // ---- element access ----

    /// Get a vertex by ID.
    #[inline]
    pub fn vertex(&self, v: VertexId) -> &Vertex {
        &self.vertices[v.index()]
    }

    /// Get a mutable vertex by ID.
    #[inline]
    pub fn vertex_mut(&mut self, v: VertexId) -> &mut Vertex {
        &mut self.vertices[v.index()]
    }

    /// Get a half-edge by ID.
    #[inline]
    pub fn halfedge(&self, h: HalfEdgeId) -> &HalfEdge {
        &self.halfedges[h.index()]
    }

    /// Get a mutable half-edge by ID.
    #[inline]
    pub fn halfedge_mut(&mut self, h: HalfEdgeId) -> &mut HalfEdge {
        &mut self.halfedges[h.index()]
    }

    /// Get a face by ID.
    #[inline]
    pub fn face(&self, f: FaceId) -> &Face {
        &self.faces[f.index()]
    }

    /// Get a mutable face by ID.
    #[inline]
    pub fn face_mut(&mut self, f: FaceId) -> &mut Face {
        &mut self.faces[f.index()]
    }

    /// Whether the vertex slot is live (allocated and not pending removal).
    #[inline]
    pub fn is_vertex_alive(&self, v: VertexId) -> bool {
        let vertex = &self.vertices[v.index()];
        vertex.alive && !vertex.pending_removal
    }

    /// Whether the half-edge slot is live.
    #[inline]
    pub fn is_halfedge_alive(&self, h: HalfEdgeId) -> bool {
        let he = &self.halfedges[h.index()];
        he.alive && !he.pending_removal
    }

    /// Whether the face slot is live.
    #[inline]
    pub fn is_face_alive(&self, f: FaceId) -> bool {
        let face = &self.faces[f.index()];
        face.alive && !face.pending_removal
    }

    // ---- iteration ----

    /// Iterate over all live vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.alive && !v.pending_removal)
            .map(|(i, _)| VertexId::new(i))
    }

    /// Iterate over all live half-edge IDs.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.halfedges
            .iter()
            .enumerate()
            .filter(|(_, h)| h.alive && !h.pending_removal)
            .map(|(i, _)| HalfEdgeId::new(i))
    }

    /// Iterate over all live face IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive && !f.pending_removal)
            .map(|(i, _)| FaceId::new(i))
    }

    /// The three half-edges of a triangle face, starting at its anchor.
    pub fn face_halfedges(&self, f: FaceId) -> [HalfEdgeId; 3] {
        let h0 = self.faces[f.index()].halfedge;
        let h1 = self.halfedges[h0.index()].next;
        let h2 = self.halfedges[h1.index()].next;
        [h0, h1, h2]
    }

    /// The three vertices of a triangle face in winding order.
    pub fn face_triangle(&self, f: FaceId) -> [VertexId; 3] {
        let [h0, h1, h2] = self.face_halfedges(f);
        [
            self.halfedges[h0.index()].start_vertex,
            self.halfedges[h1.index()].start_vertex,
            self.halfedges[h2.index()].start_vertex,
        ]
    }

    /// The vertex a half-edge points at.
    #[inline]
    pub fn dest_vertex(&self, h: HalfEdgeId) -> VertexId {
        let next = self.halfedges[h.index()].next;
        self.halfedges[next.index()].start_vertex
    }

    /// Store one UV per face corner, in live-face iteration order.
    pub fn set_corner_uvs(&mut self, uvs: &[[Point2<f64>; 3]]) {
        let face_ids: Vec<FaceId> = self.face_ids().collect();
        for (f, uv) in face_ids.into_iter().zip(uvs.iter()) {
            let halfedges = self.face_halfedges(f);
            for (h, coordinate) in halfedges.into_iter().zip(uv.iter()) {
                self.halfedges[h.index()].uv = *coordinate;
            }
        }
    }

    /// Per-corner UVs of the live faces, parallel to [`Mesh::face_ids`] order.
    pub fn corner_uvs(&self) -> Vec<[Point2<f64>; 3]> {
        self.face_ids()
            .map(|f| self.face_halfedges(f).map(|h| self.halfedges[h.index()].uv))
            .collect()
    }

    /// Whether `a` and `b` share an edge.
    ///
    /// Walks the half-edge fan around `a` from its anchor, sweeping the
    /// other direction when an open boundary interrupts the loop.
    pub fn vertices_connected(&self, a: VertexId, b: VertexId) -> bool {
        let start = self.vertices[a.index()].halfedge;
        if !start.is_valid() {
            return false;
        }
        let budget = self.vertices[a.index()].halfedge_count + 1;
        let mut h = start;
        for _ in 0..budget {
            let prev = self.halfedges[h.index()].prev;
            if self.dest_vertex(h) == b || self.halfedges[prev.index()].start_vertex == b {
                return true;
            }
            let next = self.halfedges[prev.index()].opposite;
            if !next.is_valid() {
                break;
            }
            h = next;
            if h == start {
                return false;
            }
        }
        let mut h = start;
        for _ in 0..budget {
            let o = self.halfedges[h.index()].opposite;
            if !o.is_valid() {
                return false;
            }
            h = self.halfedges[o.index()].next;
            if h == start {
                return false;
            }
            let prev = self.halfedges[h.index()].prev;
            if self.dest_vertex(h) == b || self.halfedges[prev.index()].start_vertex == b {
                return true;
            }
        }
        false
    }

    // ---- allocation / deferred deletion ----

    /// Allocate a vertex, reusing a reclaimed slot when one is available.
    pub fn alloc_vertex(&mut self, position: Point3<f64>, source_index: usize) -> VertexId {
        self.num_vertices += 1;
        if let Some(v) = self.free_vertices.pop() {
            self.vertices[v.index()] = Vertex::new(position, source_index);
            v
        } else {
            self.vertices.push(Vertex::new(position, source_index));
            VertexId::new(self.vertices.len() - 1)
        }
    }

    /// Allocate a half-edge.
    pub fn alloc_halfedge(&mut self) -> HalfEdgeId {
        self.num_halfedges += 1;
        if let Some(h) = self.free_halfedges.pop() {
            self.halfedges[h.index()] = HalfEdge::new();
            h
        } else {
            self.halfedges.push(HalfEdge::new());
            HalfEdgeId::new(self.halfedges.len() - 1)
        }
    }

    /// Allocate a face anchored at `halfedge`.
    pub fn alloc_face(&mut self, halfedge: HalfEdgeId) -> FaceId {
        self.num_faces += 1;
        if let Some(f) = self.free_faces.pop() {
            self.faces[f.index()] = Face::new(halfedge);
            f
        } else {
            self.faces.push(Face::new(halfedge));
            FaceId::new(self.faces.len() - 1)
        }
    }

    /// Mark a vertex for removal. A second call on the same vertex is a no-op.
    pub fn defer_free_vertex(&mut self, v: VertexId) {
        let vertex = &mut self.vertices[v.index()];
        if !vertex.alive || vertex.pending_removal {
            return;
        }
        vertex.pending_removal = true;
        self.pending_vertices.push(v);
        self.num_vertices -= 1;
    }

    /// Mark a half-edge for removal. Idempotent.
    pub fn defer_free_halfedge(&mut self, h: HalfEdgeId) {
        let he = &mut self.halfedges[h.index()];
        if !he.alive || he.pending_removal {
            return;
        }
        he.pending_removal = true;
        self.pending_halfedges.push(h);
        self.num_halfedges -= 1;
    }

    /// Mark a face for removal. Idempotent.
    pub fn defer_free_face(&mut self, f: FaceId) {
        let face = &mut self.faces[f.index()];
        if !face.alive || face.pending_removal {
            return;
        }
        face.pending_removal = true;
        self.pending_faces.push(f);
        self.num_faces -= 1;
    }

    /// Reclaim every slot marked by the `defer_free_*` calls since the last
    /// collection.
    pub fn collect_garbage(&mut self) {
        for v in self.pending_vertices.drain(..) {
            let vertex = &mut self.vertices[v.index()];
            vertex.alive = false;
            vertex.pending_removal = false;
            self.free_vertices.push(v);
        }
        for h in self.pending_halfedges.drain(..) {
            let he = &mut self.halfedges[h.index()];
            he.alive = false;
            he.pending_removal = false;
            self.free_halfedges.push(h);
        }
        for f in self.pending_faces.drain(..) {
            let face = &mut self.faces[f.index()];
            face.alive = false;
            face.pending_removal = false;
            self.free_faces.push(f);
        }
    }

    // ---- topology operations ----

    /// Flip the edge carried by an interior half-edge.
    ///
    /// Returns false, leaving the mesh untouched, when the half-edge lies on
    /// a boundary or the flip would duplicate an existing edge. On success
    /// both adjacent triangles keep their 3-cycle invariant and vertex/face
    /// counts are unchanged.
    pub fn flip(&mut self, h: HalfEdgeId) -> bool {
        let o = self.halfedges[h.index()].opposite;
        if !o.is_valid() {
            return false;
        }

        let hn = self.halfedges[h.index()].next;
        let hp = self.halfedges[h.index()].prev;
        let on = self.halfedges[o.index()].next;
        let op = self.halfedges[o.index()].prev;

        let a = self.halfedges[h.index()].start_vertex;
        let b = self.halfedges[o.index()].start_vertex;
        let c = self.halfedges[hp.index()].start_vertex;
        let d = self.halfedges[op.index()].start_vertex;

        // The new diagonal must not already exist.
        if self.vertices_connected(c, d) {
            return false;
        }

        let f1 = self.halfedges[h.index()].left_face;
        let f2 = self.halfedges[o.index()].left_face;

        // f1 becomes (d, c, a): h runs d->c, then hp (c->a), then on (a->d).
        self.halfedges[h.index()].start_vertex = d;
        self.halfedges[h.index()].next = hp;
        self.halfedges[h.index()].prev = on;
        self.halfedges[hp.index()].next = on;
        self.halfedges[hp.index()].prev = h;
        self.halfedges[on.index()].next = h;
        self.halfedges[on.index()].prev = hp;
        self.halfedges[on.index()].left_face = f1;

        // f2 becomes (c, d, b): o runs c->d, then op (d->b), then hn (b->c).
        self.halfedges[o.index()].start_vertex = c;
        self.halfedges[o.index()].next = op;
        self.halfedges[o.index()].prev = hn;
        self.halfedges[op.index()].next = hn;
        self.halfedges[op.index()].prev = o;
        self.halfedges[hn.index()].next = o;
        self.halfedges[hn.index()].prev = op;
        self.halfedges[hn.index()].left_face = f2;

        self.faces[f1.index()].halfedge = h;
        self.faces[f2.index()].halfedge = o;

        // a and b each lost an outgoing half-edge; re-anchor if needed.
        if self.vertices[a.index()].halfedge == h {
            self.vertices[a.index()].halfedge = on;
        }
        if self.vertices[b.index()].halfedge == o {
            self.vertices[b.index()].halfedge = hn;
        }
        self.vertices[a.index()].halfedge_count -= 1;
        self.vertices[b.index()].halfedge_count -= 1;
        self.vertices[c.index()].halfedge_count += 1;
        self.vertices[d.index()].halfedge_count += 1;
        if self.vertices[c.index()].halfedge == HalfEdgeId::invalid() {
            self.vertices[c.index()].halfedge = o;
        }
        if self.vertices[d.index()].halfedge == HalfEdgeId::invalid() {
            self.vertices[d.index()].halfedge = h;
        }

        true
    }

    /// Whether every live half-edge has an opposite.
    pub fn is_watertight(&self) -> bool {
        self.halfedge_ids()
            .all(|h| self.halfedges[h.index()].opposite.is_valid())
    }

    // ---- geometry ----

    /// Recompute face normals, vertex normals and averaged vertex normals.
    ///
    /// Vertex normals are the normalized sum of incident face normals; the
    /// averaged normal additionally folds in the normals of edge-connected
    /// neighbor vertices.
    pub fn update_normals(&mut self) {
        for v in 0..self.vertices.len() {
            if self.vertices[v].alive {
                self.vertices[v].normal = Vector3::zeros();
            }
        }
        for f in self.face_ids().collect::<Vec<_>>() {
            let [v0, v1, v2] = self.face_triangle(f);
            let normal = geom::triangle_normal(
                &self.vertices[v0.index()].position,
                &self.vertices[v1.index()].position,
                &self.vertices[v2.index()].position,
            );
            self.faces[f.index()].normal = normal;
            for v in [v0, v1, v2] {
                self.vertices[v.index()].normal += normal;
            }
        }
        for v in self.vertex_ids().collect::<Vec<_>>() {
            let n = self.vertices[v.index()].normal;
            let len = n.norm();
            if !geom::is_zero(len) {
                self.vertices[v.index()].normal = n / len;
            }
        }

        // One smoothing round over edge neighbors for the averaged normal.
        let mut averaged: Vec<Vector3<f64>> = self.vertices.iter().map(|v| v.normal).collect();
        for h in self.halfedge_ids().collect::<Vec<_>>() {
            let a = self.halfedges[h.index()].start_vertex;
            let b = self.dest_vertex(h);
            let nb = self.vertices[b.index()].normal;
            averaged[a.index()] += nb;
        }
        for v in self.vertex_ids().collect::<Vec<_>>() {
            let n = averaged[v.index()];
            let len = n.norm();
            self.vertices[v.index()].averaged_normal =
                if geom::is_zero(len) { n } else { n / len };
        }
    }

    /// Live vertex IDs sorted by ascending flatness deviation.
    ///
    /// The per-vertex scalar is the mean deviation of incident face normals
    /// from the vertex normal, so flat regions sort first. Normals are
    /// refreshed before measuring.
    pub fn vertices_ordered_by_flatness(&mut self) -> Vec<VertexId> {
        self.update_normals();

        let mut deviation = vec![0.0f64; self.vertices.len()];
        let mut incident = vec![0usize; self.vertices.len()];
        for f in self.face_ids().collect::<Vec<_>>() {
            let normal = self.faces[f.index()].normal;
            for v in self.face_triangle(f) {
                let vn = self.vertices[v.index()].normal;
                deviation[v.index()] += 1.0 - normal.dot(&vn);
                incident[v.index()] += 1;
            }
        }

        let mut order: Vec<VertexId> = self.vertex_ids().collect();
        order.sort_by(|&a, &b| {
            let da = deviation[a.index()] / incident[a.index()].max(1) as f64;
            let db = deviation[b.index()] / incident[b.index()].max(1) as f64;
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.index().cmp(&b.index()))
        });
        order
    }

    /// Sum of live face areas.
    pub fn surface_area(&self) -> f64 {
        let mut total = 0.0;
        for f in self.face_ids() {
            let [v0, v1, v2] = self.face_triangle(f);
            total += 0.5
                * geom::triangle_double_area(
                    &self.vertices[v0.index()].position,
                    &self.vertices[v1.index()].position,
                    &self.vertices[v2.index()].position,
                );
        }
        total
    }

    /// Mean length of live edges, counting each undirected edge once.
    pub fn average_edge_length(&self) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;
        for h in self.halfedge_ids() {
            let a = self.halfedges[h.index()].start_vertex;
            let b = self.dest_vertex(h);
            if a.index() < b.index() || !self.halfedges[h.index()].opposite.is_valid() {
                total +=
                    (self.vertices[a.index()].position - self.vertices[b.index()].position).norm();
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    // ---- cleanup passes ----

    /// Flip away triangles with a near-zero corner angle.
    ///
    /// The half-edge opposite the degenerate corner carries the triangle's
    /// longest edge; flipping it redistributes the sliver across the
    /// neighboring triangle. Returns the number of flips applied.
    pub fn remove_zero_angle_triangles(&mut self) -> usize {
        const MAX_ROUNDS: usize = 10;
        let mut total_flips = 0;
        for _ in 0..MAX_ROUNDS {
            let mut flipped = 0;
            for f in self.face_ids().collect::<Vec<_>>() {
                if !self.is_face_alive(f) {
                    continue;
                }
                if let Some(h) = self.find_zero_angle_halfedge(f) {
                    if self.flip(h) {
                        flipped += 1;
                    }
                }
            }
            total_flips += flipped;
            if flipped == 0 {
                break;
            }
        }
        total_flips
    }

    /// The half-edge facing a near-zero corner of `f`, if any.
    fn find_zero_angle_halfedge(&self, f: FaceId) -> Option<HalfEdgeId> {
        let halfedges = self.face_halfedges(f);
        let positions: Vec<Point3<f64>> = halfedges
            .iter()
            .map(|&h| self.vertices[self.halfedges[h.index()].start_vertex.index()].position)
            .collect();
        for corner in 0..3 {
            let p = positions[corner];
            let e1 = positions[(corner + 1) % 3] - p;
            let e2 = positions[(corner + 2) % 3] - p;
            let denom = e1.norm() * e2.norm();
            if geom::is_zero(denom) {
                continue;
            }
            let sin = e1.cross(&e2).norm() / denom;
            let cos = e1.dot(&e2) / denom;
            if sin < 1e-4 && cos > 0.0 {
                // The edge facing this corner is the one not touching it.
                return Some(halfedges[(corner + 1) % 3]);
            }
        }
        None
    }

    /// Defer-free vertices with no outgoing half-edges, then collect.
    ///
    /// Returns the number of vertices removed.
    pub fn prune_isolated_vertices(&mut self) -> usize {
        let isolated: Vec<VertexId> = self
            .vertex_ids()
            .filter(|&v| self.vertices[v.index()].halfedge_count == 0)
            .collect();
        let count = isolated.len();
        for v in isolated {
            self.defer_free_vertex(v);
        }
        self.collect_garbage();
        count
    }

    // ---- validation ----

    /// Check structural invariants. Used by tests and debug assertions.
    pub fn is_valid(&self) -> bool {
        for h in self.halfedge_ids() {
            let he = &self.halfedges[h.index()];
            if self.halfedges[he.next.index()].prev != h {
                return false;
            }
            if self.halfedges[he.prev.index()].next != h {
                return false;
            }
            if he.opposite.is_valid() && self.halfedges[he.opposite.index()].opposite != h {
                return false;
            }
            if !self.is_face_alive(he.left_face) {
                return false;
            }
        }
        for f in self.face_ids() {
            // Triangle closure.
            let h0 = self.faces[f.index()].halfedge;
            let h1 = self.halfedges[h0.index()].next;
            let h2 = self.halfedges[h1.index()].next;
            if self.halfedges[h2.index()].next != h0 {
                return false;
            }
        }
        for v in self.vertex_ids() {
            let count = self
                .halfedge_ids()
                .filter(|&h| self.halfedges[h.index()].start_vertex == v)
                .count();
            if count != self.vertices[v.index()].halfedge_count {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::builder::build_from_triangles;
    use super::*;
    use approx::assert_relative_eq;

    fn tetrahedron() -> Mesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_tetrahedron_counts() {
        let mesh = tetrahedron();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.num_halfedges(), 12);
        assert!(mesh.is_valid());
        assert!(mesh.is_watertight());
        assert_eq!(mesh.alone_half_edges(), 0);
        assert_eq!(mesh.repeated_half_edges(), 0);
    }

    #[test]
    fn test_flip_preserves_counts() {
        let mut mesh = tetrahedron();
        let h = mesh.halfedge_ids().next().unwrap();
        // Tetrahedron edges cannot flip: every candidate diagonal already
        // exists. Use two triangles sharing an edge instead.
        assert!(!mesh.flip(h));

        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let mut mesh = build_from_triangles(&vertices, &faces).unwrap();
        let diagonal = mesh
            .halfedge_ids()
            .find(|&h| {
                let a = mesh.halfedge(h).start_vertex.index();
                let b = mesh.dest_vertex(h).index();
                (a == 0 && b == 2) || (a == 2 && b == 0)
            })
            .unwrap();

        let (nv, nf, nh) = (mesh.num_vertices(), mesh.num_faces(), mesh.num_halfedges());
        assert!(mesh.flip(diagonal));
        assert_eq!(mesh.num_vertices(), nv);
        assert_eq!(mesh.num_faces(), nf);
        assert_eq!(mesh.num_halfedges(), nh);
        assert!(mesh.is_valid());
        // The diagonal now connects 1 and 3.
        assert!(mesh.vertices_connected(VertexId::new(1), VertexId::new(3)));
        assert!(!mesh.vertices_connected(VertexId::new(0), VertexId::new(2)));
    }

    #[test]
    fn test_flip_rejects_boundary() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2]];
        let mut mesh = build_from_triangles(&vertices, &faces).unwrap();
        for h in mesh.halfedge_ids().collect::<Vec<_>>() {
            assert!(!mesh.flip(h));
        }
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_vertices_connected_across_boundary_fan() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        // Vertex 0's fan is open; 3 is reachable only through its second
        // face, and only as an incoming half-edge.
        assert!(mesh.vertices_connected(VertexId::new(0), VertexId::new(3)));
        assert!(mesh.vertices_connected(VertexId::new(0), VertexId::new(1)));
        assert!(mesh.vertices_connected(VertexId::new(0), VertexId::new(2)));
        assert!(mesh.vertices_connected(VertexId::new(3), VertexId::new(0)));
        assert!(!mesh.vertices_connected(VertexId::new(1), VertexId::new(3)));
    }

    #[test]
    fn test_corner_uvs_round_trip_in_face_order() {
        let mut mesh = tetrahedron();
        let uvs: Vec<[Point2<f64>; 3]> = (0..4)
            .map(|f| {
                let base = f as f64 * 10.0;
                [
                    Point2::new(base, 0.0),
                    Point2::new(base + 1.0, 0.0),
                    Point2::new(base, 1.0),
                ]
            })
            .collect();
        mesh.set_corner_uvs(&uvs);
        assert_eq!(mesh.corner_uvs(), uvs);
    }

    #[test]
    fn test_deferred_free_idempotent() {
        let mut mesh = tetrahedron();
        let v = mesh.vertex_ids().next().unwrap();
        mesh.defer_free_vertex(v);
        mesh.defer_free_vertex(v);
        assert_eq!(mesh.num_vertices(), 3);
        mesh.collect_garbage();
        assert_eq!(mesh.num_vertices(), 3);
        assert!(!mesh.vertex(v).alive);
    }

    #[test]
    fn test_freed_slot_reused() {
        let mut mesh = tetrahedron();
        let v = mesh.vertex_ids().next().unwrap();
        mesh.defer_free_vertex(v);
        mesh.collect_garbage();
        let reused = mesh.alloc_vertex(Point3::new(9.0, 9.0, 9.0), 99);
        assert_eq!(reused, v);
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.vertex(reused).source_index, 99);
    }

    #[test]
    fn test_normals_tetrahedron_outward() {
        let mut mesh = tetrahedron();
        mesh.update_normals();
        // Bottom face normal points down.
        let bottom = FaceId::new(0);
        assert!(mesh.face(bottom).normal.z < -0.99);
        // All vertex normals are unit length.
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            assert_relative_eq!(mesh.vertex(v).normal.norm(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(mesh.vertex(v).averaged_normal.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_flatness_ordering_prefers_plane_interior() {
        // A 3x3 grid patch: the center vertex is perfectly flat, the corner
        // vertices see only coplanar faces too, so all deviations are ~0; a
        // pyramid apex added off-plane must sort last.
        let mut vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ];
        let mut faces = vec![[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]];
        // Apex above vertex 4.
        vertices.push(Point3::new(1.0, 0.5, 0.8));
        faces.push([1, 6, 4]);

        let mut mesh = build_from_triangles(&vertices, &faces).unwrap();
        let order = mesh.vertices_ordered_by_flatness();
        assert_eq!(order.len(), 7);
        let last = order.last().unwrap();
        // The most curved vertices are those touching the apex face.
        assert!([1usize, 4, 6].contains(&last.index()));
    }

    #[test]
    fn test_surface_area_unit_square() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_relative_eq!(mesh.surface_area(), 1.0, epsilon = 1e-12);
        assert!(!mesh.is_watertight());
        assert_eq!(mesh.alone_half_edges(), 4);
    }
}
