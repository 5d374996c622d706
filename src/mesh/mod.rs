//! Core mesh data structures.
//!
//! This module provides the half-edge mesh representation used by the
//! remeshing pipeline, together with its construction and export helpers.
//!
//! # Overview
//!
//! The primary type is [`Mesh`], a triangle mesh stored as a half-edge
//! (doubly-connected edge list) structure with O(1) adjacency queries and
//! deferred deletion for safe topological surgery.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`HalfEdgeId`] - Identifies a half-edge
//! - [`FaceId`] - Identifies a face
//!
//! # Construction
//!
//! Meshes are built from face-vertex lists:
//!
//! ```
//! use requad::mesh::build_from_triangles;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh = build_from_triangles(&vertices, &faces).unwrap();
//! ```

mod builder;
mod halfedge;
mod index;

pub use builder::{build_from_triangles, to_face_vertex};
pub use halfedge::{Face, HalfEdge, Mesh, Vertex};
pub use index::{FaceId, HalfEdgeId, VertexId};
