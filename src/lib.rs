//! # Requad
//!
//! Automatic quad-dominant remeshing for triangle meshes.
//!
//! Requad takes an arbitrary triangulated surface and produces a mesh made
//! predominantly of quadrilaterals that approximates the input geometry,
//! honoring a target vertex budget and sharp features.
//!
//! ## Pipeline
//!
//! - **Half-edge mesh**: arena-backed connectivity with type-safe indices
//!   and deferred deletion
//! - **Quad extraction**: integer iso-lines of a per-corner UV field traced
//!   into a cross-point graph, simplified, and walked into quads
//! - **Driver**: normalization, island splitting, target-edge derivation,
//!   per-island remeshing and deterministic merging
//!
//! The isotropic remesher and the UV parameterizer are pluggable
//! collaborators; built-in implementations cover the common cases and a
//! cross-field solver can be swapped in through the same traits.
//!
//! ## Quick Start
//!
//! ```no_run
//! use requad::prelude::*;
//! # let (vertices, triangles) = (vec![], vec![]);
//!
//! let mut remesher = AutoRemesher::new(vertices, triangles)
//!     .with_options(RemeshOptions::default().with_target_vertex_count(5000));
//! remesher.remesh()?;
//!
//! println!("Vertices: {}", remesher.remeshed_vertices().len());
//! println!("Polygons: {}", remesher.remeshed_quads().len());
//! # Ok::<(), RemeshError>(())
//! ```
//!
//! ## Working with the Half-Edge Mesh
//!
//! ```
//! use requad::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces = vec![
//!     [0, 2, 1], // bottom
//!     [0, 1, 3], // front
//!     [1, 2, 3], // right
//!     [2, 0, 3], // left
//! ];
//!
//! let mesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_faces(), 4);
//! assert!(mesh.is_watertight());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod extract;
pub mod geom;
pub mod height;
pub mod islands;
pub mod mesh;
pub mod remesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use requad::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{RemeshError, Result};
    pub use crate::extract::QuadExtractor;
    pub use crate::mesh::{
        build_from_triangles, to_face_vertex, Face, FaceId, HalfEdge, HalfEdgeId, Mesh, Vertex,
        VertexId,
    };
    pub use crate::remesh::{AutoRemesher, RemeshOptions};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
