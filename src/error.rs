//! Error types for requad.
//!
//! This module defines all error types used throughout the library.
//!
//! Small recoverable operations (a single edge flip, a single collapse)
//! report success as `bool` and leave the mesh untouched on failure; the
//! variants here cover pipeline-level failures that abort a remesh run.

use thiserror::Error;

/// Result type alias using [`RemeshError`].
pub type Result<T> = std::result::Result<T, RemeshError>;

/// Errors that can occur during remeshing.
#[derive(Error, Debug)]
pub enum RemeshError {
    /// The input has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices (degenerate triangle).
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// The isotropic remeshing stage failed for an island.
    #[error("isotropic remeshing failed for island {island}")]
    IsotropicFailed {
        /// Index of the island in split order.
        island: usize,
    },

    /// The parameterization stage failed for an island.
    #[error("parameterization failed for island {island}: {message}")]
    ParameterizeFailed {
        /// Index of the island in split order.
        island: usize,
        /// Description of the failure.
        message: String,
    },

    /// Quad extraction produced no valid polygons for an island.
    #[error("quad extraction failed for island {island}")]
    ExtractionFailed {
        /// Index of the island in split order.
        island: usize,
    },

    /// Invalid mesh state for the requested operation.
    #[error("invalid mesh state: {0}")]
    InvalidState(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl RemeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        RemeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
