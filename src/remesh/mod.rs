//! Top-level remeshing driver.
//!
//! [`AutoRemesher`] orchestrates the whole pipeline: it normalizes the input
//! into a unit-scale frame, splits it into edge-connected islands, derives a
//! target edge length from the vertex budget, and runs each island through
//! isotropic remeshing, per-corner parameterization and quad extraction
//! before denormalizing and concatenating the results.
//!
//! The isotropic remesher and the parameterizer are collaborators behind
//! traits: [`DefaultIsotropicRemesher`] and [`PlanarParameterizer`] are the
//! built-in implementations, and a cross-field solver can be plugged in
//! through [`CornerParameterizer`] without touching the driver.
//!
//! Failure is all-or-nothing: if any island fails, the run returns that
//! island's error and no partial output is kept.

mod isotropic;

pub use isotropic::DefaultIsotropicRemesher;

use std::collections::{HashMap, HashSet};

use nalgebra::{Point2, Point3};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{RemeshError, Result};
use crate::extract::QuadExtractor;
use crate::geom;
use crate::height::{self, SurfaceKind};
use crate::islands;
use crate::mesh::{build_from_triangles, to_face_vertex};

/// Extra vertex density applied to bumpy surfaces, as a divisor on the
/// target edge length (doubles the area budget).
const BUMPY_EDGE_DIVISOR: f64 = std::f64::consts::SQRT_2;

/// Isotropic remeshing collaborator.
///
/// Consumes a triangle mesh, a target edge length, a sharp-edge dihedral
/// threshold in degrees and an optional set of vertices that must keep their
/// positions; produces a remeshed vertex/triangle soup, or `None` when the
/// surface cannot be remeshed.
pub trait IsotropicRemesher {
    /// Remesh the surface toward a uniform target edge length.
    fn remesh(
        &self,
        vertices: &[Point3<f64>],
        triangles: &[[usize; 3]],
        target_edge_length: f64,
        sharp_edge_degrees: f64,
        constrained_vertices: Option<&HashSet<usize>>,
    ) -> Option<(Vec<Point3<f64>>, Vec<[usize; 3]>)>;
}

/// Per-corner parameterization collaborator.
///
/// Produces one 2D coordinate per triangle corner, parallel to `triangles`.
/// `gradient_size` is the world-space spacing between integer iso-lines of
/// the returned coordinates; the quad extractor turns those iso-lines into
/// quad edges.
pub trait CornerParameterizer {
    /// Compute one UV coordinate per triangle corner.
    fn parameterize(
        &self,
        vertices: &[Point3<f64>],
        triangles: &[[usize; 3]],
        gradient_size: f64,
    ) -> Option<Vec<[Point2<f64>; 3]>>;
}

/// Projects each triangle onto the axis plane most aligned with its normal.
///
/// The projection is chosen per face, so closed and boxy geometry works
/// without a global flattening step: coincident projections on the shared
/// edge between two faces merge during extraction. Smoothly curved surfaces
/// are better served by a cross-field parameterizer plugged in through
/// [`CornerParameterizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarParameterizer;

impl CornerParameterizer for PlanarParameterizer {
    fn parameterize(
        &self,
        vertices: &[Point3<f64>],
        triangles: &[[usize; 3]],
        gradient_size: f64,
    ) -> Option<Vec<[Point2<f64>; 3]>> {
        if gradient_size <= 0.0 || triangles.is_empty() {
            return None;
        }
        let mut any_area = false;
        let mut uvs = Vec::with_capacity(triangles.len());
        for t in triangles {
            let normal = geom::triangle_normal(&vertices[t[0]], &vertices[t[1]], &vertices[t[2]]);
            if !geom::is_zero(normal.norm()) {
                any_area = true;
            }
            let mut dominant = 0;
            if normal.y.abs() > normal[dominant].abs() {
                dominant = 1;
            }
            if normal.z.abs() > normal[dominant].abs() {
                dominant = 2;
            }
            let axes = match dominant {
                0 => [1, 2],
                1 => [0, 2],
                _ => [0, 1],
            };
            uvs.push(t.map(|v| {
                Point2::new(
                    vertices[v][axes[0]] / gradient_size,
                    vertices[v][axes[1]] / gradient_size,
                )
            }));
        }
        if !any_area {
            return None;
        }
        Some(uvs)
    }
}

/// Options for the remeshing driver.
#[derive(Debug, Clone)]
pub struct RemeshOptions {
    /// Target number of output vertices.
    pub target_vertex_count: usize,

    /// Cap on cross-field singularities; together with
    /// `vertices_per_singularity` it bounds the effective vertex budget.
    pub max_singularity_count: usize,

    /// Vertices budgeted per singularity.
    pub vertices_per_singularity: usize,

    /// Dihedral angle in degrees above which an edge counts as sharp.
    pub sharp_edge_degrees: f64,

    /// Iso-line spacing in multiples of the target edge length.
    pub gradient_size: f64,

    /// Whether to densify bumpy surfaces (relative-height classification).
    pub adaptive_density: bool,

    /// Whether to process islands in parallel.
    pub parallel: bool,
}

impl Default for RemeshOptions {
    fn default() -> Self {
        Self {
            target_vertex_count: 10_000,
            max_singularity_count: 300,
            vertices_per_singularity: 100,
            sharp_edge_degrees: 60.0,
            gradient_size: 1.0,
            adaptive_density: true,
            parallel: false,
        }
    }
}

impl RemeshOptions {
    /// Set the target output vertex count.
    pub fn with_target_vertex_count(mut self, count: usize) -> Self {
        self.target_vertex_count = count;
        self
    }

    /// Set the singularity cap.
    pub fn with_max_singularity_count(mut self, count: usize) -> Self {
        self.max_singularity_count = count;
        self
    }

    /// Set the vertex budget per singularity.
    pub fn with_vertices_per_singularity(mut self, count: usize) -> Self {
        self.vertices_per_singularity = count;
        self
    }

    /// Set the sharp-edge dihedral threshold in degrees.
    pub fn with_sharp_edge_degrees(mut self, degrees: f64) -> Self {
        self.sharp_edge_degrees = degrees;
        self
    }

    /// Set the iso-line spacing in target-edge multiples.
    pub fn with_gradient_size(mut self, gradient_size: f64) -> Self {
        self.gradient_size = gradient_size;
        self
    }

    /// Enable or disable the bumpy-surface density bias.
    pub fn with_adaptive_density(mut self, adaptive: bool) -> Self {
        self.adaptive_density = adaptive;
        self
    }

    /// Enable or disable parallel island processing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.target_vertex_count == 0 {
            return Err(RemeshError::invalid_param(
                "target_vertex_count",
                self.target_vertex_count,
                "must be positive",
            ));
        }
        if self.max_singularity_count == 0 {
            return Err(RemeshError::invalid_param(
                "max_singularity_count",
                self.max_singularity_count,
                "must be positive",
            ));
        }
        if self.vertices_per_singularity == 0 {
            return Err(RemeshError::invalid_param(
                "vertices_per_singularity",
                self.vertices_per_singularity,
                "must be positive",
            ));
        }
        if !(self.sharp_edge_degrees > 0.0 && self.sharp_edge_degrees < 180.0) {
            return Err(RemeshError::invalid_param(
                "sharp_edge_degrees",
                self.sharp_edge_degrees,
                "must be in (0, 180)",
            ));
        }
        if !(self.gradient_size > 0.0) {
            return Err(RemeshError::invalid_param(
                "gradient_size",
                self.gradient_size,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Normalization frame for a vertex set: bounding-box midpoint and half the
/// largest extent.
///
/// `normalize(v) = (v - origin) / max_length` maps the input into roughly
/// [-1, 1]; `denormalize` is its exact inverse.
pub fn calculate_normalized_factors(vertices: &[Point3<f64>]) -> (Point3<f64>, f64) {
    if vertices.is_empty() {
        return (Point3::origin(), 1.0);
    }
    let mut min = vertices[0];
    let mut max = vertices[0];
    for v in vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    let origin = Point3::from((min.coords + max.coords) * 0.5);
    let half_extent = (max - min) * 0.5;
    let max_length = half_extent.x.max(half_extent.y).max(half_extent.z);
    if geom::is_zero(max_length) {
        (origin, 1.0)
    } else {
        (origin, max_length)
    }
}

/// Quad-dominant remeshing pipeline over a triangle mesh.
///
/// # Example
///
/// ```no_run
/// use requad::remesh::{AutoRemesher, RemeshOptions};
/// # let (vertices, triangles) = (vec![], vec![]);
///
/// let mut remesher = AutoRemesher::new(vertices, triangles)
///     .with_options(RemeshOptions::default().with_target_vertex_count(5000));
/// remesher.remesh()?;
/// let quads = remesher.remeshed_quads();
/// # Ok::<(), requad::error::RemeshError>(())
/// ```
pub struct AutoRemesher {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    options: RemeshOptions,

    remeshed_vertices: Vec<Point3<f64>>,
    remeshed_quads: Vec<Vec<usize>>,
}

impl AutoRemesher {
    /// Create a driver over the given triangle mesh with default options.
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            options: RemeshOptions::default(),
            remeshed_vertices: Vec::new(),
            remeshed_quads: Vec::new(),
        }
    }

    /// Replace the driver options.
    pub fn with_options(mut self, options: RemeshOptions) -> Self {
        self.options = options;
        self
    }

    /// Final vertex positions, in the input coordinate frame.
    pub fn remeshed_vertices(&self) -> &[Point3<f64>] {
        &self.remeshed_vertices
    }

    /// Final polygons (predominantly quads) over [`Self::remeshed_vertices`].
    pub fn remeshed_quads(&self) -> &[Vec<usize>] {
        &self.remeshed_quads
    }

    /// Run the pipeline with the built-in collaborators.
    pub fn remesh(&mut self) -> Result<()> {
        self.remesh_with(&DefaultIsotropicRemesher::default(), &PlanarParameterizer)
    }

    /// Run the pipeline with explicit collaborators.
    ///
    /// Islands are processed independently (in parallel when the options ask
    /// for it) and merged in split order, so output ordering is
    /// deterministic. Any island failure aborts the whole run and leaves the
    /// output empty.
    pub fn remesh_with<R, P>(&mut self, remesher: &R, parameterizer: &P) -> Result<()>
    where
        R: IsotropicRemesher + Sync,
        P: CornerParameterizer + Sync,
    {
        self.remeshed_vertices.clear();
        self.remeshed_quads.clear();
        self.options.validate()?;
        if self.triangles.is_empty() {
            return Err(RemeshError::EmptyMesh);
        }
        for (face, triangle) in self.triangles.iter().enumerate() {
            for &vertex in triangle {
                if vertex >= self.vertices.len() {
                    return Err(RemeshError::InvalidVertexIndex { face, vertex });
                }
            }
        }

        let (origin, max_length) = calculate_normalized_factors(&self.vertices);
        let normalized: Vec<Point3<f64>> = self
            .vertices
            .iter()
            .map(|v| Point3::from((v - origin) / max_length))
            .collect();

        let islands = islands::split_to_islands(&self.triangles);
        let total_area: f64 = self
            .triangles
            .iter()
            .map(|t| {
                0.5 * geom::triangle_double_area(
                    &normalized[t[0]],
                    &normalized[t[1]],
                    &normalized[t[2]],
                )
            })
            .sum();
        let target_edge = derive_target_edge(total_area, &self.options)?;
        info!(
            islands = islands.len(),
            target_edge, "starting quad remesh"
        );

        let inputs: Vec<(Vec<Point3<f64>>, Vec<[usize; 3]>)> = islands
            .iter()
            .map(|island| pick_island(&normalized, &self.triangles, island))
            .collect();

        let options = &self.options;
        let process = |(index, (vertices, triangles)): (
            usize,
            &(Vec<Point3<f64>>, Vec<[usize; 3]>),
        )| {
            process_island(
                index,
                vertices,
                triangles,
                target_edge,
                options,
                remesher,
                parameterizer,
            )
        };
        let results: Vec<(Vec<Point3<f64>>, Vec<Vec<usize>>)> = if self.options.parallel {
            inputs
                .par_iter()
                .enumerate()
                .map(process)
                .collect::<Result<Vec<_>>>()?
        } else {
            inputs
                .iter()
                .enumerate()
                .map(process)
                .collect::<Result<Vec<_>>>()?
        };

        // Merge in split order with denormalized coordinates.
        for (vertices, polygons) in results {
            let base = self.remeshed_vertices.len();
            self.remeshed_vertices.extend(
                vertices
                    .iter()
                    .map(|v| Point3::from(v.coords * max_length + origin.coords)),
            );
            self.remeshed_quads.extend(
                polygons
                    .into_iter()
                    .map(|p| p.into_iter().map(|v| v + base).collect::<Vec<_>>()),
            );
        }
        info!(
            vertices = self.remeshed_vertices.len(),
            polygons = self.remeshed_quads.len(),
            "quad remesh finished"
        );
        Ok(())
    }
}

/// Area-budget target edge length: `sqrt(area / effective_vertex_count)`,
/// with the budget capped by the singularity allowance.
fn derive_target_edge(surface_area: f64, options: &RemeshOptions) -> Result<f64> {
    if !(surface_area > 0.0) {
        return Err(RemeshError::InvalidState(
            "input surface has no area".to_string(),
        ));
    }
    let singularity_budget = options
        .max_singularity_count
        .saturating_mul(options.vertices_per_singularity);
    let effective = options.target_vertex_count.min(singularity_budget);
    Ok((surface_area / effective as f64).sqrt())
}

/// Extract one island's vertices and triangles with island-local indices,
/// in first-seen order.
fn pick_island(
    vertices: &[Point3<f64>],
    triangles: &[[usize; 3]],
    island: &[usize],
) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut old_to_new: HashMap<usize, usize> = HashMap::new();
    let mut picked_vertices = Vec::new();
    let mut picked_triangles = Vec::with_capacity(island.len());
    for &fi in island {
        let tri = triangles[fi].map(|v| {
            *old_to_new.entry(v).or_insert_with(|| {
                picked_vertices.push(vertices[v]);
                picked_vertices.len() - 1
            })
        });
        picked_triangles.push(tri);
    }
    (picked_vertices, picked_triangles)
}

fn process_island<R, P>(
    island: usize,
    vertices: &[Point3<f64>],
    triangles: &[[usize; 3]],
    target_edge: f64,
    options: &RemeshOptions,
    remesher: &R,
    parameterizer: &P,
) -> Result<(Vec<Point3<f64>>, Vec<Vec<usize>>)>
where
    R: IsotropicRemesher,
    P: CornerParameterizer,
{
    debug!(
        island,
        vertices = vertices.len(),
        triangles = triangles.len(),
        "processing island"
    );

    // Clean degenerate corners out of the input before handing it to the
    // numerically sensitive stages.
    let mut mesh = build_from_triangles(vertices, triangles)?;
    mesh.remove_zero_angle_triangles();
    mesh.collect_garbage();

    let mut island_edge = target_edge;
    if options.adaptive_density {
        height::update_relative_heights(&mut mesh);
        if height::classify_mesh_surface(&mesh) == SurfaceKind::Bumpy {
            island_edge /= BUMPY_EDGE_DIVISOR;
            debug!(island, island_edge, "bumpy surface, densifying");
        }
    }
    let (vertices, triangles) = to_face_vertex(&mut mesh);

    let (remeshed_vertices, remeshed_triangles) = remesher
        .remesh(
            &vertices,
            &triangles,
            island_edge,
            options.sharp_edge_degrees,
            None,
        )
        .ok_or(RemeshError::IsotropicFailed { island })?;

    let mut mesh = build_from_triangles(&remeshed_vertices, &remeshed_triangles)?;
    mesh.remove_zero_angle_triangles();
    mesh.prune_isolated_vertices();
    mesh.collect_garbage();
    mesh.update_normals();
    let (vertices, triangles) = to_face_vertex(&mut mesh);

    let gradient_size = options.gradient_size * island_edge;
    let uvs = parameterizer
        .parameterize(&vertices, &triangles, gradient_size)
        .ok_or_else(|| RemeshError::ParameterizeFailed {
            island,
            message: "no parameterization produced".to_string(),
        })?;
    if uvs.len() != triangles.len() {
        return Err(RemeshError::ParameterizeFailed {
            island,
            message: "per-corner coordinate count does not match triangle count".to_string(),
        });
    }

    // The half edges carry the parameterization from here on; export order
    // and face iteration order agree, so corner coordinates stay parallel to
    // `triangles`.
    mesh.set_corner_uvs(&uvs);
    let corner_uvs = mesh.corner_uvs();

    let mut extractor = QuadExtractor::new(&vertices, &triangles, &corner_uvs);
    if !extractor.extract() {
        return Err(RemeshError::ExtractionFailed { island });
    }
    debug!(
        island,
        polygons = extractor.remeshed_polygons().len(),
        "island finished"
    );
    Ok((
        extractor.remeshed_vertices().to_vec(),
        extractor.remeshed_polygons().to_vec(),
    ))
}
