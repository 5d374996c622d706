//! Small geometric helpers shared across the pipeline.
//!
//! These are plain functions over `nalgebra` points rather than mesh
//! operations; both the extractor and the half-edge mesh use them.

use nalgebra::{Point2, Point3, Vector3};

/// Comparison epsilon for scalar zero tests.
pub const EPSILON: f64 = 1e-8;

/// Whether a scalar is zero within [`EPSILON`].
#[inline]
pub fn is_zero(value: f64) -> bool {
    value.abs() <= EPSILON
}

/// Unit normal of the triangle (a, b, c).
///
/// Returns the zero vector for degenerate triangles.
pub fn triangle_normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if is_zero(len) {
        Vector3::zeros()
    } else {
        n / len
    }
}

/// Twice the area of the triangle (a, b, c).
#[inline]
pub fn triangle_double_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).norm()
}

/// An orthonormal basis spanning the plane perpendicular to `normal`.
///
/// `normal` must be non-zero; it need not be unit length.
pub fn plane_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    // Pick the world axis least aligned with the normal to avoid a
    // near-parallel cross product.
    let axis = if normal.x.abs() <= normal.y.abs() && normal.x.abs() <= normal.z.abs() {
        Vector3::x()
    } else if normal.y.abs() <= normal.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let u = normal.cross(&axis).normalize();
    let v = normal.cross(&u).normalize();
    (u, v)
}

/// Project a 3D point into the 2D frame (`origin`, `u`, `v`).
#[inline]
pub fn project_to_plane(
    p: &Point3<f64>,
    origin: &Point3<f64>,
    u: &Vector3<f64>,
    v: &Vector3<f64>,
) -> Point2<f64> {
    let d = p - origin;
    Point2::new(d.dot(u), d.dot(v))
}

/// Barycentric coordinates of `p` with respect to the 2D triangle (a, b, c).
///
/// Returns `None` when the triangle is degenerate.
pub fn barycentric_coordinates(
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
    p: &Point2<f64>,
) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if is_zero(denom) {
        return None;
    }
    let beta = (d11 * d20 - d01 * d21) / denom;
    let gamma = (d00 * d21 - d01 * d20) / denom;
    Some([1.0 - beta - gamma, beta, gamma])
}

/// Whether the 3D point `p` lies inside the triangle (a, b, c).
///
/// The point is projected into the triangle's plane first; points on an edge
/// or corner count as inside.
pub fn point_in_triangle(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    p: &Point3<f64>,
) -> bool {
    let normal = triangle_normal(a, b, c);
    if is_zero(normal.norm()) {
        return false;
    }
    let (u, v) = plane_basis(&normal);
    let a2 = project_to_plane(a, a, &u, &v);
    let b2 = project_to_plane(b, a, &u, &v);
    let c2 = project_to_plane(c, a, &u, &v);
    let p2 = project_to_plane(p, a, &u, &v);
    match barycentric_coordinates(&a2, &b2, &c2, &p2) {
        Some(bary) => bary.iter().all(|&w| w >= -EPSILON),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_triangle_normal_ccw() {
        let n = triangle_normal(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_normal_is_zero() {
        let n = triangle_normal(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(2.0, 0.0, 0.0),
        );
        assert_eq!(n, Vector3::zeros());
    }

    #[test]
    fn test_barycentric_centroid() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(0.0, 1.0);
        let p = Point2::new(1.0 / 3.0, 1.0 / 3.0);
        let bary = barycentric_coordinates(&a, &b, &c, &p).unwrap();
        for w in bary {
            assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_point_in_triangle_boundary_inclusive() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        let c = Point3::new(0.0, 2.0, 0.0);
        // Edge midpoint counts as inside.
        assert!(point_in_triangle(&a, &b, &c, &Point3::new(1.0, 0.0, 0.0)));
        // Corner counts as inside.
        assert!(point_in_triangle(&a, &b, &c, &a));
        // Clearly outside.
        assert!(!point_in_triangle(&a, &b, &c, &Point3::new(2.0, 2.0, 0.0)));
    }

    #[test]
    fn test_point_in_tilted_triangle() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 1.0);
        let c = Point3::new(0.0, 1.0, 1.0);
        let centroid = Point3::new(1.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0);
        assert!(point_in_triangle(&a, &b, &c, &centroid));
    }
}
