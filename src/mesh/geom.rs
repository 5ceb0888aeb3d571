//! Scalar geometry helpers shared by the mesh and Laplacian layers.
//!
//! These are pure functions over nalgebra points and vectors. Angular
//! measures are taken about an explicit origin (the fitted sphere center)
//! so that searches follow the curvature of the sensor array instead of
//! cutting through it.
//!
//! Degenerate inputs (zero-length vectors, coincident points) follow IEEE
//! semantics and produce `NaN`/`Inf` rather than errors; callers filter or
//! tolerate such values.

use nalgebra::{Point3, Vector3};

/// Angle between two vectors, in radians.
///
/// The cosine is clamped to `[-1, 1]` so rounding near parallel vectors
/// cannot produce `NaN`.
pub fn angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a.dot(b) / (a.norm() * b.norm())).clamp(-1.0, 1.0).acos()
}

/// Interior angle at vertex `a` of the triangle `(a, b, c)`.
pub fn triangle_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    angle(&(b - a), &(c - a))
}

/// Distance from `p` to the segment `a..b`.
///
/// The orthogonal projection is clamped: before `a` the distance to `a`
/// is returned, past `b` the distance to `b`, otherwise the orthogonal
/// distance to the line.
pub fn segment_distance(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let d = b - a;
    let length = d.norm();
    let dir = d / length;
    let dp = p - a;
    let projection = dp.dot(&dir);
    if projection < 0.0 {
        dp.norm()
    } else if projection > length {
        (p - b).norm()
    } else {
        (dp - dir * projection).norm()
    }
}

/// Angle subtended at `origin` between the directions to `p` and `q`.
pub fn angular_distance(p: &Point3<f64>, origin: &Point3<f64>, q: &Point3<f64>) -> f64 {
    angle(&(p - origin), &(q - origin))
}

/// Arc length between `p` and `q` as seen from `origin`, at the mean of
/// the two radii.
pub fn tangential_distance(p: &Point3<f64>, origin: &Point3<f64>, q: &Point3<f64>) -> f64 {
    let tn = p - origin;
    let qn = q - origin;
    angle(&tn, &qn) * (tn.norm() + qn.norm()) / 2.0
}

/// Angular distance from `p` to the great-circle arc `a..b` about `origin`.
///
/// When the projection of `p` onto the plane through `origin`, `a` and `b`
/// falls between the two arc endpoints, this is the orthogonal angular
/// distance to that plane; otherwise it is the smaller of the angular
/// distances to the endpoints. The arc analogue of [`segment_distance`].
pub fn arc_distance_to_edge(
    p: &Point3<f64>,
    origin: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
) -> f64 {
    let tn = (p - origin).normalize();
    let an = (a - origin).normalize();
    let bn = (b - origin).normalize();

    // Normal of the plane spanned by the two endpoint directions; the
    // second in-plane axis completes a frame with `an`.
    let normal = an.cross(&bn).normalize();
    let a_normal = normal.cross(&an);

    let cos_to_plane = tn.dot(&normal);
    let in_plane = (tn - normal * cos_to_plane).normalize();

    let phi = in_plane.dot(&a_normal).atan2(in_plane.dot(&an));
    let arc_span = bn.dot(&a_normal).atan2(bn.dot(&an));

    if phi > 0.0 && phi < arc_span {
        cos_to_plane.asin().abs()
    } else {
        let cos_a = tn.dot(&an);
        let cos_b = tn.dot(&bn);
        cos_a.max(cos_b).clamp(-1.0, 1.0).acos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-10;

    #[test]
    fn test_angle_basics() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let y = Vector3::new(0.0, 2.0, 0.0);
        assert!((angle(&x, &y) - FRAC_PI_2).abs() < EPS);
        assert!(angle(&x, &x).abs() < EPS);
        assert!((angle(&x, &-x) - PI).abs() < EPS);
    }

    #[test]
    fn test_triangle_angle_equilateral() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0);
        assert!((triangle_angle(&a, &b, &c) - PI / 3.0).abs() < EPS);
        assert!((triangle_angle(&b, &c, &a) - PI / 3.0).abs() < EPS);
        assert!((triangle_angle(&c, &a, &b) - PI / 3.0).abs() < EPS);
    }

    #[test]
    fn test_segment_distance_clamps() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);

        // Orthogonal case.
        let p = Point3::new(1.0, 1.0, 0.0);
        assert!((segment_distance(&p, &a, &b) - 1.0).abs() < EPS);

        // Before the start: distance to `a`.
        let p = Point3::new(-3.0, 4.0, 0.0);
        assert!((segment_distance(&p, &a, &b) - 5.0).abs() < EPS);

        // Past the end: distance to `b`.
        let p = Point3::new(5.0, 4.0, 0.0);
        assert!((segment_distance(&p, &a, &b) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_angular_distance_quarter_turn() {
        let origin = Point3::new(0.0, 0.0, 0.0);
        let p = Point3::new(1.0, 0.0, 0.0);
        let q = Point3::new(0.0, 5.0, 0.0);
        assert!((angular_distance(&p, &origin, &q) - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_tangential_distance_scales_with_radius() {
        let origin = Point3::new(0.0, 0.0, 0.0);
        let p = Point3::new(2.0, 0.0, 0.0);
        let q = Point3::new(0.0, 2.0, 0.0);
        // Quarter circle of radius 2.
        assert!((tangential_distance(&p, &origin, &q) - PI).abs() < EPS);
    }

    #[test]
    fn test_arc_distance_inside_span() {
        let origin = Point3::new(0.0, 0.0, 0.0);
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 1.0, 0.0);
        // Lifted out of the arc plane midway between the endpoints.
        let p = Point3::new(1.0, 1.0, 0.5);
        let d = arc_distance_to_edge(&p, &origin, &a, &b);
        let expected = (0.5 / (1.0f64 + 1.0 + 0.25).sqrt()).asin();
        assert!((d - expected).abs() < 1e-9, "got {d}, expected {expected}");
    }

    #[test]
    fn test_arc_distance_outside_span_uses_endpoints() {
        let origin = Point3::new(0.0, 0.0, 0.0);
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 1.0, 0.0);
        // Beyond `b`: nearest endpoint is `b`, a quarter turn short of `p`.
        let p = Point3::new(-1.0, 1.0, 0.0);
        let d = arc_distance_to_edge(&p, &origin, &a, &b);
        assert!((d - PI / 4.0).abs() < EPS);
    }
}
