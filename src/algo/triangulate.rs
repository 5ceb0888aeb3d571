//! Boundary-driven triangulation of a sensor cloud.
//!
//! A [`ConvexMesh`] is built once per sensor layout: a sphere is fitted to
//! the cloud to obtain an angular metric, a seed triangle starts the mesh,
//! and the boundary ring then alternates between two moves until every
//! sensor is absorbed:
//!
//! 1. **Ear clipping** — any reflex boundary vertex whose neighbor chord
//!    is short enough, and whose ear triangle is not too flat, is closed
//!    off with a triangle and removed from the ring;
//! 2. **Boundary growth** — when no ear can be clipped, the still-outside
//!    sensor angularly nearest to a boundary edge midpoint (as seen from
//!    the sphere center) is attached against that edge and spliced into
//!    the ring.
//!
//! A final **revision** pass flips shared edges of adjacent triangle pairs
//! whenever that reduces their combined worst interior angle without
//! folding the surface — a local angle-minimization heuristic, not an
//! exact Delaunay test.
//!
//! Construction is a one-shot, single-threaded batch computation; the
//! resulting mesh is read-only.

use nalgebra::Point3;
use tracing::{debug, warn};

use crate::error::{MeshError, Result};
use crate::mesh::{Boundary, BoundaryId, SensorCloud, SensorId, Triangle, TriangleMesh};

use super::powell;

/// Tunable parameters of mesh construction.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// An ear is only clipped if the squared chord between its boundary
    /// neighbors is at most this multiple of the cloud's typical squared
    /// nearest-neighbor spacing.
    pub chord_factor: f64,

    /// Largest interior angle a new triangle may have, in radians.
    /// Candidates at or above this are considered degenerate and skipped.
    pub max_flat_angle: f64,

    /// Fractional tolerance of the sphere-fit minimization.
    pub sphere_ftol: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chord_factor: 8.0,
            max_flat_angle: std::f64::consts::PI * 0.9,
            sphere_ftol: 1e-4,
        }
    }
}

impl BuildOptions {
    /// Set the chord-length multiple of the ear-clipping gate.
    pub fn with_chord_factor(mut self, chord_factor: f64) -> Self {
        self.chord_factor = chord_factor;
        self
    }

    /// Set the flatness threshold for new triangles.
    pub fn with_max_flat_angle(mut self, max_flat_angle: f64) -> Self {
        self.max_flat_angle = max_flat_angle;
        self
    }

    /// Set the sphere-fit tolerance.
    pub fn with_sphere_ftol(mut self, sphere_ftol: f64) -> Self {
        self.sphere_ftol = sphere_ftol;
        self
    }
}

/// A triangulated sensor cloud.
///
/// Owns the cloud, the triangle mesh over it, the residual boundary ring
/// (the outer rim when the cloud is not fully enclosed), and the fitted
/// sphere used as the angular metric during construction. Immutable after
/// construction.
pub struct ConvexMesh {
    cloud: SensorCloud,
    mesh: TriangleMesh,
    boundary: Boundary,
    center: Point3<f64>,
    radius: f64,
}

impl ConvexMesh {
    /// Triangulate `cloud` with default options.
    pub fn build(cloud: SensorCloud) -> Result<Self> {
        Self::build_with(cloud, &BuildOptions::default())
    }

    /// Triangulate `cloud`.
    ///
    /// Fails with [`MeshError::TooFewSensors`] for fewer than 3 sensors,
    /// before any mesh work begins, and with
    /// [`MeshError::ConstructionStalled`] if a full construction round
    /// neither clips nor attaches while sensors remain outside.
    pub fn build_with(mut cloud: SensorCloud, options: &BuildOptions) -> Result<Self> {
        if cloud.len() < 3 {
            return Err(MeshError::TooFewSensors {
                found: cloud.len(),
                needed: 3,
            });
        }

        let typical_dd = cloud.typical_spacing_sq();
        let (center, radius) = fit_sphere(&cloud, options);

        let seed = seed_triangle(&mut cloud)?;
        let mut mesh = TriangleMesh::new();
        mesh.push(seed);
        let mut boundary = Boundary::from_triangle(&seed);

        // Each round must absorb at least one sensor, so the round count
        // is bounded by the cloud size.
        let max_rounds = cloud.len() + 1;
        let mut rounds = 0;
        loop {
            rounds += 1;
            clip_ears(&cloud, &mut mesh, &mut boundary, typical_dd, options);

            match grow_boundary(&mut cloud, &mut boundary, &center) {
                Some(triangle) => {
                    mesh.push(triangle);
                }
                None => {
                    let outside_remaining = cloud.outside_count();
                    if outside_remaining > 0 {
                        return Err(MeshError::ConstructionStalled { outside_remaining });
                    }
                    break;
                }
            }

            // Every completed round marks one sensor inside, so more
            // rounds than sensors means the clip/grow interplay stopped
            // making progress.
            if rounds > max_rounds {
                return Err(MeshError::ConstructionStalled {
                    outside_remaining: cloud.outside_count(),
                });
            }
        }

        let passes = revise(&cloud, &mut mesh);
        debug!(
            triangles = mesh.len(),
            boundary = boundary.len(),
            revision_passes = passes,
            "mesh construction finished"
        );

        Ok(Self {
            cloud,
            mesh,
            boundary,
            center,
            radius,
        })
    }

    /// The sensor cloud the mesh was built over.
    #[inline]
    pub fn cloud(&self) -> &SensorCloud {
        &self.cloud
    }

    /// The triangles of the mesh.
    #[inline]
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// The residual boundary ring.
    #[inline]
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Center of the fitted sphere.
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    /// Radius of the fitted sphere.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

/// Fit a sphere `(center, radius)` to the cloud by minimizing the sum of
/// squared radial residuals.
///
/// Starts from the centroid and the mean distance to it. If the fitted
/// radius blows up beyond 100x the starting estimate the layout is nearly
/// flat; angular distances about a centre that far away are numerically
/// unreliable, so the centre is nudged 1% of the way toward the fitted
/// position and the radius scaled down by 100 instead of taking the fit.
fn fit_sphere(cloud: &SensorCloud, options: &BuildOptions) -> (Point3<f64>, f64) {
    let centroid = cloud.centroid();
    let start_radius = if cloud.is_empty() {
        0.0
    } else {
        cloud
            .iter()
            .map(|(_, s)| (s.position - centroid).norm())
            .sum::<f64>()
            / cloud.len() as f64
    };

    let start = [centroid.x, centroid.y, centroid.z, start_radius];
    let objective = |p: &[f64]| {
        let c = Point3::new(p[0], p[1], p[2]);
        cloud
            .iter()
            .map(|(_, s)| {
                let residual = (s.position - c).norm() - p[3];
                residual * residual
            })
            .sum()
    };
    let fit = powell::minimize(objective, &start, options.sphere_ftol);

    let fitted_center = Point3::new(fit.point[0], fit.point[1], fit.point[2]);
    let fitted_radius = fit.point[3];
    if start_radius == 0.0 || fitted_radius / start_radius > 100.0 {
        warn!(
            fitted_radius,
            start_radius, "near-flat sensor layout, damping sphere fit"
        );
        (
            centroid + (fitted_center - centroid) / 100.0,
            fitted_radius / 100.0,
        )
    } else {
        (fitted_center, fitted_radius)
    }
}

/// Pop the seed triangle: the first still-outside sensor and its two
/// nearest still-outside neighbors, all marked inside.
fn seed_triangle(cloud: &mut SensorCloud) -> Result<Triangle> {
    let found = cloud.len();
    let too_few = move || MeshError::TooFewSensors { found, needed: 3 };
    let v0 = cloud.first().ok_or_else(too_few)?;
    cloud.mark_inside(v0);
    let anchor = cloud.position(v0);
    let v1 = cloud.nearest_outside(&anchor).ok_or_else(too_few)?;
    cloud.mark_inside(v1);
    let v2 = cloud.nearest_outside(&anchor).ok_or_else(too_few)?;
    cloud.mark_inside(v2);
    Ok(Triangle::new(v0, v1, v2))
}

/// Gate a candidate triangle on flatness. `None` when its largest interior
/// angle is at or above the threshold.
fn check_triangle(
    cloud: &SensorCloud,
    triangle: Triangle,
    options: &BuildOptions,
) -> Option<Triangle> {
    if triangle.max_angle(cloud) > options.max_flat_angle {
        None
    } else {
        Some(triangle)
    }
}

/// Run ear-clipping scans until one full scan clips nothing.
fn clip_ears(
    cloud: &SensorCloud,
    mesh: &mut TriangleMesh,
    boundary: &mut Boundary,
    typical_dd: f64,
    options: &BuildOptions,
) {
    loop {
        let mut clipped_this_pass = false;
        let mut cursor = boundary.first();
        while let Some(at) = boundary.non_convex_vertex(cloud, mesh, cursor) {
            let prev = boundary.point(boundary.ring_previous(at));
            let here = boundary.point(at);
            let next = boundary.point(boundary.ring_next(at));

            let ear = (cloud.distance_sq(prev, next) <= options.chord_factor * typical_dd)
                .then(|| check_triangle(cloud, Triangle::new(next, here, prev), options))
                .flatten();

            match ear {
                Some(triangle) => {
                    mesh.push(triangle);
                    // Capture the resume point before the entry disappears.
                    cursor = boundary.next(at);
                    boundary.remove(at);
                    clipped_this_pass = true;
                }
                None => cursor = boundary.next(at),
            }
        }
        if !clipped_this_pass {
            return;
        }
    }
}

/// Attach the still-outside sensor angularly nearest to a boundary edge
/// midpoint, as seen from the sphere centre. Splices the sensor into the
/// boundary after the edge start and returns the attaching triangle, or
/// `None` when every sensor is already inside.
///
/// Edge midpoints are used instead of distances to the edge segment
/// because the segment distance degenerates to the endpoint distance for
/// points whose projection falls outside the segment, which cannot
/// distinguish the two edges sharing that endpoint.
fn grow_boundary(
    cloud: &mut SensorCloud,
    boundary: &mut Boundary,
    center: &Point3<f64>,
) -> Option<Triangle> {
    let mut best: Option<(BoundaryCandidate, f64)> = None;
    for (entry, v) in boundary.iter() {
        let next = boundary.point(boundary.ring_next(entry));
        let midpoint = Point3::from(
            (cloud.position(v).coords + cloud.position(next).coords) / 2.0,
        );
        if let Some((candidate, dd)) = cloud.angular_nearest_outside(center, &midpoint) {
            match best {
                Some((_, min)) if dd >= min => {}
                _ => {
                    best = Some((
                        BoundaryCandidate {
                            entry,
                            start: v,
                            end: next,
                            sensor: candidate,
                        },
                        dd,
                    ));
                }
            }
        }
    }

    let (found, _) = best?;
    cloud.mark_inside(found.sensor);
    boundary.insert_after(found.entry, found.sensor);
    Some(Triangle::new(found.start, found.sensor, found.end))
}

struct BoundaryCandidate {
    entry: BoundaryId,
    start: SensorId,
    end: SensorId,
    sensor: SensorId,
}

/// Edge-flip revision: repeatedly scan adjacent triangle pairs and flip
/// their shared edge when both replacement triangles keep a consistent
/// orientation and the sum of the pair's largest angles strictly
/// decreases. Returns the number of passes until a fixed point.
fn revise(cloud: &SensorCloud, mesh: &mut TriangleMesh) -> usize {
    let mut passes = 0;
    loop {
        passes += 1;
        let mut flipped = false;
        let mut cursor = mesh.first();
        while let Some(id) = cursor {
            // Canonical order: the edge v0..v1 opposes the largest angle.
            let t1 = mesh.get(id).canonicalized(cloud);
            let t1_angle = t1.max_angle(cloud);

            let mut adjacent = mesh.find_with_edge(mesh.first(), t1.v0, t1.v1);
            if adjacent == Some(id) {
                adjacent = mesh.find_with_edge(mesh.next(id), t1.v0, t1.v1);
            }
            if let Some(adj_id) = adjacent {
                let t2 = mesh.get(adj_id);
                let t2_angle = t2.max_angle(cloud);

                // Align the neighbor against the shared edge. With
                // consistent orientations it traverses the edge in the
                // opposite direction, so `across` is its far vertex.
                let (end, across) = if t2.v0 == t1.v0 {
                    (t2.v2, t2.v1)
                } else if t2.v1 == t1.v0 {
                    (t2.v0, t2.v2)
                } else {
                    (t2.v1, t2.v0)
                };

                let n1 = Triangle::new(t1.v0, across, t1.v2);
                let n2 = Triangle::new(end, t1.v2, across);
                if n1.normal(cloud).dot(&n2.normal(cloud)) > 0.0
                    && n1.max_angle(cloud) + n2.max_angle(cloud) < t1_angle + t2_angle
                {
                    mesh.set(id, n1);
                    mesh.set(adj_id, n2);
                    flipped = true;
                    break;
                }
            }
            cursor = mesh.next(id);
        }
        if !flipped {
            return passes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Four corners of a regular tetrahedron.
    fn tetrahedron_cloud() -> SensorCloud {
        SensorCloud::from_positions(&[
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ])
    }

    /// A flat n x n unit-spaced grid.
    fn grid_cloud(n: usize) -> SensorCloud {
        let mut positions = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                positions.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        SensorCloud::from_positions(&positions)
    }

    /// Sensors on the upper half of a unit sphere, cap-like.
    fn cap_cloud(rings: usize, per_ring: usize) -> SensorCloud {
        let mut positions = vec![Point3::new(0.0, 0.0, 1.0)];
        for r in 1..=rings {
            let polar = r as f64 / rings as f64 * std::f64::consts::FRAC_PI_2;
            for k in 0..per_ring {
                let azimuth = k as f64 / per_ring as f64 * std::f64::consts::TAU
                    + r as f64 * 0.2;
                positions.push(Point3::new(
                    polar.sin() * azimuth.cos(),
                    polar.sin() * azimuth.sin(),
                    polar.cos(),
                ));
            }
        }
        SensorCloud::from_positions(&positions)
    }

    fn unordered_triple(t: &Triangle) -> [usize; 3] {
        let mut key = [t.v0.index(), t.v1.index(), t.v2.index()];
        key.sort_unstable();
        key
    }

    fn assert_mesh_is_sane(cm: &ConvexMesh) {
        let options = BuildOptions::default();
        let mut seen = HashSet::new();
        for (_, t) in cm.mesh().iter() {
            assert!(
                seen.insert(unordered_triple(t)),
                "duplicate triangle {:?}",
                unordered_triple(t)
            );
            assert!(
                t.max_angle(cm.cloud()) < options.max_flat_angle,
                "degenerate triangle with max angle {}",
                t.max_angle(cm.cloud())
            );
        }
    }

    #[test]
    fn test_too_few_sensors() {
        let cloud = SensorCloud::from_positions(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        match ConvexMesh::build(cloud) {
            Err(MeshError::TooFewSensors { found: 2, needed: 3 }) => {}
            other => panic!("expected TooFewSensors, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_tetrahedron_closes_with_four_triangles() {
        let cm = ConvexMesh::build(tetrahedron_cloud()).unwrap();
        assert_eq!(cm.cloud().outside_count(), 0);
        assert_eq!(cm.mesh().len(), 4);
        assert_mesh_is_sane(&cm);

        // Every edge is shared by exactly two triangles.
        let ids: Vec<_> = cm.cloud().ids().collect();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let first = cm.mesh().find_with_edge(cm.mesh().first(), ids[i], ids[j]);
                let first = first.expect("tetrahedron edge missing");
                let second = cm
                    .mesh()
                    .find_with_edge(cm.mesh().next(first), ids[i], ids[j])
                    .expect("tetrahedron edge not shared");
                assert!(cm
                    .mesh()
                    .find_with_edge(cm.mesh().next(second), ids[i], ids[j])
                    .is_none());
            }
        }
    }

    #[test]
    fn test_flat_grid_triggers_sphere_fallback() {
        let cloud = grid_cloud(5);
        let centroid = cloud.centroid();
        let estimate = cloud
            .iter()
            .map(|(_, s)| (s.position - centroid).norm())
            .sum::<f64>()
            / cloud.len() as f64;

        let cm = ConvexMesh::build(cloud).unwrap();
        // The damped fit must stay within two orders of magnitude of the
        // centroid-distance estimate.
        assert!(
            cm.radius() <= 100.0 * estimate,
            "radius {} vs estimate {}",
            cm.radius(),
            estimate
        );
        // And construction must still terminate with every sensor meshed.
        assert_eq!(cm.cloud().outside_count(), 0);
        assert!(cm.mesh().len() >= 2 * 16);
        assert_mesh_is_sane(&cm);
    }

    #[test]
    fn test_cap_layout() {
        let cm = ConvexMesh::build(cap_cloud(3, 8)).unwrap();
        assert_eq!(cm.cloud().outside_count(), 0);
        assert_mesh_is_sane(&cm);
        // The fitted sphere should resemble the synthetic unit sphere.
        assert!((cm.radius() - 1.0).abs() < 0.1, "radius {}", cm.radius());
        assert!(cm.center().coords.norm() < 0.3);
    }

    #[test]
    fn test_revision_reaches_fixed_point() {
        let cloud = grid_cloud(4);
        let cm = ConvexMesh::build(cloud).unwrap();

        // Re-running revision on a revised mesh must flip nothing.
        let mut mesh = TriangleMesh::new();
        for (_, t) in cm.mesh().iter() {
            mesh.push(*t);
        }
        let before: Vec<Triangle> = mesh.iter().map(|(_, t)| *t).collect();
        let passes = revise(cm.cloud(), &mut mesh);
        assert_eq!(passes, 1, "idempotent revision must stop after one scan");
        let after: Vec<Triangle> = mesh.iter().map(|(_, t)| *t).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_revision_never_increases_angle_sum() {
        // Build the mesh but rerun revision manually from the raw
        // constructed state to watch the objective.
        let cloud = grid_cloud(4);
        let cm = ConvexMesh::build(cloud).unwrap();
        let mut mesh = TriangleMesh::new();
        for (_, t) in cm.mesh().iter() {
            // Perturb canonical order; revision must still not regress.
            mesh.push(t.rotated_to_start(t.v1));
        }
        let angle_sum = |mesh: &TriangleMesh| -> f64 {
            mesh.iter().map(|(_, t)| t.max_angle(cm.cloud())).sum()
        };
        let before = angle_sum(&mesh);
        revise(cm.cloud(), &mut mesh);
        let after = angle_sum(&mesh);
        assert!(after <= before + 1e-12, "{} > {}", after, before);
    }

    #[test]
    fn test_orientation_consistent_after_revision() {
        let cm = ConvexMesh::build(cap_cloud(3, 8)).unwrap();
        for (id, t) in cm.mesh().iter() {
            let edges = [(t.v0, t.v1), (t.v1, t.v2), (t.v2, t.v0)];
            for (a, b) in edges {
                let mut other = cm.mesh().find_with_edge(cm.mesh().first(), a, b);
                while let Some(o) = other {
                    if o != id {
                        let dot = t.normal(cm.cloud()).dot(&cm.mesh().get(o).normal(cm.cloud()));
                        assert!(
                            dot >= 0.0,
                            "adjacent triangles with opposing normals: {}",
                            dot
                        );
                    }
                    other = cm.mesh().find_with_edge(cm.mesh().next(o), a, b);
                }
            }
        }
    }

    #[test]
    fn test_sphere_fit_on_exact_sphere() {
        let mut positions = Vec::new();
        for i in 0..6 {
            for j in 1..6 {
                let azimuth = i as f64 / 6.0 * std::f64::consts::TAU;
                let polar = j as f64 / 6.0 * std::f64::consts::PI;
                positions.push(Point3::new(
                    2.0 + 3.0 * polar.sin() * azimuth.cos(),
                    -1.0 + 3.0 * polar.sin() * azimuth.sin(),
                    0.5 + 3.0 * polar.cos(),
                ));
            }
        }
        let cloud = SensorCloud::from_positions(&positions);
        let (center, radius) = fit_sphere(&cloud, &BuildOptions::default());
        assert!((center - Point3::new(2.0, -1.0, 0.5)).norm() < 1e-2);
        assert!((radius - 3.0).abs() < 1e-2);
    }

    #[test]
    fn test_seed_triangle_marks_inside() {
        let mut cloud = tetrahedron_cloud();
        let seed = seed_triangle(&mut cloud).unwrap();
        assert_eq!(cloud.outside_count(), 1);
        assert!(cloud.is_inside(seed.v0));
        assert!(cloud.is_inside(seed.v1));
        assert!(cloud.is_inside(seed.v2));
        // The seed anchors at the first sensor in channel order.
        assert_eq!(cloud.channel_of(seed.v0), 0);
    }
}
