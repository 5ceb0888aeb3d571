//! Triangles and the triangle mesh.
//!
//! A [`Triangle`] holds three sensor handles; its orientation is
//! significant (the normal is `(v1-v0)×(v2-v0)`, normalized). The
//! canonical form — largest interior angle opposite the `v0..v1` edge — is
//! an explicit, callable normalization used by the revision pass, not an
//! invariant the mesh maintains automatically.
//!
//! A [`TriangleMesh`] is a ring list of triangles sharing vertices by
//! handle identity. Adjacency is shared-edge adjacency (an unordered pair
//! of sensor handles). Searches are forward scans resumable from a cursor,
//! so "find the next triangle on this edge after that one" is a single
//! call — the pattern the fan walk and the revision pass are built on.

use nalgebra::{Point3, Vector3};

use super::cloud::{SensorCloud, SensorId};
use super::geom;
use super::ring::{NodeId, RingList};

/// A triangle over three sensors, orientation-significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    /// First vertex.
    pub v0: SensorId,
    /// Second vertex.
    pub v1: SensorId,
    /// Third vertex.
    pub v2: SensorId,
}

impl Triangle {
    /// Create a triangle from three sensor handles.
    pub fn new(v0: SensorId, v1: SensorId, v2: SensorId) -> Self {
        Self { v0, v1, v2 }
    }

    /// The three vertex positions.
    pub fn positions(&self, cloud: &SensorCloud) -> [Point3<f64>; 3] {
        [
            cloud.position(self.v0),
            cloud.position(self.v1),
            cloud.position(self.v2),
        ]
    }

    /// Unit normal `(v1-v0)×(v2-v0)`, normalized.
    pub fn normal(&self, cloud: &SensorCloud) -> Vector3<f64> {
        let [p0, p1, p2] = self.positions(cloud);
        (p1 - p0).cross(&(p2 - p0)).normalize()
    }

    /// The largest interior angle.
    pub fn max_angle(&self, cloud: &SensorCloud) -> f64 {
        let [p0, p1, p2] = self.positions(cloud);
        let a0 = geom::triangle_angle(&p2, &p0, &p1);
        let a1 = geom::triangle_angle(&p0, &p1, &p2);
        let a2 = geom::triangle_angle(&p1, &p2, &p0);
        a0.max(a1).max(a2)
    }

    /// Cyclic rotation so the largest interior angle is opposite the
    /// `v0..v1` edge. Orientation is preserved.
    pub fn canonicalized(&self, cloud: &SensorCloud) -> Triangle {
        let [p0, p1, p2] = self.positions(cloud);
        // Angle opposite v0..v1 sits at v2, and so on around the ring.
        let opp01 = geom::triangle_angle(&p2, &p0, &p1);
        let opp12 = geom::triangle_angle(&p0, &p1, &p2);
        let opp20 = geom::triangle_angle(&p1, &p2, &p0);
        if opp12 > opp01 && opp12 > opp20 {
            Triangle::new(self.v1, self.v2, self.v0)
        } else if opp20 > opp01 && opp20 > opp12 {
            Triangle::new(self.v2, self.v0, self.v1)
        } else {
            *self
        }
    }

    /// Cyclic rotation so `v` is the first vertex. `v` must be one of the
    /// triangle's vertices; otherwise the triangle is returned unchanged.
    pub fn rotated_to_start(&self, v: SensorId) -> Triangle {
        if self.v1 == v {
            Triangle::new(self.v1, self.v2, self.v0)
        } else if self.v2 == v {
            Triangle::new(self.v2, self.v0, self.v1)
        } else {
            *self
        }
    }

    /// Whether `v` is one of the triangle's vertices.
    pub fn has_vertex(&self, v: SensorId) -> bool {
        self.v0 == v || self.v1 == v || self.v2 == v
    }

    /// Whether the unordered pair `(a, b)` is an edge of this triangle.
    pub fn has_edge(&self, a: SensorId, b: SensorId) -> bool {
        self.has_vertex(a) && self.has_vertex(b)
    }

    /// Whether this triangle shares an edge with `other`.
    pub fn is_adjacent(&self, other: &Triangle) -> bool {
        other.has_edge(self.v0, self.v1)
            || other.has_edge(self.v1, self.v2)
            || other.has_edge(self.v2, self.v0)
    }

    /// The vertex that is not part of the edge `(a, b)`.
    pub fn opposite_of_edge(&self, a: SensorId, b: SensorId) -> SensorId {
        if self.v0 != a && self.v0 != b {
            self.v0
        } else if self.v1 != a && self.v1 != b {
            self.v1
        } else {
            self.v2
        }
    }

    /// Whether `p` projects into the triangle's area, and on which side
    /// of its plane.
    ///
    /// Returns `Some((side, coeff))` when the projection of `p` along the
    /// normal falls inside the triangle: `side` is `+1` above the plane
    /// (normal side) or `-1` below, and `coeff` is the signed normal
    /// offset. Returns `None` when the projection falls outside.
    pub fn classify_above(&self, cloud: &SensorCloud, p: &Point3<f64>) -> Option<(i32, f64)> {
        let [p0, p1, p2] = self.positions(cloud);

        let e01 = (p1 - p0).normalize();
        let e02 = (p2 - p0).normalize();
        let e12 = (p2 - p1).normalize();

        // For each edge direction, the inward reference is the remaining
        // vertex offset with the edge component removed.
        let in01 = (p2 - p0) - e01 * (p2 - p0).dot(&e01);
        let in02 = (p1 - p0) - e02 * (p1 - p0).dot(&e02);
        let in12 = (p0 - p1) - e12 * (p0 - p1).dot(&e12);

        let n = self.normal(cloud);
        let off0 = p - p0;
        let coeff = off0.dot(&n);
        let proj0 = off0 - n * coeff;
        let off1 = p - p1;
        let proj1 = off1 - n * off1.dot(&n);

        if proj0.dot(&in01) > 0.0 && proj0.dot(&in02) > 0.0 && proj1.dot(&in12) > 0.0 {
            Some((if coeff >= 0.0 { 1 } else { -1 }, coeff))
        } else {
            None
        }
    }

    /// In-plane distance from `p` to the triangle border, together with
    /// the normal offset of `p` from the triangle plane.
    pub fn plane_distance(&self, cloud: &SensorCloud, p: &Point3<f64>) -> (f64, f64) {
        let [p0, p1, p2] = self.positions(cloud);
        let n = self.normal(cloud);
        let off = p - p0;
        let normal_offset = off.dot(&n);
        let in_plane = Point3::from(off - n * normal_offset);

        let q0 = Point3::origin();
        let q1 = Point3::from(p1 - p0);
        let q2 = Point3::from(p2 - p0);
        let d = geom::segment_distance(&in_plane, &q0, &q1)
            .min(geom::segment_distance(&in_plane, &q1, &q2))
            .min(geom::segment_distance(&in_plane, &q2, &q0));
        (d, normal_offset)
    }
}

/// Handle identifying a triangle in a [`TriangleMesh`].
pub type TriangleId = NodeId<Triangle>;

/// A ring list of triangles with shared-edge adjacency queries.
#[derive(Default)]
pub struct TriangleMesh {
    ring: RingList<Triangle>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self {
            ring: RingList::new(),
        }
    }

    /// Number of triangles.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// The first triangle in list order.
    #[inline]
    pub fn first(&self) -> Option<TriangleId> {
        self.ring.first()
    }

    /// The triangle after `id` in list order.
    #[inline]
    pub fn next(&self, id: TriangleId) -> Option<TriangleId> {
        self.ring.next(id)
    }

    /// Get a triangle by handle.
    #[inline]
    pub fn get(&self, id: TriangleId) -> Triangle {
        self.ring[id]
    }

    /// Append a triangle.
    pub fn push(&mut self, triangle: Triangle) -> TriangleId {
        self.ring.push_back(triangle)
    }

    /// Rewrite a triangle in place (used by edge flips).
    pub fn set(&mut self, id: TriangleId, triangle: Triangle) {
        self.ring[id] = triangle;
    }

    /// Iterate over `(handle, triangle)` pairs in list order.
    pub fn iter(&self) -> impl Iterator<Item = (TriangleId, &Triangle)> {
        self.ring.iter()
    }

    /// Iterate over triangle handles in list order.
    pub fn ids(&self) -> impl Iterator<Item = TriangleId> + '_ {
        self.ring.ids()
    }

    fn scan_from(&self, from: Option<TriangleId>) -> impl Iterator<Item = TriangleId> + '_ {
        let mut at = from;
        std::iter::from_fn(move || {
            let id = at?;
            at = self.ring.next(id);
            Some(id)
        })
    }

    /// Find the first triangle at or after `from` that contains `v`.
    /// `from = None` means an exhausted scan (no match).
    pub fn find_with_vertex(&self, from: Option<TriangleId>, v: SensorId) -> Option<TriangleId> {
        self.scan_from(from).find(|&id| self.ring[id].has_vertex(v))
    }

    /// Find the first triangle at or after `from` with the edge `(a, b)`.
    pub fn find_with_edge(
        &self,
        from: Option<TriangleId>,
        a: SensorId,
        b: SensorId,
    ) -> Option<TriangleId> {
        self.scan_from(from).find(|&id| self.ring[id].has_edge(a, b))
    }

    /// Find the first triangle at or after `from` sharing an edge with
    /// `triangle`.
    pub fn find_adjacent(
        &self,
        from: Option<TriangleId>,
        triangle: &Triangle,
    ) -> Option<TriangleId> {
        self.scan_from(from)
            .find(|&id| self.ring[id].is_adjacent(triangle))
    }

    /// Mean of the normals of all triangles having the edge `(a, b)`.
    /// The zero vector when no triangle has that edge.
    pub fn adjacent_normal_of_edge(
        &self,
        cloud: &SensorCloud,
        a: SensorId,
        b: SensorId,
    ) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        let mut count = 0;
        let mut at = self.find_with_edge(self.first(), a, b);
        while let Some(id) = at {
            normal += self.ring[id].normal(cloud);
            count += 1;
            at = self.find_with_edge(self.next(id), a, b);
        }
        if count > 0 {
            normal /= count as f64;
        }
        normal
    }

    /// Mean of the normals of all triangles sharing an edge with
    /// `triangle` (including `triangle` itself if it is in the list).
    pub fn adjacent_normal(&self, cloud: &SensorCloud, triangle: &Triangle) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        let mut count = 0;
        let mut at = self.find_adjacent(self.first(), triangle);
        while let Some(id) = at {
            normal += self.ring[id].normal(cloud);
            count += 1;
            at = self.find_adjacent(self.next(id), triangle);
        }
        if count > 0 {
            normal /= count as f64;
        }
        normal
    }

    /// Whether `triangle` is oriented consistently with its edge-adjacent
    /// neighbors: `+1` consistent, `-1` inverted, `0` undecided.
    pub fn adjacent_direction(&self, cloud: &SensorCloud, triangle: &Triangle) -> i32 {
        let dot = triangle
            .normal(cloud)
            .dot(&self.adjacent_normal(cloud, triangle));
        if dot > 0.0 {
            1
        } else if dot < 0.0 {
            -1
        } else {
            0
        }
    }

    /// Angle between `triangle`'s normal and the mean normal of its
    /// edge-adjacent neighbors.
    pub fn adjacent_angle(&self, cloud: &SensorCloud, triangle: &Triangle) -> f64 {
        triangle
            .normal(cloud)
            .dot(&self.adjacent_normal(cloud, triangle))
            .clamp(-1.0, 1.0)
            .acos()
    }
}
