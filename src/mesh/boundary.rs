//! The boundary ring.
//!
//! During construction the boundary is the live frontier of the partially
//! built mesh: an ordered cycle of sensor handles enclosing the region not
//! yet covered by triangles. Ear clipping removes entries, boundary growth
//! splices new ones in, and after construction the leftover ring is the
//! mesh's outer rim (or a residual three-cycle for a fully enclosed
//! cloud).
//!
//! Entries reference sensors by handle; the ring never owns positions.
//! The convexity queries classify a boundary vertex against a reference
//! outward normal: `+1` convex, `0` flat, `-1` reflex. Reflex vertices are
//! the ear-clipping candidates.

use nalgebra::{Point3, Vector3};

use super::cloud::{SensorCloud, SensorId};
use super::geom;
use super::ring::{NodeId, RingList};
use super::triangle::{Triangle, TriangleMesh};

/// Handle identifying an entry of a [`Boundary`].
pub type BoundaryId = NodeId<SensorId>;

/// The ordered cycle of sensors bounding the unmeshed region.
#[derive(Default)]
pub struct Boundary {
    ring: RingList<SensorId>,
}

impl Boundary {
    /// Create an empty boundary.
    pub fn new() -> Self {
        Self {
            ring: RingList::new(),
        }
    }

    /// Initialize the ring from a triangle's vertices, in orientation
    /// order.
    pub fn from_triangle(triangle: &Triangle) -> Self {
        let mut boundary = Self::new();
        boundary.ring.push_back(triangle.v0);
        boundary.ring.push_back(triangle.v1);
        boundary.ring.push_back(triangle.v2);
        boundary
    }

    /// Number of boundary entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the boundary has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// The ring's designated head entry.
    #[inline]
    pub fn first(&self) -> Option<BoundaryId> {
        self.ring.first()
    }

    /// The entry after `at` in chain order; `None` past the end.
    #[inline]
    pub fn next(&self, at: BoundaryId) -> Option<BoundaryId> {
        self.ring.next(at)
    }

    /// The entry after `at` in ring order (wraps).
    #[inline]
    pub fn ring_next(&self, at: BoundaryId) -> BoundaryId {
        self.ring.ring_next(at)
    }

    /// The entry before `at` in ring order (wraps).
    #[inline]
    pub fn ring_previous(&self, at: BoundaryId) -> BoundaryId {
        self.ring.ring_previous(at)
    }

    /// The sensor referenced by a boundary entry.
    #[inline]
    pub fn point(&self, at: BoundaryId) -> SensorId {
        self.ring[at]
    }

    /// Iterate over `(entry, sensor)` pairs in chain order.
    pub fn iter(&self) -> impl Iterator<Item = (BoundaryId, SensorId)> + '_ {
        self.ring.iter().map(|(id, &v)| (id, v))
    }

    /// Find the entry referencing `v`.
    pub fn find(&self, v: SensorId) -> Option<BoundaryId> {
        self.iter().find(|&(_, p)| p == v).map(|(id, _)| id)
    }

    /// Splice a new entry for `v` immediately after `at`.
    pub fn insert_after(&mut self, at: BoundaryId, v: SensorId) -> BoundaryId {
        self.ring.push_after(at, v)
    }

    /// Remove an entry, relinking its ring neighbors. If the entry was the
    /// ring head, the head advances first.
    pub fn remove(&mut self, at: BoundaryId) {
        self.ring.remove(at);
    }

    /// Cross product of the wedge `base → b1`, `base → b2`.
    pub fn wedge_cross(
        &self,
        cloud: &SensorCloud,
        base: BoundaryId,
        b1: BoundaryId,
        b2: BoundaryId,
    ) -> Vector3<f64> {
        let p = cloud.position(self.point(base));
        let p1 = cloud.position(self.point(b1));
        let p2 = cloud.position(self.point(b2));
        (p1 - p).cross(&(p2 - p))
    }

    /// Normal of the plane spanned by `at` and its next two ring
    /// neighbors, normalized.
    pub fn normal_of_one_plane(&self, cloud: &SensorCloud, at: BoundaryId) -> Vector3<f64> {
        let next1 = self.ring_next(at);
        let next2 = self.ring_next(next1);
        self.wedge_cross(cloud, at, next1, next2).normalize()
    }

    /// Average of the one-plane normals around the whole ring, normalized.
    /// The whole-boundary orientation reference used before any adjacent
    /// triangles exist.
    pub fn normal_of_all_planes(&self, cloud: &SensorCloud) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        for (id, _) in self.iter() {
            normal += self.normal_of_one_plane(cloud, id);
        }
        normal.normalize()
    }

    /// Classify the vertex at `at` against a reference outward normal:
    /// `+1` convex, `0` flat, `-1` reflex (clippable).
    pub fn curvature_direction(
        &self,
        cloud: &SensorCloud,
        at: BoundaryId,
        normal: &Vector3<f64>,
    ) -> i32 {
        let prev = self.ring_previous(at);
        let next = self.ring_next(at);
        let pn = self.wedge_cross(cloud, prev, at, next).dot(normal);
        if pn > 0.0 {
            1
        } else if pn < 0.0 {
            -1
        } else {
            0
        }
    }

    /// Classify the vertex at `at` using the local outward normal averaged
    /// from the mesh triangles adjacent to its two boundary edges.
    pub fn adjacent_direction(
        &self,
        cloud: &SensorCloud,
        mesh: &TriangleMesh,
        at: BoundaryId,
    ) -> i32 {
        let prev = self.point(self.ring_previous(at));
        let here = self.point(at);
        let next = self.point(self.ring_next(at));
        let normal = (mesh.adjacent_normal_of_edge(cloud, prev, here)
            + mesh.adjacent_normal_of_edge(cloud, here, next))
        .normalize();
        self.curvature_direction(cloud, at, &normal)
    }

    /// Find the next strictly reflex vertex at or after `from`, judged by
    /// the adjacent-triangle normals. `from = None` means an exhausted
    /// scan.
    pub fn non_convex_vertex(
        &self,
        cloud: &SensorCloud,
        mesh: &TriangleMesh,
        from: Option<BoundaryId>,
    ) -> Option<BoundaryId> {
        let mut at = from;
        while let Some(id) = at {
            if self.adjacent_direction(cloud, mesh, id) == -1 {
                return Some(id);
            }
            at = self.ring.next(id);
        }
        None
    }

    /// Whether no vertex is reflex or flat against the whole-boundary
    /// average normal.
    pub fn is_convex(&self, cloud: &SensorCloud) -> bool {
        let normal = self.normal_of_all_planes(cloud);
        self.iter()
            .all(|(id, _)| self.curvature_direction(cloud, id, &normal) == 1)
    }

    /// Mean squared length of the ring's edges.
    pub fn typical_spacing_sq(&self, cloud: &SensorCloud) -> f64 {
        let mut mean = 0.0;
        let mut count = 0;
        for (id, v) in self.iter() {
            let next = self.point(self.ring_next(id));
            mean += cloud.distance_sq(v, next);
            count += 1;
        }
        if count != 0 {
            mean /= count as f64;
        }
        mean
    }

    /// The entry whose edge to its ring successor is closest to `p`, with
    /// that distance.
    pub fn nearest_edge(
        &self,
        cloud: &SensorCloud,
        p: &Point3<f64>,
    ) -> Option<(BoundaryId, f64)> {
        let mut best: Option<(BoundaryId, f64)> = None;
        for (id, v) in self.iter() {
            let next = self.point(self.ring_next(id));
            let d = geom::segment_distance(p, &cloud.position(v), &cloud.position(next));
            match best {
                Some((_, min)) if d >= min => {}
                _ => best = Some((id, d)),
            }
        }
        best
    }
}
