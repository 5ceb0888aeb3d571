//! The sensor point collection.
//!
//! A [`SensorCloud`] owns the positions of a sensor array in input channel
//! order. Each sensor carries an `inside` tag that records whether it has
//! been absorbed into the mesh; the tag starts `false` and is flipped to
//! `true` exactly once during construction. Vertex identity throughout the
//! crate is the [`SensorId`] handle, never coordinate equality — two
//! sensors at the same position are still two distinct vertices.

use nalgebra::Point3;

use super::geom;
use super::ring::{NodeId, RingList};

/// A sensor position plus its mesh-membership tag.
#[derive(Debug, Clone)]
pub struct Sensor {
    /// Position of the sensor.
    pub position: Point3<f64>,
    inside: bool,
}

/// Handle identifying a sensor in a [`SensorCloud`].
pub type SensorId = NodeId<Sensor>;

/// A collection of sensors in input channel order.
#[derive(Default)]
pub struct SensorCloud {
    ring: RingList<Sensor>,
}

impl SensorCloud {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self {
            ring: RingList::new(),
        }
    }

    /// Create a cloud from positions; insertion order is channel order.
    pub fn from_positions(positions: &[Point3<f64>]) -> Self {
        let mut cloud = Self {
            ring: RingList::with_capacity(positions.len()),
        };
        for &position in positions {
            cloud.push(position);
        }
        cloud
    }

    /// Append a sensor, initially outside the mesh.
    pub fn push(&mut self, position: Point3<f64>) -> SensorId {
        self.ring.push_back(Sensor {
            position,
            inside: false,
        })
    }

    /// Number of sensors.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the cloud has no sensors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// The first sensor in channel order.
    #[inline]
    pub fn first(&self) -> Option<SensorId> {
        self.ring.first()
    }

    /// Position of a sensor.
    #[inline]
    pub fn position(&self, id: SensorId) -> Point3<f64> {
        self.ring[id].position
    }

    /// Whether a sensor has been absorbed into the mesh.
    #[inline]
    pub fn is_inside(&self, id: SensorId) -> bool {
        self.ring[id].inside
    }

    /// Mark a sensor as absorbed into the mesh.
    pub fn mark_inside(&mut self, id: SensorId) {
        self.ring[id].inside = true;
    }

    /// Channel ordinal of a sensor: its position in insertion order.
    /// O(n).
    pub fn channel_of(&self, id: SensorId) -> usize {
        self.ring.before(id)
    }

    /// Iterate over `(handle, sensor)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (SensorId, &Sensor)> {
        self.ring.iter()
    }

    /// Iterate over sensor handles in channel order.
    pub fn ids(&self) -> impl Iterator<Item = SensorId> + '_ {
        self.ring.ids()
    }

    /// Squared distance between two sensors.
    pub fn distance_sq(&self, a: SensorId, b: SensorId) -> f64 {
        (self.position(a) - self.position(b)).norm_squared()
    }

    /// Number of sensors not yet absorbed into the mesh.
    pub fn outside_count(&self) -> usize {
        self.ring.iter().filter(|(_, s)| !s.inside).count()
    }

    /// Centroid of all sensor positions.
    pub fn centroid(&self) -> Point3<f64> {
        let mut sum = Point3::origin();
        let mut count = 0;
        for (_, sensor) in self.ring.iter() {
            sum += sensor.position.coords;
            count += 1;
        }
        if count > 1 {
            sum / count as f64
        } else {
            sum
        }
    }

    /// The sensor nearest to `to` in Euclidean distance, with the squared
    /// distance, skipping `exclude` if given.
    pub fn nearest(&self, to: &Point3<f64>, exclude: Option<SensorId>) -> Option<(SensorId, f64)> {
        let mut best: Option<(SensorId, f64)> = None;
        for (id, sensor) in self.ring.iter() {
            if Some(id) == exclude {
                continue;
            }
            let dd = (sensor.position - to).norm_squared();
            match best {
                Some((_, min)) if dd >= min => {}
                _ => best = Some((id, dd)),
            }
        }
        best
    }

    /// Mean over all sensors of the squared distance to their nearest
    /// other sensor. The ear-clipping chord gate compares squared chord
    /// lengths against a multiple of this value. O(n²).
    pub fn typical_spacing_sq(&self) -> f64 {
        let mut mean = 0.0;
        let mut count = 0;
        for (id, sensor) in self.ring.iter() {
            if let Some((_, dd)) = self.nearest(&sensor.position, Some(id)) {
                mean += dd;
                count += 1;
            }
        }
        if count != 0 {
            mean /= count as f64;
        }
        mean
    }

    /// The still-outside sensor nearest to `to` in Euclidean distance.
    /// A sensor at `to` itself qualifies (distance zero).
    pub fn nearest_outside(&self, to: &Point3<f64>) -> Option<SensorId> {
        let mut min_dd = -1.0;
        let mut best = None;
        for (id, sensor) in self.ring.iter() {
            if sensor.inside {
                continue;
            }
            let dd = (sensor.position - to).norm_squared();
            if min_dd < 0.0 || dd < min_dd {
                best = Some(id);
                min_dd = dd;
            }
        }
        best
    }

    /// The still-outside sensor at the smallest angular distance from
    /// `target` as seen from `origin`, with that distance.
    pub fn angular_nearest_outside(
        &self,
        origin: &Point3<f64>,
        target: &Point3<f64>,
    ) -> Option<(SensorId, f64)> {
        let mut best: Option<(SensorId, f64)> = None;
        for (id, sensor) in self.ring.iter() {
            if sensor.inside {
                continue;
            }
            let d = geom::angular_distance(&sensor.position, origin, target);
            match best {
                Some((_, min)) if d >= min => {}
                _ => best = Some((id, d)),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square_cloud() -> SensorCloud {
        SensorCloud::from_positions(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn test_channel_order() {
        let cloud = unit_square_cloud();
        for (expected, id) in cloud.ids().enumerate() {
            assert_eq!(cloud.channel_of(id), expected);
        }
    }

    #[test]
    fn test_centroid() {
        let cloud = unit_square_cloud();
        let c = cloud.centroid();
        assert!((c - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_typical_spacing_sq() {
        // Unit square: every sensor's nearest neighbor is 1 away.
        let cloud = unit_square_cloud();
        assert!((cloud.typical_spacing_sq() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_with_exclusion() {
        let cloud = unit_square_cloud();
        let ids: Vec<SensorId> = cloud.ids().collect();
        let probe = Point3::new(0.1, 0.0, 0.0);

        let (found, dd) = cloud.nearest(&probe, None).unwrap();
        assert_eq!(found, ids[0]);
        assert!((dd - 0.01).abs() < 1e-12);

        let (found, dd) = cloud.nearest(&probe, Some(ids[0])).unwrap();
        assert_eq!(found, ids[1]);
        assert!((dd - 0.81).abs() < 1e-12);
    }

    #[test]
    fn test_inside_tag_filters_searches() {
        let mut cloud = unit_square_cloud();
        let ids: Vec<SensorId> = cloud.ids().collect();
        assert_eq!(cloud.outside_count(), 4);

        // Nearest outside to the origin corner is the corner itself.
        let origin = Point3::new(0.0, 0.0, 0.0);
        assert_eq!(cloud.nearest_outside(&origin), Some(ids[0]));

        cloud.mark_inside(ids[0]);
        assert_eq!(cloud.outside_count(), 3);
        // Once absorbed, the search skips it.
        assert_eq!(cloud.nearest_outside(&origin), Some(ids[1]));
    }

    #[test]
    fn test_angular_nearest_outside() {
        let mut cloud = SensorCloud::from_positions(&[
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-1.0, 0.1, 0.0),
        ]);
        let ids: Vec<SensorId> = cloud.ids().collect();
        let origin = Point3::new(0.0, 0.0, 0.0);
        let target = Point3::new(0.9, 0.1, 0.0);

        let (found, d) = cloud.angular_nearest_outside(&origin, &target).unwrap();
        assert_eq!(found, ids[0]);
        assert!(d < 0.2);

        cloud.mark_inside(ids[0]);
        let (found, _) = cloud.angular_nearest_outside(&origin, &target).unwrap();
        assert_eq!(found, ids[1]);
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = SensorCloud::new();
        assert!(cloud.is_empty());
        assert_eq!(cloud.nearest_outside(&Point3::origin()), None);
        assert_eq!(cloud.typical_spacing_sq(), 0.0);
    }
}
