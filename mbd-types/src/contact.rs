//! Penetration witnesses and contact reporting.

use nalgebra::{Point3, Vector3};

use crate::ids::{BodyIndex, GeometryId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A penetration witness between two geometries, produced by the geometry
/// engine's narrow phase.
///
/// The convention is fixed: `normal_from_b` is the unit vector pointing from
/// geometry B into geometry A, `depth` is the (non-negative) penetration
/// extent, and the witness points lie on each geometry's surface.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointPair {
    /// Geometry on body A.
    pub id_a: GeometryId,
    /// Geometry on body B.
    pub id_b: GeometryId,
    /// Witness point on A's surface, world frame.
    pub point_on_a: Point3<f64>,
    /// Witness point on B's surface, world frame.
    pub point_on_b: Point3<f64>,
    /// Unit normal pointing from B into A, world frame.
    pub normal_from_b: Vector3<f64>,
    /// Penetration depth, ≥ 0.
    pub depth: f64,
}

impl PointPair {
    /// The midpoint between the two witness points, used as the contact
    /// point C for force application and reporting.
    #[must_use]
    pub fn contact_point(&self) -> Point3<f64> {
        Point3::from(0.5 * (self.point_on_a.coords + self.point_on_b.coords))
    }
}

/// Per-contact quantities reported after a discrete step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactInfo {
    /// Body owning geometry A.
    pub body_a: BodyIndex,
    /// Body owning geometry B.
    pub body_b: BodyIndex,
    /// Contact force on body B applied at the contact point, world frame.
    pub contact_force: Vector3<f64>,
    /// The contact point C, world frame.
    pub contact_point: Point3<f64>,
    /// Normal separation rate at C; negative while the bodies approach.
    pub separation_velocity: f64,
    /// Tangential slip speed at C, ≥ 0.
    pub slip_speed: f64,
    /// The penetration witness this contact originated from.
    pub point_pair: PointPair,
}

/// The set of [`ContactInfo`] entries produced by one discrete step.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactResults {
    contacts: Vec<ContactInfo>,
}

impl ContactResults {
    /// Create an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all contacts.
    pub fn clear(&mut self) {
        self.contacts.clear();
    }

    /// Append one contact.
    pub fn add_contact_info(&mut self, info: ContactInfo) {
        self.contacts.push(info);
    }

    /// Number of contacts.
    #[must_use]
    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the step produced no contacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// The `i`-th contact, in the order the point pairs were reported.
    #[must_use]
    pub fn contact_info(&self, i: usize) -> &ContactInfo {
        &self.contacts[i]
    }

    /// Iterate over all contacts.
    pub fn iter(&self) -> impl Iterator<Item = &ContactInfo> {
        self.contacts.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_contact_point_is_midpoint() {
        let pair = PointPair {
            id_a: GeometryId::new(0),
            id_b: GeometryId::new(1),
            point_on_a: Point3::new(0.0, 0.0, -0.001),
            point_on_b: Point3::new(0.0, 0.0, 0.001),
            normal_from_b: Vector3::z(),
            depth: 0.002,
        };
        assert_relative_eq!(pair.contact_point().z, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_results_accumulate_and_clear() {
        let pair = PointPair {
            id_a: GeometryId::new(0),
            id_b: GeometryId::new(1),
            point_on_a: Point3::origin(),
            point_on_b: Point3::origin(),
            normal_from_b: Vector3::z(),
            depth: 0.0,
        };
        let mut results = ContactResults::new();
        results.add_contact_info(ContactInfo {
            body_a: BodyIndex::new(1),
            body_b: BodyIndex::world(),
            contact_force: Vector3::zeros(),
            contact_point: Point3::origin(),
            separation_velocity: 0.0,
            slip_speed: 0.0,
            point_pair: pair,
        });
        assert_eq!(results.num_contacts(), 1);
        results.clear();
        assert!(results.is_empty());
    }
}
