//! Aggregate of applied forces on a multibody system.

use nalgebra::DVector;

use crate::ids::BodyIndex;
use crate::spatial::SpatialForce;

/// The sum of externally applied forces on a multibody system: one spatial
/// force per body (applied at the body origin Bo, expressed in world) plus a
/// generalized force per velocity degree of freedom.
///
/// Contributions accumulate additively; `set_zero` resets between
/// evaluations. Body slot 0 (the world) exists but is ignored by dynamics.
#[derive(Debug, Clone, PartialEq)]
pub struct MultibodyForces {
    body_forces: Vec<SpatialForce>,
    generalized_forces: DVector<f64>,
}

impl MultibodyForces {
    /// Create a zeroed force aggregate for a system with `num_bodies` bodies
    /// and `num_velocities` generalized velocities.
    #[must_use]
    pub fn new(num_bodies: usize, num_velocities: usize) -> Self {
        Self {
            body_forces: vec![SpatialForce::zero(); num_bodies],
            generalized_forces: DVector::zeros(num_velocities),
        }
    }

    /// Reset every contribution to zero.
    pub fn set_zero(&mut self) {
        for f in &mut self.body_forces {
            *f = SpatialForce::zero();
        }
        self.generalized_forces.fill(0.0);
    }

    /// Number of body slots.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.body_forces.len()
    }

    /// Per-body spatial forces at each body origin, expressed in world.
    #[must_use]
    pub fn body_forces(&self) -> &[SpatialForce] {
        &self.body_forces
    }

    /// Mutable per-body spatial forces.
    pub fn mutable_body_forces(&mut self) -> &mut [SpatialForce] {
        &mut self.body_forces
    }

    /// Generalized forces, one per velocity degree of freedom.
    #[must_use]
    pub fn generalized_forces(&self) -> &DVector<f64> {
        &self.generalized_forces
    }

    /// Mutable generalized forces.
    pub fn mutable_generalized_forces(&mut self) -> &mut DVector<f64> {
        &mut self.generalized_forces
    }

    /// Add a spatial force (at Bo, in world) onto a body.
    pub fn add_in_body_force(&mut self, body: BodyIndex, force: SpatialForce) {
        self.body_forces[body.raw()] += force;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_accumulation_and_reset() {
        let mut forces = MultibodyForces::new(3, 4);
        forces.add_in_body_force(BodyIndex::new(1), SpatialForce::from_force(Vector3::x()));
        forces.add_in_body_force(BodyIndex::new(1), SpatialForce::from_force(Vector3::x()));
        forces.mutable_generalized_forces()[2] = 5.0;

        assert_eq!(forces.body_forces()[1].force.x, 2.0);
        assert_eq!(forces.generalized_forces()[2], 5.0);

        forces.set_zero();
        assert_eq!(forces.body_forces()[1].force.x, 0.0);
        assert_eq!(forces.generalized_forces()[2], 0.0);
    }
}
