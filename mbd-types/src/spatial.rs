//! Spatial (6-vector) velocities and forces.
//!
//! A spatial quantity pairs an angular and a linear 3-vector, both expressed
//! in the same frame and taken about a stated application/measure point.
//! `shift` moves that point across a rigid body:
//!
//! ```text
//! velocity:  v_Q = v_P + ω × p_PQ          (ω unchanged)
//! force:     τ_Q = τ_P − p_PQ × f          (f unchanged)
//! ```
//!
//! where `p_PQ` is the vector from the current point P to the new point Q.

use nalgebra::Vector3;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Spatial velocity of a frame: angular velocity plus the linear velocity of
/// a stated point, both expressed in the same (usually world) frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialVelocity {
    /// Angular velocity ω.
    pub angular: Vector3<f64>,
    /// Linear velocity of the measure point.
    pub linear: Vector3<f64>,
}

impl SpatialVelocity {
    /// Create a spatial velocity from its angular and linear parts.
    #[must_use]
    pub fn new(angular: Vector3<f64>, linear: Vector3<f64>) -> Self {
        Self { angular, linear }
    }

    /// The zero spatial velocity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            angular: Vector3::zeros(),
            linear: Vector3::zeros(),
        }
    }

    /// Velocity of the body-fixed point at offset `p_pq` from the current
    /// measure point.
    #[must_use]
    pub fn shift(&self, p_pq: &Vector3<f64>) -> Self {
        Self {
            angular: self.angular,
            linear: self.linear + self.angular.cross(p_pq),
        }
    }
}

/// Spatial force (wrench): a torque plus a force, applied at a stated point
/// and expressed in the same (usually world) frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialForce {
    /// Torque about the application point.
    pub torque: Vector3<f64>,
    /// Force.
    pub force: Vector3<f64>,
}

impl SpatialForce {
    /// Create a spatial force from its torque and force parts.
    #[must_use]
    pub fn new(torque: Vector3<f64>, force: Vector3<f64>) -> Self {
        Self { torque, force }
    }

    /// The zero spatial force.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            torque: Vector3::zeros(),
            force: Vector3::zeros(),
        }
    }

    /// A pure force (no torque) applied at the measure point.
    #[must_use]
    pub fn from_force(force: Vector3<f64>) -> Self {
        Self {
            torque: Vector3::zeros(),
            force,
        }
    }

    /// The statically equivalent wrench applied at offset `p_pq` from the
    /// current application point.
    #[must_use]
    pub fn shift(&self, p_pq: &Vector3<f64>) -> Self {
        Self {
            torque: self.torque - p_pq.cross(&self.force),
            force: self.force,
        }
    }
}

impl Add for SpatialForce {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            torque: self.torque + rhs.torque,
            force: self.force + rhs.force,
        }
    }
}

impl AddAssign for SpatialForce {
    fn add_assign(&mut self, rhs: Self) {
        self.torque += rhs.torque;
        self.force += rhs.force;
    }
}

impl Sub for SpatialForce {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            torque: self.torque - rhs.torque,
            force: self.force - rhs.force,
        }
    }
}

impl Neg for SpatialForce {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            torque: -self.torque,
            force: -self.force,
        }
    }
}

impl Mul<f64> for SpatialForce {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            torque: self.torque * rhs,
            force: self.force * rhs,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_velocity_shift() {
        // Pure spin about Z; a point one unit out along X moves in +Y.
        let v = SpatialVelocity::new(Vector3::z(), Vector3::zeros());
        let shifted = v.shift(&Vector3::x());
        assert_relative_eq!(shifted.linear.y, 1.0, epsilon = 1e-14);
        assert_relative_eq!(shifted.angular.z, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_velocity_shift_composes() {
        let v = SpatialVelocity::new(Vector3::new(0.1, -0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        let p1 = Vector3::new(0.5, 0.0, -1.0);
        let p2 = Vector3::new(-0.2, 0.4, 0.1);
        let via_sum = v.shift(&(p1 + p2));
        let via_steps = v.shift(&p1).shift(&p2);
        assert_relative_eq!(via_sum.linear, via_steps.linear, epsilon = 1e-14);
    }

    #[test]
    fn test_force_shift_preserves_moment_about_origin() {
        let f = SpatialForce::new(Vector3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0));
        let p = Vector3::new(0.0, 2.0, 0.0);
        let shifted = f.shift(&p);
        // Moment about the original point must be unchanged:
        // τ_P = τ_Q + p_PQ × f.
        let back = shifted.torque + p.cross(&shifted.force);
        assert_relative_eq!(back, f.torque, epsilon = 1e-14);
    }

    #[test]
    fn test_force_arithmetic() {
        let a = SpatialForce::from_force(Vector3::x());
        let b = SpatialForce::from_force(Vector3::y());
        let sum = a + b;
        assert_relative_eq!(sum.force, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-14);
        assert_relative_eq!((-a).force, -Vector3::x(), epsilon = 1e-14);
        assert_relative_eq!((a * 2.0).force, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-14);
    }
}
