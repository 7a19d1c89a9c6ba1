//! Penalty contact parameters derived from a penetration allowance.
//!
//! The user states one length: how much interpenetration is acceptable at
//! steady state. Stiffness and dissipation follow from a critically damped
//! spring-mass oscillator sized by the heaviest body in the model:
//!
//! ```text
//! k   = m·g / δ        stiffness such that the heaviest body rests at δ
//! ω   = √(k / m)       natural frequency of that spring-mass pair
//! τ_c = 1 / ω          contact time scale
//! d   = τ_c / δ        dissipation (1/velocity), damping ratio 1
//! ```
//!
//! The normal force law `fₙ = k·x·(1 + d·ẋ)` is a nonlinear oscillator
//! `m·ẍ + (k·d·x)·ẋ + k·x = m·g`, so `d` is formed by dimensional analysis
//! from the contact time scale and the allowance as the length scale.

use mbd_types::{PlantError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stiffness, dissipation, and time scale of the compliant normal force law.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PenaltyParameters {
    /// Contact stiffness k (N/m).
    pub stiffness: f64,
    /// Hunt–Crossley dissipation d (s/m).
    pub damping: f64,
    /// Contact time scale τ_c (s); a hint for the integrator's step size.
    pub time_scale: f64,
}

impl PenaltyParameters {
    /// Derive parameters from a penetration allowance.
    ///
    /// `mass` is the maximum body mass in the model (every body counts,
    /// including fixed bases - deliberately conservative) and `gravity` the
    /// magnitude of the gravity vector.
    pub fn from_penetration_allowance(
        penetration_allowance: f64,
        mass: f64,
        gravity: f64,
    ) -> Result<Self> {
        if !penetration_allowance.is_finite() || penetration_allowance <= 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "penetration allowance must be strictly positive, got {penetration_allowance}"
            )));
        }
        if !mass.is_finite() || mass <= 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "penalty parameter estimation requires a positive maximum body mass, got {mass}"
            )));
        }
        if !gravity.is_finite() || gravity <= 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "penalty parameter estimation requires a positive gravity magnitude, got {gravity}"
            )));
        }

        let stiffness = mass * gravity / penetration_allowance;
        let omega = (stiffness / mass).sqrt();
        let time_scale = 1.0 / omega;
        // Damping ratio 1: critically damp the normal direction, which is the
        // non-penetration constraint in the limit of vanishing allowance.
        let damping_ratio = 1.0;
        let damping = damping_ratio * time_scale / penetration_allowance;

        Ok(Self {
            stiffness,
            damping,
            time_scale,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_equilibrium_sizing() {
        // The heaviest body resting on the spring must settle at exactly the
        // allowance: k·δ = m·g.
        let delta = 1e-3;
        let params = PenaltyParameters::from_penetration_allowance(delta, 2.0, 9.81).unwrap();
        assert_relative_eq!(params.stiffness * delta, 2.0 * 9.81, epsilon = 1e-10);
    }

    #[test]
    fn test_time_scale_is_inverse_frequency() {
        let params = PenaltyParameters::from_penetration_allowance(1e-4, 1.0, 9.81).unwrap();
        let omega = (params.stiffness / 1.0).sqrt();
        assert_relative_eq!(params.time_scale, 1.0 / omega, epsilon = 1e-12);
        assert_relative_eq!(
            params.damping,
            params.time_scale / 1e-4,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_smaller_allowance_is_stiffer() {
        let loose = PenaltyParameters::from_penetration_allowance(1e-2, 1.0, 9.81).unwrap();
        let tight = PenaltyParameters::from_penetration_allowance(1e-4, 1.0, 9.81).unwrap();
        assert!(tight.stiffness > loose.stiffness);
        assert!(tight.time_scale < loose.time_scale);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(PenaltyParameters::from_penetration_allowance(0.0, 1.0, 9.81).is_err());
        assert!(PenaltyParameters::from_penetration_allowance(1e-3, 0.0, 9.81).is_err());
        assert!(PenaltyParameters::from_penetration_allowance(1e-3, 1.0, 0.0).is_err());
    }
}
