//! Regularized Stribeck friction coefficient.
//!
//! Coulomb friction is discontinuous at zero slip, which defeats both
//! continuous integration and Newton iterations. This model replaces the
//! discontinuity with a C² curve parameterized by a stiction tolerance `v*`:
//! slip speeds below `v*` are treated as "stuck", and the coefficient ramps
//! through
//!
//! ```text
//! s = ‖v_t‖ / v*
//! s ∈ [0, 1):   μ = μ_s · step5(s)
//! s ∈ [1, 3):   μ = μ_s − (μ_s − μ_d) · step5((s − 1) / 2)
//! s ≥ 3:        μ = μ_d
//! ```
//!
//! where `step5(x) = x³(10 − 15x + 6x²)` is the quintic smoothstep with zero
//! first and second derivatives at both ends. The curve passes through
//! μ(0) = 0, μ(v*) = μ_s, μ(3v*) = μ_d, and is monotone on each branch.

use mbd_types::{CoulombFriction, PlantError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default stiction tolerance `v*` (m/s).
pub const DEFAULT_STICTION_TOLERANCE: f64 = 1e-3;

/// The regularized friction coefficient curve μ(‖v_t‖).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StribeckModel {
    stiction_tolerance: f64,
    inv_stiction_tolerance: f64,
}

impl Default for StribeckModel {
    fn default() -> Self {
        Self {
            stiction_tolerance: DEFAULT_STICTION_TOLERANCE,
            inv_stiction_tolerance: 1.0 / DEFAULT_STICTION_TOLERANCE,
        }
    }
}

impl StribeckModel {
    /// Create a model with the given stiction tolerance `v*` (m/s).
    ///
    /// Fails with [`PlantError::InvalidArgument`] unless `v*` is strictly
    /// positive and finite.
    pub fn new(stiction_tolerance: f64) -> Result<Self> {
        if !stiction_tolerance.is_finite() || stiction_tolerance <= 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "stiction tolerance must be strictly positive, got {stiction_tolerance}"
            )));
        }
        Ok(Self {
            stiction_tolerance,
            inv_stiction_tolerance: 1.0 / stiction_tolerance,
        })
    }

    /// The stiction tolerance `v*` (m/s).
    #[must_use]
    pub fn stiction_tolerance(&self) -> f64 {
        self.stiction_tolerance
    }

    /// The friction coefficient at the given slip speed (m/s, ≥ 0).
    #[must_use]
    pub fn friction_coefficient(&self, slip_speed: f64, friction: &CoulombFriction) -> f64 {
        self.friction_coefficient_with_gradient(slip_speed, friction).0
    }

    /// The friction coefficient and its derivative dμ/d‖v_t‖ (s/m) at the
    /// given slip speed. The derivative feeds the implicit solver's Newton
    /// Jacobian.
    #[must_use]
    pub fn friction_coefficient_with_gradient(
        &self,
        slip_speed: f64,
        friction: &CoulombFriction,
    ) -> (f64, f64) {
        debug_assert!(slip_speed >= 0.0);
        let mu_s = friction.static_friction();
        let mu_d = friction.dynamic_friction();
        let s = slip_speed * self.inv_stiction_tolerance;
        if s >= 3.0 {
            (mu_d, 0.0)
        } else if s >= 1.0 {
            let (f, df) = step5_with_gradient((s - 1.0) / 2.0);
            let mu = mu_s - (mu_s - mu_d) * f;
            // Chain rule: d/d‖v_t‖ = d/ds · 1/v*, and ds_inner/ds = 1/2.
            let dmu = -(mu_s - mu_d) * df * 0.5 * self.inv_stiction_tolerance;
            (mu, dmu)
        } else {
            let (f, df) = step5_with_gradient(s);
            (mu_s * f, mu_s * df * self.inv_stiction_tolerance)
        }
    }
}

/// Quintic smoothstep `10x³ − 15x⁴ + 6x⁵` and its derivative on [0, 1].
fn step5_with_gradient(x: f64) -> (f64, f64) {
    debug_assert!((0.0..=1.0).contains(&x));
    let x2 = x * x;
    let x3 = x2 * x;
    let f = x3 * (10.0 + x * (6.0 * x - 15.0));
    // 30x² − 60x³ + 30x⁴ = 30x²(1 − x)²
    let df = 30.0 * x2 * (1.0 - x) * (1.0 - x);
    (f, df)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const V_STICTION: f64 = 1e-3;

    fn model() -> StribeckModel {
        StribeckModel::new(V_STICTION).unwrap()
    }

    fn friction() -> CoulombFriction {
        CoulombFriction::new(0.8, 0.5).unwrap()
    }

    #[test]
    fn test_rejects_nonpositive_tolerance() {
        assert!(StribeckModel::new(0.0).is_err());
        assert!(StribeckModel::new(-1e-3).is_err());
        assert!(StribeckModel::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_anchor_points() {
        let m = model();
        let f = friction();
        assert_relative_eq!(m.friction_coefficient(0.0, &f), 0.0, epsilon = 1e-14);
        assert_relative_eq!(m.friction_coefficient(V_STICTION, &f), 0.8, epsilon = 1e-12);
        assert_relative_eq!(
            m.friction_coefficient(3.0 * V_STICTION, &f),
            0.5,
            epsilon = 1e-12
        );
        assert_relative_eq!(m.friction_coefficient(1.0, &f), 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_continuity_at_branch_boundaries() {
        let m = model();
        let f = friction();
        let eps = 1e-9;
        for v in [V_STICTION, 3.0 * V_STICTION] {
            let below = m.friction_coefficient(v - eps, &f);
            let above = m.friction_coefficient(v + eps, &f);
            assert_relative_eq!(below, above, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_monotone_decreasing_on_stribeck_branch() {
        let m = model();
        let f = friction();
        let mut prev = m.friction_coefficient(V_STICTION, &f);
        let n = 50;
        for i in 1..=n {
            let v = V_STICTION + 2.0 * V_STICTION * f64::from(i) / f64::from(n);
            let mu = m.friction_coefficient(v, &f);
            assert!(mu <= prev + 1e-14, "not monotone at v = {v}: {mu} > {prev}");
            prev = mu;
        }
    }

    #[test]
    fn test_monotone_increasing_on_stiction_ramp() {
        let m = model();
        let f = friction();
        let mut prev = 0.0;
        let n = 50;
        for i in 1..=n {
            let v = V_STICTION * f64::from(i) / f64::from(n);
            let mu = m.friction_coefficient(v, &f);
            assert!(mu >= prev - 1e-14);
            prev = mu;
        }
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let m = model();
        let f = friction();
        let h = 1e-9;
        for v in [0.2e-3, 0.7e-3, 1.5e-3, 2.5e-3] {
            let (_, grad) = m.friction_coefficient_with_gradient(v, &f);
            let fd = (m.friction_coefficient(v + h, &f) - m.friction_coefficient(v - h, &f))
                / (2.0 * h);
            assert_relative_eq!(grad, fd, epsilon = 1e-4, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_gradient_zero_in_pure_sliding() {
        let m = model();
        let (_, grad) = m.friction_coefficient_with_gradient(1.0, &friction());
        assert_eq!(grad, 0.0);
    }
}
