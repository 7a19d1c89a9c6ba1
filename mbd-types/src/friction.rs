//! Coulomb friction coefficients and their combination law.

use crate::{PlantError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static and dynamic Coulomb friction coefficients for a surface.
///
/// Both coefficients are dimensionless and non-negative, and the dynamic
/// coefficient never exceeds the static one; the constructor enforces this.
///
/// # Combination
///
/// The friction of a *contact pair* is formed with the harmonic mean of each
/// coefficient:
///
/// ```text
/// μ = 2 μ_A μ_B / (μ_A + μ_B)
/// ```
///
/// which is zero whenever either surface is frictionless, and symmetric in
/// the two surfaces.
///
/// # Example
///
/// ```
/// use mbd_types::CoulombFriction;
///
/// let a = CoulombFriction::new(1.0, 1.0).unwrap();
/// let b = CoulombFriction::new(1.0, 1.0).unwrap();
/// let pair = a.combine_with(&b);
/// assert!((pair.static_friction() - 1.0).abs() < 1e-14);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoulombFriction {
    static_friction: f64,
    dynamic_friction: f64,
}

impl CoulombFriction {
    /// Create friction coefficients.
    ///
    /// Fails with [`PlantError::InvalidArgument`] if either coefficient is
    /// negative, not finite, or if `dynamic_friction > static_friction`.
    pub fn new(static_friction: f64, dynamic_friction: f64) -> Result<Self> {
        if !static_friction.is_finite() || static_friction < 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "static friction must be finite and non-negative, got {static_friction}"
            )));
        }
        if !dynamic_friction.is_finite() || dynamic_friction < 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "dynamic friction must be finite and non-negative, got {dynamic_friction}"
            )));
        }
        if dynamic_friction > static_friction {
            return Err(PlantError::invalid_argument(format!(
                "dynamic friction ({dynamic_friction}) must not exceed \
                 static friction ({static_friction})"
            )));
        }
        Ok(Self {
            static_friction,
            dynamic_friction,
        })
    }

    /// A frictionless surface (μ_s = μ_d = 0).
    #[must_use]
    pub fn frictionless() -> Self {
        Self {
            static_friction: 0.0,
            dynamic_friction: 0.0,
        }
    }

    /// The static friction coefficient μ_s.
    #[must_use]
    pub fn static_friction(&self) -> f64 {
        self.static_friction
    }

    /// The dynamic (kinetic) friction coefficient μ_d.
    #[must_use]
    pub fn dynamic_friction(&self) -> f64 {
        self.dynamic_friction
    }

    /// Combine the friction of two surfaces into that of their contact pair.
    ///
    /// Uses the harmonic mean per coefficient; if a sum is zero the result
    /// is zero. The result again satisfies `μ_d ≤ μ_s`.
    #[must_use]
    pub fn combine_with(&self, other: &Self) -> Self {
        Self {
            static_friction: harmonic_mean(self.static_friction, other.static_friction),
            dynamic_friction: harmonic_mean(self.dynamic_friction, other.dynamic_friction),
        }
    }
}

/// Harmonic mean `2ab / (a + b)`, zero when the sum vanishes.
fn harmonic_mean(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum == 0.0 {
        0.0
    } else {
        2.0 * a * b / sum
    }
}
