//! Rigid bodies and their mass properties.

use nalgebra::{Matrix3, Vector3};

use mbd_types::{ModelInstanceIndex, PlantError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mass, center of mass, and rotational inertia of a rigid body.
///
/// The center of mass is the offset `p_BoBcm` from the body origin, and the
/// inertia tensor is taken about the center of mass, both expressed in the
/// body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Body mass (kg).
    pub mass: f64,
    /// Center of mass offset from the body origin, body frame (m).
    pub center_of_mass: Vector3<f64>,
    /// Rotational inertia about the center of mass, body frame (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Create mass properties, validating that the mass is non-negative.
    pub fn new(mass: f64, center_of_mass: Vector3<f64>, inertia: Matrix3<f64>) -> Result<Self> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "body mass must be finite and non-negative, got {mass}"
            )));
        }
        Ok(Self {
            mass,
            center_of_mass,
            inertia,
        })
    }

    /// A point mass at the body origin (zero rotational inertia).
    #[must_use]
    pub fn point_mass(mass: f64) -> Self {
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::zeros(),
        }
    }

    /// A point mass at the given offset from the body origin.
    #[must_use]
    pub fn point_mass_at(mass: f64, center_of_mass: Vector3<f64>) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia: Matrix3::zeros(),
        }
    }

    /// A uniform solid sphere centered at the body origin.
    #[must_use]
    pub fn solid_sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal_element(i),
        }
    }

    /// Massless properties, for frames and fixed bases.
    #[must_use]
    pub fn massless() -> Self {
        Self {
            mass: 0.0,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::zeros(),
        }
    }
}

/// A rigid body in the tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    name: String,
    instance: ModelInstanceIndex,
    mass_properties: MassProperties,
}

impl RigidBody {
    pub(crate) fn new(
        name: impl Into<String>,
        instance: ModelInstanceIndex,
        mass_properties: MassProperties,
    ) -> Self {
        Self {
            name: name.into(),
            instance,
            mass_properties,
        }
    }

    /// The body name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model instance this body belongs to.
    #[must_use]
    pub fn model_instance(&self) -> ModelInstanceIndex {
        self.instance
    }

    /// The body's mass properties.
    #[must_use]
    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass_properties
    }

    /// The body's default mass (kg).
    #[must_use]
    pub fn default_mass(&self) -> f64 {
        self.mass_properties.mass
    }
}
