//! Joints and joint actuators.

use nalgebra::{Isometry3, Vector3};

use mbd_types::{BodyIndex, JointIndex, ModelInstanceIndex};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of a joint, with its fixed modeling data.
///
/// Axes are unit vectors expressed in the joint frame J, which is placed on
/// the parent body by the joint's `pose_in_parent`. The child body frame
/// coincides with J at the zero configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// Six degrees of freedom; positions are a unit quaternion plus a world
    /// translation, velocities are `[ω; v]` in world. Free joints attach
    /// directly to the world.
    Free,
    /// One rotational degree of freedom about `axis`.
    Revolute {
        /// Rotation axis, unit length, joint frame.
        axis: Vector3<f64>,
    },
    /// One translational degree of freedom along `axis`.
    Prismatic {
        /// Translation axis, unit length, joint frame.
        axis: Vector3<f64>,
    },
    /// Zero degrees of freedom; the child is rigidly fixed to the parent.
    Weld,
}

impl JointKind {
    /// Number of position coordinates this joint contributes.
    #[must_use]
    pub fn num_positions(&self) -> usize {
        match self {
            Self::Free => 7,
            Self::Revolute { .. } | Self::Prismatic { .. } => 1,
            Self::Weld => 0,
        }
    }

    /// Number of velocity coordinates this joint contributes.
    #[must_use]
    pub fn num_velocities(&self) -> usize {
        match self {
            Self::Free => 6,
            Self::Revolute { .. } | Self::Prismatic { .. } => 1,
            Self::Weld => 0,
        }
    }
}

/// A joint connecting a parent body to a child body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    name: String,
    instance: ModelInstanceIndex,
    parent: BodyIndex,
    child: BodyIndex,
    kind: JointKind,
    pose_in_parent: Isometry3<f64>,
    damping: f64,
    // Assigned at finalize.
    pub(crate) q_start: usize,
    pub(crate) v_start: usize,
}

impl Joint {
    pub(crate) fn new(
        name: impl Into<String>,
        instance: ModelInstanceIndex,
        parent: BodyIndex,
        child: BodyIndex,
        kind: JointKind,
        pose_in_parent: Isometry3<f64>,
        damping: f64,
    ) -> Self {
        Self {
            name: name.into(),
            instance,
            parent,
            child,
            kind,
            pose_in_parent,
            damping,
            q_start: 0,
            v_start: 0,
        }
    }

    /// The joint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model instance this joint belongs to.
    #[must_use]
    pub fn model_instance(&self) -> ModelInstanceIndex {
        self.instance
    }

    /// The parent (inboard) body.
    #[must_use]
    pub fn parent_body(&self) -> BodyIndex {
        self.parent
    }

    /// The child (outboard) body.
    #[must_use]
    pub fn child_body(&self) -> BodyIndex {
        self.child
    }

    /// The joint kind.
    #[must_use]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Pose `X_PJ` of the joint frame in the parent body frame.
    #[must_use]
    pub fn pose_in_parent(&self) -> &Isometry3<f64> {
        &self.pose_in_parent
    }

    /// Viscous damping coefficient applied per degree of freedom.
    #[must_use]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Number of position coordinates.
    #[must_use]
    pub fn num_positions(&self) -> usize {
        self.kind.num_positions()
    }

    /// Number of velocity coordinates.
    #[must_use]
    pub fn num_velocities(&self) -> usize {
        self.kind.num_velocities()
    }

    /// Offset of this joint's coordinates in `q`. Valid after finalize.
    #[must_use]
    pub fn position_start(&self) -> usize {
        self.q_start
    }

    /// Offset of this joint's coordinates in `v`. Valid after finalize.
    #[must_use]
    pub fn velocity_start(&self) -> usize {
        self.v_start
    }
}

/// An actuator driving a single-degree-of-freedom joint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointActuator {
    name: String,
    instance: ModelInstanceIndex,
    joint: JointIndex,
}

impl JointActuator {
    pub(crate) fn new(
        name: impl Into<String>,
        instance: ModelInstanceIndex,
        joint: JointIndex,
    ) -> Self {
        Self {
            name: name.into(),
            instance,
            joint,
        }
    }

    /// The actuator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model instance this actuator belongs to (its joint's instance).
    #[must_use]
    pub fn model_instance(&self) -> ModelInstanceIndex {
        self.instance
    }

    /// The joint this actuator drives.
    #[must_use]
    pub fn joint(&self) -> JointIndex {
        self.joint
    }
}
