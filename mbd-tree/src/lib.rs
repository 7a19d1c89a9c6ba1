//! Articulated rigid body tree.
//!
//! A [`MultibodyTree`] is the kinematic and dynamic backbone a plant steps:
//! bodies connected by joints in a tree rooted at the world, with minimal
//! coordinates `q` (size `nq`) and generalized velocities `v` (size `nv`,
//! generally `nq ≠ nv` because free joints use quaternions).
//!
//! The tree provides:
//!
//! - Forward position and velocity kinematics into caller-owned caches
//! - Inverse dynamics via a world-frame Newton–Euler recursion
//! - The mass matrix, assembled column-by-column from inverse dynamics
//! - Point Jacobians by walking the kinematic chain
//! - The quaternion-aware maps between `q̇` and `v`
//! - Force elements (uniform gravity), joint damping, and joint actuators
//!   grouped into model instances
//!
//! # Lifecycle
//!
//! Bodies, joints, and actuators are added first; [`MultibodyTree::finalize`]
//! then assigns state offsets and freezes the topology. Kinematics and
//! dynamics queries before finalize, or mutations after it, fail with the
//! corresponding lifecycle error.
//!
//! # Conventions
//!
//! - Body poses `X_WB` place the body frame B in the world; spatial
//!   velocities are taken about the body origin Bo, expressed in world.
//! - Free joint coordinates are `[q_w, q_x, q_y, q_z, p_x, p_y, p_z]` and
//!   velocities `[ω; v]` with ω the world-frame angular velocity.
//! - Bodies are numbered in registration order and a joint's parent must be
//!   registered before its child, so body index order is topological.

#![doc(html_root_url = "https://docs.rs/mbd-tree/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,    // Error docs added where non-obvious
    clippy::needless_range_loop,   // Index loops mirror the math
)]

mod body;
mod dynamics;
mod joint;
mod tree;

pub use body::{MassProperties, RigidBody};
pub use joint::{Joint, JointActuator, JointKind};
pub use tree::{MultibodyTree, PositionKinematicsCache, VelocityKinematicsCache};
