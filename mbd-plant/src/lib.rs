//! Rigid multibody dynamics plant with compliant frictional contact.
//!
//! [`MultibodyPlant`] time-steps a tree of rigid bodies connected by joints,
//! under gravity, joint actuation, joint damping, and frictional contact
//! against geometry registered with an external geometry engine. Two
//! modeling modes share one API, selected by the constructor's `time_step`:
//!
//! - **Continuous** (`time_step == 0`): [`MultibodyPlant::calc_time_derivatives`]
//!   produces `ẋ = f(x, u)` with contact handled by a compliant penalty
//!   force (Hunt–Crossley normal law plus Stribeck-regularized friction).
//! - **Discrete** (`time_step > 0`): [`MultibodyPlant::calc_discrete_variable_updates`]
//!   advances `x_{k+1} = g(x_k, u_k, Δt)` by handing the two-way coupled
//!   normal/tangential problem to an implicit Stribeck solver.
//!
//! # Lifecycle
//!
//! A plant is built (bodies, joints, actuators, geometry), then
//! [`finalized`](MultibodyPlant::finalize) exactly once. Finalize freezes
//! the topology, installs collision filters on the geometry engine, declares
//! state and ports, and sizes the contact machinery. Operational calls
//! before finalize and mutations after it fail with the corresponding
//! lifecycle error.
//!
//! # Geometry
//!
//! The plant never does collision detection itself. It registers frames and
//! geometries with a [`GeometryEngine`] and consumes penetration witnesses
//! from a [`GeometryQuery`] connected to its context. Collision filters
//! installed at finalize guarantee that visual geometry never collides and
//! that bodies joined by a joint (world excepted) do not collide with each
//! other.
//!
//! # Contexts
//!
//! All state lives in a caller-owned [`PlantContext`]; the plant itself is
//! immutable during evaluation, so independent contexts can be stepped in
//! parallel against one plant.

#![doc(html_root_url = "https://docs.rs/mbd-plant/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,    // Error docs added where non-obvious
    clippy::needless_range_loop,   // Index loops mirror the math
)]

mod contact_jacobians;
mod context;
mod engine;
mod penalty;
mod plant;

pub use context::{InputPortIndex, OutputPortIndex, PlantContext};
pub use engine::{FramePoseVector, GeometryEngine, GeometryQuery};
pub use plant::MultibodyPlant;

// The plant's public vocabulary.
pub use mbd_contact::{PenaltyParameters, SolverParameters, StribeckModel};
pub use mbd_types::{
    BodyIndex, ContactInfo, ContactResults, CoulombFriction, EngineId, FrameId, GeometryFrame,
    GeometryId, GeometryInstance, GeometrySet, JointIndex, ModelInstanceIndex, MultibodyForces,
    PlantError, PointPair, Result, Shape, SourceId, SpatialForce, SpatialVelocity,
};
pub use mbd_tree::{Joint, JointKind, MassProperties, MultibodyTree, RigidBody};

// Re-export math types for convenience.
pub use nalgebra::{DVector, Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3};
