//! Core data types for articulated rigid body simulation.
//!
//! This crate provides the foundational vocabulary shared by the plant, the
//! contact model, and the multibody tree:
//!
//! - [`BodyIndex`], [`GeometryId`], … - typed indices and identifiers
//! - [`CoulombFriction`] - static/dynamic friction pairs and their combination law
//! - [`SpatialVelocity`], [`SpatialForce`] - 6-vector spatial algebra with shifts
//! - [`PointPair`] - a penetration witness produced by the geometry engine
//! - [`MultibodyForces`] - the aggregate of body spatial forces and generalized forces
//! - [`ContactResults`] - per-contact reporting for analysis and visualization
//! - [`PlantError`] - every error the plant surfaces to its caller
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no dynamics, no integration, no
//! geometry queries. They are the common language between:
//!
//! - The plant and its time stepping (mbd-plant)
//! - The contact resolution pipeline (mbd-contact)
//! - The articulated tree (mbd-tree)
//! - Geometry engines implementing the plant's registration/query traits
//!
//! # Coordinate System
//!
//! - X: right, Y: forward, Z: up
//! - Right-handed
//! - World frame quantities carry a `_w` suffix or say so in their docs
//!
//! # Example
//!
//! ```
//! use mbd_types::CoulombFriction;
//!
//! let steel = CoulombFriction::new(0.8, 0.6).unwrap();
//! let ice = CoulombFriction::new(0.1, 0.05).unwrap();
//!
//! // Combined friction of a contact pair uses the harmonic mean.
//! let pair = steel.combine_with(&ice);
//! assert!(pair.static_friction() < ice.static_friction() * 2.0);
//! ```

#![doc(html_root_url = "https://docs.rs/mbd-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,    // Error docs added where non-obvious
)]

mod contact;
mod error;
mod forces;
mod friction;
mod geometry;
mod ids;
mod spatial;

pub use contact::{ContactInfo, ContactResults, PointPair};
pub use error::{PlantError, SolverFailure};
pub use forces::MultibodyForces;
pub use friction::CoulombFriction;
pub use geometry::{GeometryFrame, GeometryInstance, GeometrySet, Shape};
pub use ids::{
    ActuatorIndex, BodyIndex, EngineId, FrameId, GeometryId, JointIndex, ModelInstanceIndex,
    SourceId,
};
pub use spatial::{SpatialForce, SpatialVelocity};

// Re-export math types for convenience.
pub use nalgebra::{DMatrix, DVector, Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for plant operations.
pub type Result<T> = std::result::Result<T, PlantError>;
