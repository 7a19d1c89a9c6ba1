//! Compliant contact model for articulated rigid body simulation.
//!
//! This crate provides the contact resolution pieces of the plant:
//!
//! - [`StribeckModel`] - a regularized friction coefficient μ(‖v_t‖) that
//!   blends static and dynamic friction with a C² quintic ramp, so the
//!   tangential force law stays smooth through stiction
//! - [`PenaltyParameters`] - stiffness and dissipation derived from a single
//!   user-facing penetration allowance
//! - [`ImplicitStribeckSolver`] - the discrete-time solver for the two-way
//!   coupled normal-compliance / regularized-friction momentum problem
//!
//! # Contact Model
//!
//! The normal force is a compliant spring-damper law
//!
//! ```text
//! fₙ = k·x·(1 + d·ẋ)₊
//! ```
//!
//! where `x` is the penetration depth and `ẋ` its rate, continuous at
//! liftoff. The tangential force is regularized Coulomb friction
//!
//! ```text
//! f_t = −μ(‖v_t‖) · fₙ · v_t/‖v_t‖
//! ```
//!
//! with μ the Stribeck curve. In continuous mode the plant evaluates these
//! laws directly; in discrete mode the solver treats both implicitly in the
//! next-step velocities.
//!
//! # Example
//!
//! ```
//! use mbd_contact::StribeckModel;
//! use mbd_types::CoulombFriction;
//!
//! let model = StribeckModel::new(1e-3).unwrap();
//! let friction = CoulombFriction::new(0.8, 0.5).unwrap();
//!
//! // At the stiction tolerance the full static coefficient is available.
//! let mu = model.friction_coefficient(1e-3, &friction);
//! assert!((mu - 0.8).abs() < 1e-12);
//!
//! // Well past the stiction band only dynamic friction remains.
//! let mu = model.friction_coefficient(1.0, &friction);
//! assert!((mu - 0.5).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/mbd-contact/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,    // Error docs added where non-obvious
)]

mod params;
mod solver;
mod stribeck;

pub use params::PenaltyParameters;
pub use solver::{ImplicitStribeckSolver, ProblemData, SolverParameters, SolverSolution};
pub use stribeck::{StribeckModel, DEFAULT_STICTION_TOLERANCE};
