//! Error types for plant operations.

use thiserror::Error;

/// Diagnostic kind reported by the implicit Stribeck solver on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverFailure {
    /// The Newton iteration hit its iteration budget before converging.
    MaxIterationsReached,
    /// A linear solve inside the Newton iteration failed (singular system).
    LinearSolverFailure,
}

impl std::fmt::Display for SolverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxIterationsReached => write!(f, "maximum iterations reached"),
            Self::LinearSolverFailure => write!(f, "linear solver failure"),
        }
    }
}

/// Errors that can occur while building, finalizing, or evaluating a plant.
///
/// None of these are recovered internally; they propagate to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlantError {
    /// An operational call was made before `finalize()`.
    #[error("pre-finalize calls to '{method}' are not allowed; you must call finalize() first")]
    PreFinalizeUse {
        /// Name of the offending method.
        method: &'static str,
    },

    /// A topology-mutating call was made after `finalize()`.
    #[error(
        "post-finalize calls to '{method}' are not allowed; \
         calls to this method must happen before finalize()"
    )]
    PostFinalizeMutation {
        /// Name of the offending method.
        method: &'static str,
    },

    /// A geometry operation targeted a different engine than the one used at
    /// source registration.
    #[error(
        "geometry registration calls must be performed on the same geometry engine \
         used on the first call to register_as_source()"
    )]
    GeometryEngineMismatch,

    /// The plant is registered as a geometry source but `finalize()` was
    /// invoked without the owning engine.
    #[error(
        "this plant is registered as a geometry source; \
         finalize() must be invoked with that geometry engine"
    )]
    GeometryEngineMissing,

    /// `register_as_source()` was called twice.
    #[error("this plant is already registered as a geometry source")]
    DuplicateSourceRegistration,

    /// A caller-supplied argument was invalid.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of what was wrong.
        reason: String,
    },

    /// A vector input port was evaluated while unconnected.
    #[error("input port '{port}' is not connected")]
    InputPortNotConnected {
        /// Name of the unconnected port.
        port: String,
    },

    /// Contact computation was requested while the geometry query input is
    /// not connected.
    #[error(
        "this plant registered geometry for contact handling, \
         but its geometry query input port is not connected"
    )]
    QueryPortDisconnected,

    /// A geometry query was requested on a scalar type the query path does
    /// not support. Reserved for builds with scalars other than `f64`.
    #[error("contact queries only support f64; got scalar type '{scalar}'")]
    ScalarNotSupported {
        /// Name of the unsupported scalar type.
        scalar: &'static str,
    },

    /// The implicit Stribeck solver returned a non-success status.
    #[error("implicit Stribeck solver did not converge: {0}")]
    SolverDidNotConverge(SolverFailure),
}

impl PlantError {
    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Check whether this is a lifecycle error (wrong side of finalize).
    #[must_use]
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Self::PreFinalizeUse { .. } | Self::PostFinalizeMutation { .. }
        )
    }

    /// Check whether this is a solver convergence failure.
    #[must_use]
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, Self::SolverDidNotConverge(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlantError::PreFinalizeUse {
            method: "get_state_output_port",
        };
        assert!(err.to_string().contains("get_state_output_port"));
        assert!(err.to_string().contains("finalize()"));

        let err = PlantError::SolverDidNotConverge(SolverFailure::MaxIterationsReached);
        assert!(err.to_string().contains("maximum iterations"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(PlantError::PostFinalizeMutation { method: "add_joint" }.is_lifecycle_error());
        assert!(!PlantError::QueryPortDisconnected.is_lifecycle_error());
        assert!(
            PlantError::SolverDidNotConverge(SolverFailure::LinearSolverFailure)
                .is_solver_failure()
        );
    }
}
