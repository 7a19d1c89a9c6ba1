//! Typed indices and identifiers.
//!
//! Two families live here. *Indices* (`BodyIndex`, `JointIndex`, …) are dense
//! and ordinal: they index the plant's internal arrays, and index 0 of
//! [`BodyIndex`] is always the world. *Identifiers* (`GeometryId`,
//! `FrameId`, …) are opaque handles minted by a geometry engine; they carry
//! no ordering semantics.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! dense_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub usize);

        impl $name {
            /// Create a new index.
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the raw index value.
            #[must_use]
            pub const fn raw(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new identifier from its raw value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw identifier value.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

dense_index! {
    /// Dense index of a body in the plant.
    ///
    /// Index 0 is the world body. Bodies are numbered in registration order,
    /// which is also a valid topological order (a joint's parent body is
    /// always registered before its child).
    BodyIndex
}

dense_index! {
    /// Dense index of a joint in the plant.
    JointIndex
}

dense_index! {
    /// Dense index of a joint actuator in the plant.
    ActuatorIndex
}

dense_index! {
    /// Dense index of a model instance.
    ///
    /// Instance 0 groups the world body; instance 1 is the default instance
    /// for elements registered without an explicit grouping.
    ModelInstanceIndex
}

impl BodyIndex {
    /// The index of the world body.
    #[must_use]
    pub const fn world() -> Self {
        Self(0)
    }

    /// Whether this index refers to the world body.
    #[must_use]
    pub const fn is_world(self) -> bool {
        self.0 == 0
    }
}

impl ModelInstanceIndex {
    /// The instance grouping the world body.
    #[must_use]
    pub const fn world() -> Self {
        Self(0)
    }

    /// The default instance for elements registered without one.
    #[must_use]
    pub const fn default_instance() -> Self {
        Self(1)
    }
}

opaque_id! {
    /// Identifier of a geometry registered with a geometry engine.
    GeometryId
}

opaque_id! {
    /// Identifier of a kinematic frame registered with a geometry engine.
    FrameId
}

opaque_id! {
    /// Identifier of a geometry source registered with a geometry engine.
    SourceId
}

opaque_id! {
    /// Identity of a geometry engine instance.
    ///
    /// Implementations must mint a value unique per live engine so that the
    /// plant can detect registration calls that target a different engine
    /// than the one used at source registration.
    EngineId
}
