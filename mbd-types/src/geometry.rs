//! Geometry registration data exchanged with a geometry engine.

use nalgebra::{Isometry3, Vector3};

use crate::ids::{FrameId, GeometryId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A collision/visual shape, described in its own geometry frame G.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// A sphere centered at Go.
    Sphere {
        /// Sphere radius (m).
        radius: f64,
    },
    /// A half space filling `z ≤ 0` in frame G, with outward normal +Gz.
    HalfSpace,
    /// An axis-aligned box centered at Go.
    Box {
        /// Half extents along Gx, Gy, Gz (m).
        half_extents: Vector3<f64>,
    },
}

impl Shape {
    /// Create a sphere shape.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a half-space shape.
    #[must_use]
    pub fn half_space() -> Self {
        Self::HalfSpace
    }

    /// Create a box shape from its half extents.
    #[must_use]
    pub fn box_shape(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }
}

/// A shape plus its pose, handed to the engine at registration.
///
/// The pose is `X_FG` for frame-attached geometry (geometry frame G in the
/// registration frame F) or `X_WG` for anchored geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometryInstance {
    /// Pose of the geometry frame in its registration frame.
    pub pose: Isometry3<f64>,
    /// The shape itself.
    pub shape: Shape,
    /// Human-readable name, for diagnostics.
    pub name: String,
}

impl GeometryInstance {
    /// Create a geometry instance.
    #[must_use]
    pub fn new(pose: Isometry3<f64>, shape: Shape, name: impl Into<String>) -> Self {
        Self {
            pose,
            shape,
            name: name.into(),
        }
    }
}

/// A kinematic frame to register with the engine, one per body with geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometryFrame {
    /// Human-readable frame name (typically the body name).
    pub name: String,
}

impl GeometryFrame {
    /// Create a frame with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A set of frames and geometries used to express collision filters.
///
/// Adding a frame implicitly covers every geometry attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometrySet {
    frames: Vec<FrameId>,
    geometries: Vec<GeometryId>,
}

impl GeometrySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding a single frame.
    #[must_use]
    pub fn from_frame(frame: FrameId) -> Self {
        Self {
            frames: vec![frame],
            geometries: Vec::new(),
        }
    }

    /// Add a frame (and implicitly all geometry attached to it).
    pub fn add_frame(&mut self, frame: FrameId) {
        self.frames.push(frame);
    }

    /// Add a single geometry.
    pub fn add_geometry(&mut self, geometry: GeometryId) {
        self.geometries.push(geometry);
    }

    /// Add several geometries.
    pub fn add_geometries(&mut self, geometries: impl IntoIterator<Item = GeometryId>) {
        self.geometries.extend(geometries);
    }

    /// The frames in this set.
    #[must_use]
    pub fn frames(&self) -> &[FrameId] {
        &self.frames
    }

    /// The directly-added geometries in this set.
    #[must_use]
    pub fn geometries(&self) -> &[GeometryId] {
        &self.geometries
    }

    /// Whether the set names no frames and no geometries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.geometries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_set() {
        let mut set = GeometrySet::new();
        assert!(set.is_empty());

        set.add_frame(FrameId::new(1));
        set.add_geometries([GeometryId::new(10), GeometryId::new(11)]);
        assert!(!set.is_empty());
        assert_eq!(set.frames(), &[FrameId::new(1)]);
        assert_eq!(set.geometries().len(), 2);
    }

    #[test]
    fn test_shape_constructors() {
        assert_eq!(Shape::sphere(0.5), Shape::Sphere { radius: 0.5 });
        assert_eq!(Shape::half_space(), Shape::HalfSpace);
    }
}
