//! Traits the plant consumes from a geometry engine.
//!
//! The engine owns collision detection; the plant only registers content,
//! installs filters, and reads penetration witnesses back. Registration
//! happens pre-finalize through [`GeometryEngine`]; queries happen at
//! evaluation time through a [`GeometryQuery`] handle connected to the
//! plant's context.

use nalgebra::Isometry3;

use mbd_types::{
    EngineId, FrameId, GeometryFrame, GeometryId, GeometryInstance, GeometrySet, PointPair, Result,
    SourceId,
};

/// Registration and filtering surface of a geometry engine.
///
/// The plant verifies that every call after
/// [`MultibodyPlant::register_as_source`](crate::MultibodyPlant::register_as_source)
/// targets the same engine instance via [`engine_id`](Self::engine_id);
/// implementations must mint a distinct id per live engine (a process-wide
/// counter is sufficient).
pub trait GeometryEngine {
    /// A stable identity for this engine instance.
    fn engine_id(&self) -> EngineId;

    /// Register a new geometry source and return its id.
    fn register_source(&mut self) -> SourceId;

    /// Register a kinematic frame under a source.
    fn register_frame(&mut self, source: SourceId, frame: GeometryFrame) -> Result<FrameId>;

    /// Register geometry attached to a previously registered frame.
    fn register_geometry(
        &mut self,
        source: SourceId,
        frame: FrameId,
        instance: GeometryInstance,
    ) -> Result<GeometryId>;

    /// Register geometry fixed to the world.
    fn register_anchored_geometry(
        &mut self,
        source: SourceId,
        instance: GeometryInstance,
    ) -> Result<GeometryId>;

    /// Exclude collisions between any two members of `set`.
    fn exclude_collisions_within(&mut self, set: &GeometrySet);

    /// Exclude collisions between members of `set_a` and members of `set_b`.
    fn exclude_collisions_between(&mut self, set_a: &GeometrySet, set_b: &GeometrySet);
}

/// Query surface of a geometry engine, connected to a context as the
/// plant's geometry-query input.
pub trait GeometryQuery {
    /// All current penetrations between unfiltered collision geometry
    /// pairs.
    fn compute_point_pair_penetration(&self) -> Vec<PointPair>;
}

/// The plant's geometry-pose output: one world pose per registered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePoseVector {
    source_id: SourceId,
    poses: Vec<(FrameId, Isometry3<f64>)>,
}

impl FramePoseVector {
    pub(crate) fn new(source_id: SourceId, poses: Vec<(FrameId, Isometry3<f64>)>) -> Self {
        Self { source_id, poses }
    }

    /// The source that registered these frames.
    #[must_use]
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// All `(frame, X_WB)` entries.
    #[must_use]
    pub fn poses(&self) -> &[(FrameId, Isometry3<f64>)] {
        &self.poses
    }

    /// The pose of one frame, if present.
    #[must_use]
    pub fn value(&self, frame: FrameId) -> Option<&Isometry3<f64>> {
        self.poses
            .iter()
            .find(|(id, _)| *id == frame)
            .map(|(_, pose)| pose)
    }

    /// Number of frames reported.
    #[must_use]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Whether no frames are reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
