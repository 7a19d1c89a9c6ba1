//! Shared test doubles: a recording geometry engine and an analytic scene.
//!
//! `TestEngine` implements the plant's registration trait, records every
//! filter call for contract assertions, and shares its scene with
//! `SceneQuery`, which answers penetration queries for spheres and half
//! spaces while honoring the recorded exclusions.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{Isometry3, Point3, Vector3};

use mbd_plant::{
    EngineId, FrameId, GeometryEngine, GeometryFrame, GeometryId, GeometryInstance, GeometryQuery,
    GeometrySet, MultibodyPlant, PlantContext, PointPair, Result, Shape, SourceId,
};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// One registered geometry with its attachment.
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    pub id: GeometryId,
    /// `None` for anchored geometry (pose is already world-frame).
    pub frame: Option<FrameId>,
    pub instance: GeometryInstance,
}

/// Everything the engine has been told, shared with the query side.
#[derive(Debug, Default)]
pub struct SceneState {
    pub frames: Vec<(FrameId, GeometryFrame)>,
    pub frame_poses: HashMap<FrameId, Isometry3<f64>>,
    pub geometries: Vec<SceneGeometry>,
    pub exclusions_within: Vec<GeometrySet>,
    pub exclusions_between: Vec<(GeometrySet, GeometrySet)>,
}

impl SceneState {
    fn world_pose(&self, geometry: &SceneGeometry) -> Isometry3<f64> {
        match geometry.frame {
            Some(frame) => {
                let frame_pose = self
                    .frame_poses
                    .get(&frame)
                    .copied()
                    .unwrap_or_else(Isometry3::identity);
                frame_pose * geometry.instance.pose
            }
            None => geometry.instance.pose,
        }
    }

    fn set_contains(&self, set: &GeometrySet, geometry: &SceneGeometry) -> bool {
        if set.geometries().contains(&geometry.id) {
            return true;
        }
        geometry
            .frame
            .is_some_and(|frame| set.frames().contains(&frame))
    }

    fn pair_excluded(&self, a: &SceneGeometry, b: &SceneGeometry) -> bool {
        for set in &self.exclusions_within {
            if self.set_contains(set, a) && self.set_contains(set, b) {
                return true;
            }
        }
        for (set_a, set_b) in &self.exclusions_between {
            let forward = self.set_contains(set_a, a) && self.set_contains(set_b, b);
            let backward = self.set_contains(set_a, b) && self.set_contains(set_b, a);
            if forward || backward {
                return true;
            }
        }
        false
    }
}

/// A geometry engine test double backed by [`SceneState`].
pub struct TestEngine {
    id: EngineId,
    next_id: u64,
    sources: Vec<SourceId>,
    scene: Rc<RefCell<SceneState>>,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    pub fn new() -> Self {
        Self {
            id: EngineId::new(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed)),
            next_id: 1,
            sources: Vec::new(),
            scene: Rc::new(RefCell::new(SceneState::default())),
        }
    }

    fn mint(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Shared handle to the scene for assertions and pose updates.
    pub fn scene(&self) -> Rc<RefCell<SceneState>> {
        Rc::clone(&self.scene)
    }

    /// A query handle suitable for `PlantContext::connect_geometry_query`.
    pub fn query(&self) -> Box<SceneQuery> {
        Box::new(SceneQuery {
            scene: Rc::clone(&self.scene),
        })
    }
}

impl GeometryEngine for TestEngine {
    fn engine_id(&self) -> EngineId {
        self.id
    }

    fn register_source(&mut self) -> SourceId {
        let source = SourceId::new(self.mint());
        self.sources.push(source);
        source
    }

    fn register_frame(&mut self, source: SourceId, frame: GeometryFrame) -> Result<FrameId> {
        assert!(self.sources.contains(&source), "unknown source {source}");
        let id = FrameId::new(self.mint());
        self.scene.borrow_mut().frames.push((id, frame));
        Ok(id)
    }

    fn register_geometry(
        &mut self,
        source: SourceId,
        frame: FrameId,
        instance: GeometryInstance,
    ) -> Result<GeometryId> {
        assert!(self.sources.contains(&source), "unknown source {source}");
        let id = GeometryId::new(self.mint());
        self.scene.borrow_mut().geometries.push(SceneGeometry {
            id,
            frame: Some(frame),
            instance,
        });
        Ok(id)
    }

    fn register_anchored_geometry(
        &mut self,
        source: SourceId,
        instance: GeometryInstance,
    ) -> Result<GeometryId> {
        assert!(self.sources.contains(&source), "unknown source {source}");
        let id = GeometryId::new(self.mint());
        self.scene.borrow_mut().geometries.push(SceneGeometry {
            id,
            frame: None,
            instance,
        });
        Ok(id)
    }

    fn exclude_collisions_within(&mut self, set: &GeometrySet) {
        self.scene
            .borrow_mut()
            .exclusions_within
            .push(set.clone());
    }

    fn exclude_collisions_between(&mut self, set_a: &GeometrySet, set_b: &GeometrySet) {
        self.scene
            .borrow_mut()
            .exclusions_between
            .push((set_a.clone(), set_b.clone()));
    }
}

/// Penetration queries over the shared scene.
pub struct SceneQuery {
    scene: Rc<RefCell<SceneState>>,
}

impl GeometryQuery for SceneQuery {
    fn compute_point_pair_penetration(&self) -> Vec<PointPair> {
        let scene = self.scene.borrow();
        let mut pairs = Vec::new();
        for i in 0..scene.geometries.len() {
            for j in (i + 1)..scene.geometries.len() {
                let a = &scene.geometries[i];
                let b = &scene.geometries[j];
                if scene.pair_excluded(a, b) {
                    continue;
                }
                let pose_a = scene.world_pose(a);
                let pose_b = scene.world_pose(b);
                if let Some(pair) = narrow_phase(a, &pose_a, b, &pose_b) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }
}

/// Analytic narrow phase for the shape pairs the tests use.
fn narrow_phase(
    a: &SceneGeometry,
    pose_a: &Isometry3<f64>,
    b: &SceneGeometry,
    pose_b: &Isometry3<f64>,
) -> Option<PointPair> {
    match (&a.instance.shape, &b.instance.shape) {
        (Shape::Sphere { radius }, Shape::HalfSpace) => {
            sphere_half_space(a.id, *radius, pose_a, b.id, pose_b)
        }
        (Shape::HalfSpace, Shape::Sphere { radius }) => {
            sphere_half_space(b.id, *radius, pose_b, a.id, pose_a)
        }
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(a.id, *ra, pose_a, b.id, *rb, pose_b)
        }
        _ => None,
    }
}

fn sphere_half_space(
    sphere_id: GeometryId,
    radius: f64,
    sphere_pose: &Isometry3<f64>,
    half_space_id: GeometryId,
    half_space_pose: &Isometry3<f64>,
) -> Option<PointPair> {
    let normal = half_space_pose.rotation * Vector3::z();
    let center = sphere_pose.translation.vector;
    let distance = normal.dot(&(center - half_space_pose.translation.vector));
    let depth = radius - distance;
    if depth <= 0.0 {
        return None;
    }
    Some(PointPair {
        id_a: sphere_id,
        id_b: half_space_id,
        point_on_a: Point3::from(center - radius * normal),
        point_on_b: Point3::from(center - distance * normal),
        normal_from_b: normal,
        depth,
    })
}

fn sphere_sphere(
    id_a: GeometryId,
    radius_a: f64,
    pose_a: &Isometry3<f64>,
    id_b: GeometryId,
    radius_b: f64,
    pose_b: &Isometry3<f64>,
) -> Option<PointPair> {
    let center_a = pose_a.translation.vector;
    let center_b = pose_b.translation.vector;
    let offset = center_a - center_b;
    let distance = offset.norm();
    if distance < 1e-12 {
        return None;
    }
    let depth = radius_a + radius_b - distance;
    if depth <= 0.0 {
        return None;
    }
    let normal = offset / distance;
    Some(PointPair {
        id_a,
        id_b,
        point_on_a: Point3::from(center_a - radius_a * normal),
        point_on_b: Point3::from(center_b + radius_b * normal),
        normal_from_b: normal,
        depth,
    })
}

/// Push the plant's current frame poses into the scene, so the next query
/// sees the context's configuration.
pub fn sync_scene_poses(
    plant: &MultibodyPlant,
    context: &PlantContext,
    scene: &Rc<RefCell<SceneState>>,
) {
    let frame_poses = plant
        .calc_frame_poses_output(context)
        .expect("frame poses output");
    let mut scene = scene.borrow_mut();
    for (frame, pose) in frame_poses.poses() {
        scene.frame_poses.insert(*frame, *pose);
    }
}
