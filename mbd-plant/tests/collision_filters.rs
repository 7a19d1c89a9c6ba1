//! Collision filter installation at finalize: adjacent bodies, visual
//! geometry, and the world exception.

mod common;

use common::{sync_scene_poses, TestEngine};
use mbd_plant::{
    BodyIndex, CoulombFriction, GeometryQuery, Isometry3, JointKind, MassProperties,
    ModelInstanceIndex, MultibodyPlant, Shape, Translation3, UnitQuaternion, Vector3,
};

fn friction() -> CoulombFriction {
    CoulombFriction::new(0.5, 0.5).expect("friction")
}

/// Two bodies joined by a revolute joint never produce contact pairs, and
/// the engine was explicitly told to exclude their frames.
#[test]
fn adjacent_bodies_are_filtered() {
    let mut engine = TestEngine::new();
    let mut plant = MultibodyPlant::new(1e-3).expect("plant");
    let base = plant
        .add_rigid_body(
            "base",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(1.0, 0.1),
        )
        .expect("base");
    plant
        .add_joint(
            "floating",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            base,
            JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .expect("floating");
    let arm = plant
        .add_rigid_body(
            "arm",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(1.0, 0.1),
        )
        .expect("arm");
    plant
        .add_joint(
            "elbow",
            ModelInstanceIndex::default_instance(),
            base,
            arm,
            JointKind::Revolute { axis: Vector3::y() },
            // Close enough that the two spheres interpenetrate.
            Isometry3::from_parts(
                Translation3::new(0.05, 0.0, 0.0),
                UnitQuaternion::identity(),
            ),
            0.0,
        )
        .expect("elbow");

    plant.register_as_source(&mut engine).expect("source");
    plant
        .register_collision_geometry(
            base,
            Isometry3::identity(),
            Shape::sphere(0.1),
            "base_collision",
            friction(),
            &mut engine,
        )
        .expect("base geometry");
    plant
        .register_collision_geometry(
            arm,
            Isometry3::identity(),
            Shape::sphere(0.1),
            "arm_collision",
            friction(),
            &mut engine,
        )
        .expect("arm geometry");
    plant.finalize(Some(&mut engine)).expect("finalize");

    // Contract-level: the engine was asked to exclude the two frames.
    let base_frame = plant.get_body_frame_id(base).expect("base frame");
    let arm_frame = plant.get_body_frame_id(arm).expect("arm frame");
    let scene = engine.scene();
    let recorded = scene.borrow().exclusions_between.iter().any(|(a, b)| {
        (a.frames() == [arm_frame] && b.frames() == [base_frame])
            || (a.frames() == [base_frame] && b.frames() == [arm_frame])
    });
    assert!(recorded, "no frame-level exclusion for the joined bodies");

    // Behavior-level: the overlapping pair never shows up in queries.
    let context = plant.create_default_context().expect("context");
    sync_scene_poses(&plant, &context, &scene);
    let query = engine.query();
    let pairs = query.compute_point_pair_penetration();
    assert!(pairs.is_empty(), "filtered pair was reported: {pairs:?}");
}

/// A joint to the world installs no filter: anchored ground still collides
/// with the jointed body.
#[test]
fn world_joints_are_not_filtered() {
    let mut engine = TestEngine::new();
    let mut plant = MultibodyPlant::new(1e-3).expect("plant");
    let ball = plant
        .add_rigid_body(
            "ball",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(1.0, 0.1),
        )
        .expect("ball");
    plant
        .add_joint(
            "floating",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            ball,
            JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .expect("floating");
    plant.register_as_source(&mut engine).expect("source");
    plant
        .register_collision_geometry(
            ball,
            Isometry3::identity(),
            Shape::sphere(0.1),
            "ball_collision",
            friction(),
            &mut engine,
        )
        .expect("ball geometry");
    plant
        .register_collision_geometry(
            BodyIndex::world(),
            Isometry3::identity(),
            Shape::half_space(),
            "ground_collision",
            friction(),
            &mut engine,
        )
        .expect("ground geometry");
    plant.finalize(Some(&mut engine)).expect("finalize");

    // Default pose: the sphere center sits at the origin, penetrating.
    let context = plant.create_default_context().expect("context");
    let scene = engine.scene();
    sync_scene_poses(&plant, &context, &scene);
    let query = engine.query();
    let pairs = query.compute_point_pair_penetration();
    assert_eq!(pairs.len(), 1, "sphere-on-ground pair must be reported");
}

/// Visual geometry neither self-collides nor collides with collision
/// geometry.
#[test]
fn visual_geometry_never_collides() {
    let mut engine = TestEngine::new();
    let mut plant = MultibodyPlant::new(1e-3).expect("plant");
    let ball = plant
        .add_rigid_body(
            "ball",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(1.0, 0.1),
        )
        .expect("ball");
    plant
        .add_joint(
            "floating",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            ball,
            JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .expect("floating");
    plant.register_as_source(&mut engine).expect("source");
    // Visual sphere on the body, overlapping an anchored collision ground
    // and an anchored visual ground.
    plant
        .register_visual_geometry(
            ball,
            Isometry3::identity(),
            Shape::sphere(0.1),
            "ball_visual",
            &mut engine,
        )
        .expect("ball visual");
    plant
        .register_collision_geometry(
            BodyIndex::world(),
            Isometry3::identity(),
            Shape::half_space(),
            "ground_collision",
            friction(),
            &mut engine,
        )
        .expect("ground collision");
    plant
        .register_visual_geometry(
            BodyIndex::world(),
            Isometry3::identity(),
            Shape::half_space(),
            "ground_visual",
            &mut engine,
        )
        .expect("ground visual");
    plant.finalize(Some(&mut engine)).expect("finalize");

    let context = plant.create_default_context().expect("context");
    let scene = engine.scene();
    sync_scene_poses(&plant, &context, &scene);
    let query = engine.query();
    let pairs = query.compute_point_pair_penetration();
    assert!(
        pairs.is_empty(),
        "visual geometry produced contact pairs: {pairs:?}"
    );
}
