//! Lifecycle contract: pre/post-finalize gating, source registration, and
//! engine identity checks.

mod common;

use common::TestEngine;
use mbd_plant::{
    BodyIndex, CoulombFriction, Isometry3, JointKind, MassProperties, ModelInstanceIndex,
    MultibodyPlant, PlantError, Shape,
};

/// A discrete plant with one free-floating sphere body.
fn plant_with_body() -> MultibodyPlant {
    let mut plant = MultibodyPlant::new(1e-3).expect("plant");
    let body = plant
        .add_rigid_body(
            "body",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(1.0, 0.1),
        )
        .expect("body");
    plant
        .add_joint(
            "floating",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            body,
            JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .expect("joint");
    plant
}

#[test]
fn pre_finalize_port_access_fails() {
    let plant = plant_with_body();
    let err = plant.get_state_output_port().unwrap_err();
    assert!(matches!(err, PlantError::PreFinalizeUse { .. }));

    let err = plant.create_default_context().unwrap_err();
    assert!(matches!(err, PlantError::PreFinalizeUse { .. }));
}

#[test]
fn post_finalize_registration_fails() {
    let mut engine = TestEngine::new();
    let mut plant = plant_with_body();
    plant.register_as_source(&mut engine).expect("source");
    plant.finalize(Some(&mut engine)).expect("finalize");

    let err = plant
        .add_rigid_body(
            "late",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(1.0),
        )
        .unwrap_err();
    assert!(matches!(err, PlantError::PostFinalizeMutation { .. }));

    let err = plant
        .register_collision_geometry(
            BodyIndex::new(1),
            Isometry3::identity(),
            Shape::sphere(0.1),
            "late_collision",
            CoulombFriction::new(0.5, 0.5).expect("friction"),
            &mut engine,
        )
        .unwrap_err();
    assert!(matches!(err, PlantError::PostFinalizeMutation { .. }));
}

#[test]
fn finalize_is_one_shot() {
    let mut plant = plant_with_body();
    plant.finalize(None).expect("finalize");
    let err = plant.finalize(None).unwrap_err();
    assert!(matches!(err, PlantError::PostFinalizeMutation { .. }));
}

#[test]
fn duplicate_source_registration_fails() {
    let mut engine = TestEngine::new();
    let mut plant = plant_with_body();
    plant.register_as_source(&mut engine).expect("source");
    let err = plant.register_as_source(&mut engine).unwrap_err();
    assert_eq!(err, PlantError::DuplicateSourceRegistration);
}

#[test]
fn finalize_without_engine_fails_when_source_registered() {
    let mut engine = TestEngine::new();
    let mut plant = plant_with_body();
    plant.register_as_source(&mut engine).expect("source");
    let err = plant.finalize(None).unwrap_err();
    assert_eq!(err, PlantError::GeometryEngineMissing);
}

#[test]
fn finalize_with_different_engine_fails() {
    let mut engine = TestEngine::new();
    let mut other_engine = TestEngine::new();
    let mut plant = plant_with_body();
    plant.register_as_source(&mut engine).expect("source");
    let err = plant.finalize(Some(&mut other_engine)).unwrap_err();
    assert_eq!(err, PlantError::GeometryEngineMismatch);
}

#[test]
fn registration_on_different_engine_fails() {
    let mut engine = TestEngine::new();
    let mut other_engine = TestEngine::new();
    let mut plant = plant_with_body();
    plant.register_as_source(&mut engine).expect("source");
    let err = plant
        .register_collision_geometry(
            BodyIndex::new(1),
            Isometry3::identity(),
            Shape::sphere(0.1),
            "collision",
            CoulombFriction::new(0.5, 0.5).expect("friction"),
            &mut other_engine,
        )
        .unwrap_err();
    assert_eq!(err, PlantError::GeometryEngineMismatch);
}

#[test]
fn registration_without_source_fails() {
    let mut engine = TestEngine::new();
    let mut plant = plant_with_body();
    let err = plant
        .register_visual_geometry(
            BodyIndex::new(1),
            Isometry3::identity(),
            Shape::sphere(0.1),
            "visual",
            &mut engine,
        )
        .unwrap_err();
    assert!(matches!(err, PlantError::InvalidArgument { .. }));
}

#[test]
fn query_port_disconnected_is_reported() {
    let mut engine = TestEngine::new();
    let mut plant = plant_with_body();
    plant.register_as_source(&mut engine).expect("source");
    plant
        .register_collision_geometry(
            BodyIndex::new(1),
            Isometry3::identity(),
            Shape::sphere(0.1),
            "collision",
            CoulombFriction::new(0.5, 0.5).expect("friction"),
            &mut engine,
        )
        .expect("collision geometry");
    plant.finalize(Some(&mut engine)).expect("finalize");

    let mut context = plant.create_default_context().expect("context");
    let err = plant.calc_discrete_variable_updates(&mut context).unwrap_err();
    assert_eq!(err, PlantError::QueryPortDisconnected);
}

#[test]
fn contact_results_port_requires_discrete_mode() {
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    plant
        .add_rigid_body(
            "body",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(1.0),
        )
        .expect("body");
    // Connect the body so finalize succeeds.
    plant
        .add_joint(
            "floating",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            BodyIndex::new(1),
            mbd_plant::JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .expect("joint");
    plant.finalize(None).expect("finalize");
    let err = plant.get_contact_results_output_port().unwrap_err();
    assert!(matches!(err, PlantError::InvalidArgument { .. }));
}
