//! Continuous-mode dynamics: free fall, actuation, and energy conservation.

use approx::assert_relative_eq;
use mbd_plant::{
    BodyIndex, DVector, Isometry3, JointKind, MassProperties, ModelInstanceIndex, MultibodyPlant,
    Vector3,
};

const G: f64 = 9.81;

/// A single unconstrained rigid body accelerates at exactly g.
#[test]
fn free_fall_sphere_accelerates_at_gravity() {
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    let body = plant
        .add_rigid_body(
            "ball",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(1.0, 0.05),
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
        .set_uniform_gravity(Vector3::new(0.0, 0.0, -G))
        .expect("gravity");
    plant.finalize(None).expect("finalize");

    let context = plant.create_default_context().expect("context");
    let xdot = plant.calc_time_derivatives(&context).expect("derivatives");

    // ẋ = [q̇ (7); v̇ (6)]; from rest q̇ = 0 and v̇ = (0,0,0, 0,0,−g).
    assert_eq!(xdot.len(), 13);
    for k in 0..12 {
        assert_relative_eq!(xdot[k], 0.0, epsilon = 1e-12);
    }
    assert_relative_eq!(xdot[12], -G, epsilon = 1e-12);
}

/// An actuated prismatic slider accelerates at u/m.
#[test]
fn actuation_input_drives_the_joint() {
    let mass = 2.0;
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    let cart = plant
        .add_rigid_body(
            "cart",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(mass),
        )
        .expect("body");
    let slider = plant
        .add_joint(
            "slider",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            cart,
            JointKind::Prismatic { axis: Vector3::x() },
            Isometry3::identity(),
            0.0,
        )
        .expect("joint");
    plant.add_joint_actuator("drive", slider).expect("actuator");
    plant.finalize(None).expect("finalize");

    let port = plant.get_actuation_input_port().expect("port");
    let mut context = plant.create_default_context().expect("context");
    context.fix_input(port, DVector::from_element(1, 3.0));

    let xdot = plant.calc_time_derivatives(&context).expect("derivatives");
    assert_relative_eq!(xdot[1], 3.0 / mass, epsilon = 1e-12);
}

/// Joint damping opposes the joint rate.
#[test]
fn joint_damping_decelerates_motion() {
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    let cart = plant
        .add_rigid_body(
            "cart",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(1.0),
        )
        .expect("body");
    plant
        .add_joint(
            "slider",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            cart,
            JointKind::Prismatic { axis: Vector3::x() },
            Isometry3::identity(),
            0.5,
        )
        .expect("joint");
    plant.finalize(None).expect("finalize");

    let mut context = plant.create_default_context().expect("context");
    context
        .set_velocities(&DVector::from_element(1, 2.0))
        .expect("velocities");
    let xdot = plant.calc_time_derivatives(&context).expect("derivatives");
    // v̇ = −damping·v / m = −0.5·2.
    assert_relative_eq!(xdot[1], -1.0, epsilon = 1e-12);
}

/// An undamped, unactuated pendulum conserves mechanical energy under RK4
/// to integrator accuracy.
#[test]
fn pendulum_conserves_energy() {
    let length = 0.5;
    let mass = 1.0;
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    let bob = plant
        .add_rigid_body(
            "bob",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass_at(mass, Vector3::new(0.0, 0.0, -length)),
        )
        .expect("body");
    plant
        .add_joint(
            "pivot",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            bob,
            JointKind::Revolute { axis: Vector3::y() },
            Isometry3::identity(),
            0.0,
        )
        .expect("joint");
    plant
        .set_uniform_gravity(Vector3::new(0.0, 0.0, -G))
        .expect("gravity");
    plant.finalize(None).expect("finalize");

    let mut context = plant.create_default_context().expect("context");
    let theta0 = 1.0;
    context
        .set_positions(&DVector::from_element(1, theta0))
        .expect("positions");

    let energy = |theta: f64, theta_dot: f64| {
        0.5 * mass * length * length * theta_dot * theta_dot
            + mass * G * length * (1.0 - theta.cos())
    };
    let initial_energy = energy(theta0, 0.0);

    let dt = 1e-3;
    for _ in 0..2000 {
        let x = context.state().clone();
        let k1 = plant.calc_time_derivatives(&context).expect("k1");
        context.set_state(&x + &k1 * (dt / 2.0)).expect("state");
        let k2 = plant.calc_time_derivatives(&context).expect("k2");
        context.set_state(&x + &k2 * (dt / 2.0)).expect("state");
        let k3 = plant.calc_time_derivatives(&context).expect("k3");
        context.set_state(&x + &k3 * dt).expect("state");
        let k4 = plant.calc_time_derivatives(&context).expect("k4");
        let step = (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0);
        context.set_state(&x + step).expect("state");
    }

    let final_energy = energy(context.state()[0], context.state()[1]);
    assert_relative_eq!(final_energy, initial_energy, max_relative = 1e-6);
}

/// A discrete plant refuses to produce continuous derivatives.
#[test]
fn discrete_plant_has_no_derivatives() {
    let mut plant = MultibodyPlant::new(1e-3).expect("plant");
    let body = plant
        .add_rigid_body(
            "ball",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(1.0),
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
    plant.finalize(None).expect("finalize");
    let context = plant.create_default_context().expect("context");
    assert!(plant.calc_time_derivatives(&context).is_err());
}
