//! Continuous-mode penalty contact: action–reaction balance and friction
//! direction.

mod common;

use approx::assert_relative_eq;
use common::{sync_scene_poses, TestEngine};
use mbd_plant::{
    BodyIndex, CoulombFriction, Isometry3, JointKind, MassProperties, ModelInstanceIndex,
    MultibodyPlant, Shape, SpatialVelocity, Translation3, UnitQuaternion, Vector3,
};

const G: f64 = 9.81;

/// Contact forces between two penetrating free spheres are equal and
/// opposite: total linear momentum and angular momentum about the world
/// origin are both conserved.
#[test]
fn contact_forces_balance_between_two_spheres() {
    let mass = 1.0;
    let radius = 0.1;
    let inertia = 0.4 * mass * radius * radius;

    let mut engine = TestEngine::new();
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    plant.register_as_source(&mut engine).expect("source");
    let mut joints = Vec::new();
    for name in ["first", "second"] {
        let body = plant
            .add_rigid_body(
                name,
                ModelInstanceIndex::default_instance(),
                MassProperties::solid_sphere(mass, radius),
            )
            .expect("body");
        joints.push(
            plant
                .add_joint(
                    format!("{name}_floating"),
                    ModelInstanceIndex::default_instance(),
                    BodyIndex::world(),
                    body,
                    JointKind::Free,
                    Isometry3::identity(),
                    0.0,
                )
                .expect("joint"),
        );
        plant
            .register_collision_geometry(
                body,
                Isometry3::identity(),
                Shape::sphere(radius),
                format!("{name}_collision"),
                CoulombFriction::new(0.6, 0.4).expect("friction"),
                &mut engine,
            )
            .expect("geometry");
    }
    // No gravity: contact is the only force in play.
    plant.finalize(Some(&mut engine)).expect("finalize");

    let mut context = plant.create_default_context().expect("context");
    let mut q = context.positions();
    let centers = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.15, 0.0, 0.02), // overlapping: centers 0.151 apart
    ];
    for (joint, center) in joints.iter().zip(centers) {
        plant
            .tree()
            .set_free_joint_pose(
                *joint,
                &Isometry3::from_parts(Translation3::from(center), UnitQuaternion::identity()),
                &mut q,
            )
            .expect("pose");
    }
    context.set_positions(&q).expect("positions");
    // Sliding and spinning so both normal and friction forces act.
    let mut v = context.velocities();
    plant
        .tree()
        .set_free_joint_velocity(
            joints[0],
            &SpatialVelocity::new(Vector3::new(1.0, 0.5, 0.0), Vector3::new(0.3, -0.2, 0.1)),
            &mut v,
        )
        .expect("velocity");
    context.set_velocities(&v).expect("velocities");
    context.connect_geometry_query(engine.query());
    sync_scene_poses(&plant, &context, &engine.scene());

    let xdot = plant.calc_time_derivatives(&context).expect("derivatives");
    // v̇ starts after the 14 position rates (two free joints, 7 each).
    let vdot = |sphere: usize, k: usize| xdot[14 + 6 * sphere + k];

    // Linear momentum: m·a₀ + m·a₁ = 0.
    let mut force_scale: f64 = 1.0;
    for k in 0..3 {
        force_scale = force_scale.max((mass * vdot(0, 3 + k)).abs());
    }
    for k in 0..3 {
        let sum = mass * vdot(0, 3 + k) + mass * vdot(1, 3 + k);
        assert_relative_eq!(sum, 0.0, epsilon = 1e-9 * force_scale);
    }

    // Angular momentum about the world origin:
    // Σᵢ rᵢ × (m·aᵢ) + I·αᵢ = 0 (sphere inertia is isotropic, so the
    // gyroscopic term vanishes).
    let mut total = Vector3::zeros();
    for (sphere, center) in centers.iter().enumerate() {
        let linear = mass * Vector3::new(vdot(sphere, 3), vdot(sphere, 4), vdot(sphere, 5));
        let angular = inertia * Vector3::new(vdot(sphere, 0), vdot(sphere, 1), vdot(sphere, 2));
        total += center.cross(&linear) + angular;
    }
    assert_relative_eq!(total.norm(), 0.0, epsilon = 1e-9 * force_scale);
}

/// A sphere sliding on the ground well above the stiction band decelerates
/// at μ_d·g while the normal force carries its weight.
#[test]
fn sliding_friction_opposes_motion() {
    let mass = 1.0;
    let radius = 0.05;
    let mu_dynamic = 0.3;
    let allowance = 1e-3;

    let mut engine = TestEngine::new();
    let mut plant = MultibodyPlant::new(0.0).expect("plant");
    let ball = plant
        .add_rigid_body(
            "ball",
            ModelInstanceIndex::default_instance(),
            MassProperties::solid_sphere(mass, radius),
        )
        .expect("body");
    let joint = plant
        .add_joint(
            "floating",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            ball,
            JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .expect("joint");
    plant
        .set_uniform_gravity(Vector3::new(0.0, 0.0, -G))
        .expect("gravity");
    plant.register_as_source(&mut engine).expect("source");
    let friction = CoulombFriction::new(mu_dynamic, mu_dynamic).expect("friction");
    plant
        .register_collision_geometry(
            ball,
            Isometry3::identity(),
            Shape::sphere(radius),
            "ball_collision",
            friction,
            &mut engine,
        )
        .expect("ball geometry");
    plant
        .register_collision_geometry(
            BodyIndex::world(),
            Isometry3::identity(),
            Shape::half_space(),
            "ground_collision",
            friction,
            &mut engine,
        )
        .expect("ground geometry");
    plant.finalize(Some(&mut engine)).expect("finalize");
    plant
        .set_penetration_allowance(allowance)
        .expect("penetration allowance");

    let mut context = plant.create_default_context().expect("context");
    let mut q = context.positions();
    // Penetrating by exactly the static depth: fₙ = m·g at zero approach.
    plant
        .tree()
        .set_free_joint_pose(
            joint,
            &Isometry3::from_parts(
                Translation3::new(0.0, 0.0, radius - allowance),
                UnitQuaternion::identity(),
            ),
            &mut q,
        )
        .expect("pose");
    context.set_positions(&q).expect("positions");
    // Sliding at 0.1 m/s, far beyond 3·v*.
    let mut v = context.velocities();
    plant
        .tree()
        .set_free_joint_velocity(
            joint,
            &SpatialVelocity::new(Vector3::zeros(), Vector3::new(0.1, 0.0, 0.0)),
            &mut v,
        )
        .expect("velocity");
    context.set_velocities(&v).expect("velocities");
    context.connect_geometry_query(engine.query());
    sync_scene_poses(&plant, &context, &engine.scene());

    let xdot = plant.calc_time_derivatives(&context).expect("derivatives");
    // v̇ starts after the 7 position rates.
    let a_x = xdot[7 + 3];
    let a_z = xdot[7 + 5];
    assert_relative_eq!(a_x, -mu_dynamic * G, max_relative = 1e-9);
    assert_relative_eq!(a_z, 0.0, epsilon = 1e-9);
}
