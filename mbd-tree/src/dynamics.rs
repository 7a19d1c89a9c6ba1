//! Force elements, joint damping, inverse dynamics, and the mass matrix.
//!
//! Inverse dynamics follows the classic world-frame Newton–Euler recursion:
//! a forward pass propagates accelerations from the world out to the leaves
//! (picking up the velocity-product terms each joint contributes), a per-body
//! step forms the inertial wrench `m·a_cm` and `I·α + ω×(I·ω)` about the
//! center of mass, and a backward pass accumulates subtree wrenches and
//! projects them through each joint's motion subspace:
//!
//! ```text
//! τ_id(q, v, v̇) = M(q)·v̇ + C(q, v)·v
//! τ = τ_id − τ_app − Σ J_WBᵀ F_app
//! ```
//!
//! Gravity is not part of `τ_id`; it enters through the applied forces that
//! `calc_force_elements_contribution` accumulates, exactly like any other
//! external force.
//!
//! The mass matrix is assembled one column at a time as
//! `M·e_j = τ_id(q, 0, e_j)`, which is the inverse-dynamics identity at zero
//! velocity with no applied forces.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use mbd_types::{MultibodyForces, Result, SpatialForce};

use crate::joint::JointKind;
use crate::tree::{MultibodyTree, PositionKinematicsCache, VelocityKinematicsCache};

impl MultibodyTree {
    /// Reset `forces` and accumulate force-element contributions (uniform
    /// gravity applied at each body's center of mass).
    pub fn calc_force_elements_contribution(
        &self,
        pc: &PositionKinematicsCache,
        _vc: &VelocityKinematicsCache,
        forces: &mut MultibodyForces,
    ) -> Result<()> {
        self.require_finalized("calc_force_elements_contribution")?;
        forces.set_zero();
        let Some(gravity) = self.gravity_field().copied() else {
            return Ok(());
        };
        let body_forces = forces.mutable_body_forces();
        for index in 1..self.num_bodies() {
            let body = self.get_body(index.into());
            let props = body.mass_properties();
            if props.mass == 0.0 {
                continue;
            }
            let com_w = pc.poses()[index].rotation * props.center_of_mass;
            let force = props.mass * gravity;
            body_forces[index] += SpatialForce::new(com_w.cross(&force), force);
        }
        Ok(())
    }

    /// Accumulate viscous joint damping, `τ_i −= damping·v_i` per dof.
    pub fn add_joint_damping_forces(
        &self,
        v: &DVector<f64>,
        forces: &mut MultibodyForces,
    ) -> Result<()> {
        self.require_finalized("add_joint_damping_forces")?;
        let generalized = forces.mutable_generalized_forces();
        for joint in self.joints() {
            for k in 0..joint.num_velocities() {
                let dof = joint.velocity_start() + k;
                generalized[dof] -= joint.damping() * v[dof];
            }
        }
        Ok(())
    }

    /// Inverse dynamics: the generalized forces required to produce `vdot`
    /// at state `(q, v)` given the applied `forces`.
    ///
    /// Returns `τ_id(q, v, v̇) − τ_app − Σ Jᵀ F_app`. With `v̇ = 0` this is
    /// the bias `C(q,v)·v − τ_app − Σ Jᵀ F_app` the plant subtracts from its
    /// momentum balance.
    pub fn calc_inverse_dynamics(
        &self,
        pc: &PositionKinematicsCache,
        vc: &VelocityKinematicsCache,
        v: &DVector<f64>,
        vdot: &DVector<f64>,
        forces: &MultibodyForces,
    ) -> Result<DVector<f64>> {
        self.require_finalized("calc_inverse_dynamics")?;
        let num_bodies = self.num_bodies();

        // Forward pass: spatial accelerations (α, a) of each body's origin
        // material point, world frame.
        let mut alpha = vec![Vector3::zeros(); num_bodies];
        let mut accel = vec![Vector3::zeros(); num_bodies];
        for index in 1..num_bodies {
            let Some(joint_index) = self.inboard_joint(index) else {
                continue;
            };
            let joint = self.get_joint(joint_index);
            let parent = joint.parent_body().raw();
            let vs = joint.velocity_start();

            let r = pc.poses()[index].translation.vector - pc.poses()[parent].translation.vector;
            let omega_p = vc.velocity(joint.parent_body()).angular;
            // Acceleration of the parent's material point coincident with
            // this body's origin.
            let base_alpha = alpha[parent];
            let base_accel =
                accel[parent] + base_alpha.cross(&r) + omega_p.cross(&omega_p.cross(&r));

            match joint.kind() {
                JointKind::Free => {
                    alpha[index] = Vector3::new(vdot[vs], vdot[vs + 1], vdot[vs + 2]);
                    accel[index] = Vector3::new(vdot[vs + 3], vdot[vs + 4], vdot[vs + 5]);
                }
                JointKind::Revolute { .. } => {
                    let axis = self.single_dof_axis_in_world(pc, joint_index);
                    // The hinge pins the two coincident material points, so
                    // the linear part carries over; the axis rotates with
                    // the parent.
                    alpha[index] =
                        base_alpha + axis * vdot[vs] + omega_p.cross(&(axis * v[vs]));
                    accel[index] = base_accel;
                }
                JointKind::Prismatic { .. } => {
                    let axis = self.single_dof_axis_in_world(pc, joint_index);
                    alpha[index] = base_alpha;
                    // Relative sliding adds the Coriolis term 2ω×v_rel.
                    accel[index] = base_accel
                        + axis * vdot[vs]
                        + 2.0 * omega_p.cross(&(axis * v[vs]));
                }
                JointKind::Weld => {
                    alpha[index] = base_alpha;
                    accel[index] = base_accel;
                }
            }
        }

        // Per-body inertial wrench about the body origin, minus applied
        // forces.
        let mut net = vec![SpatialForce::zero(); num_bodies];
        for index in 1..num_bodies {
            let props = self.get_body(index.into()).mass_properties();
            let rotation = pc.poses()[index].rotation.to_rotation_matrix();
            let omega = vc.velocity(index.into()).angular;

            let com_w = rotation * props.center_of_mass;
            let accel_com =
                accel[index] + alpha[index].cross(&com_w) + omega.cross(&omega.cross(&com_w));
            let force = props.mass * accel_com;

            let inertia_w: Matrix3<f64> =
                rotation.matrix() * props.inertia * rotation.matrix().transpose();
            let torque_com = inertia_w * alpha[index] + omega.cross(&(inertia_w * omega));

            let inertial = SpatialForce::new(torque_com + com_w.cross(&force), force);
            net[index] = inertial - forces.body_forces()[index];
        }

        // Backward pass: fold each subtree's wrench into its parent.
        for index in (1..num_bodies).rev() {
            let Some(joint_index) = self.inboard_joint(index) else {
                continue;
            };
            let joint = self.get_joint(joint_index);
            let parent = joint.parent_body().raw();
            let r = pc.poses()[index].translation.vector - pc.poses()[parent].translation.vector;
            let child = net[index];
            net[parent].force += child.force;
            net[parent].torque += child.torque + r.cross(&child.force);
        }

        // Project through each joint's motion subspace.
        let mut tau = DVector::zeros(self.num_velocities());
        for index in 1..num_bodies {
            let Some(joint_index) = self.inboard_joint(index) else {
                continue;
            };
            let joint = self.get_joint(joint_index);
            let vs = joint.velocity_start();
            let wrench = net[index];
            match joint.kind() {
                JointKind::Free => {
                    for k in 0..3 {
                        tau[vs + k] = wrench.torque[k];
                        tau[vs + 3 + k] = wrench.force[k];
                    }
                }
                JointKind::Revolute { .. } => {
                    let axis = self.single_dof_axis_in_world(pc, joint_index);
                    tau[vs] = axis.dot(&wrench.torque);
                }
                JointKind::Prismatic { .. } => {
                    let axis = self.single_dof_axis_in_world(pc, joint_index);
                    tau[vs] = axis.dot(&wrench.force);
                }
                JointKind::Weld => {}
            }
        }

        tau -= forces.generalized_forces();
        Ok(tau)
    }

    /// The mass matrix `M(q)`, assembled column-by-column from inverse
    /// dynamics at zero velocity.
    pub fn calc_mass_matrix_via_inverse_dynamics(
        &self,
        pc: &PositionKinematicsCache,
    ) -> Result<DMatrix<f64>> {
        self.require_finalized("calc_mass_matrix_via_inverse_dynamics")?;
        let nv = self.num_velocities();
        let vc_zero = VelocityKinematicsCache::zeroed(self.num_bodies());
        let v_zero = DVector::zeros(nv);
        let no_forces = MultibodyForces::new(self.num_bodies(), nv);
        let mut mass_matrix = DMatrix::zeros(nv, nv);
        let mut vdot = DVector::zeros(nv);
        for j in 0..nv {
            vdot[j] = 1.0;
            let column = self.calc_inverse_dynamics(pc, &vc_zero, &v_zero, &vdot, &no_forces)?;
            mass_matrix.set_column(j, &column);
            vdot[j] = 0.0;
        }
        Ok(mass_matrix)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::body::MassProperties;
    use approx::assert_relative_eq;
    use mbd_types::{BodyIndex, Isometry3, JointIndex, ModelInstanceIndex, SpatialVelocity};

    const G: f64 = 9.81;

    fn pendulum(length: f64, mass: f64) -> (MultibodyTree, JointIndex) {
        let mut tree = MultibodyTree::new();
        let body = tree
            .add_rigid_body(
                "bob",
                ModelInstanceIndex::default_instance(),
                MassProperties::point_mass_at(mass, Vector3::new(0.0, 0.0, -length)),
            )
            .unwrap();
        let joint = tree
            .add_joint(
                "pivot",
                ModelInstanceIndex::default_instance(),
                BodyIndex::world(),
                body,
                JointKind::Revolute { axis: Vector3::y() },
                Isometry3::identity(),
                0.0,
            )
            .unwrap();
        tree.set_uniform_gravity(Vector3::new(0.0, 0.0, -G)).unwrap();
        tree.finalize().unwrap();
        (tree, joint)
    }

    fn free_sphere(mass: f64) -> (MultibodyTree, JointIndex) {
        let mut tree = MultibodyTree::new();
        let body = tree
            .add_rigid_body(
                "ball",
                ModelInstanceIndex::default_instance(),
                MassProperties::solid_sphere(mass, 0.1),
            )
            .unwrap();
        let joint = tree
            .add_joint(
                "floating",
                ModelInstanceIndex::default_instance(),
                BodyIndex::world(),
                body,
                JointKind::Free,
                Isometry3::identity(),
                0.0,
            )
            .unwrap();
        tree.set_uniform_gravity(Vector3::new(0.0, 0.0, -G)).unwrap();
        tree.finalize().unwrap();
        (tree, joint)
    }

    #[test]
    fn test_pendulum_mass_matrix() {
        let (length, mass) = (0.7, 2.0);
        let (tree, joint) = pendulum(length, mass);
        let mut q = tree.default_positions();
        q[tree.get_joint(joint).position_start()] = 0.4;
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let m = tree.calc_mass_matrix_via_inverse_dynamics(&pc).unwrap();
        // A point mass at distance L from the pivot: M = m·L².
        assert_relative_eq!(m[(0, 0)], mass * length * length, epsilon = 1e-10);
    }

    #[test]
    fn test_pendulum_gravity_bias() {
        let (length, mass) = (0.5, 1.0);
        let (tree, joint) = pendulum(length, mass);
        let theta = 0.3;
        let mut q = tree.default_positions();
        q[tree.get_joint(joint).position_start()] = theta;
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let v = DVector::zeros(1);
        let vc = tree.calc_velocity_kinematics_cache(&pc, &v).unwrap();

        let mut forces = MultibodyForces::new(tree.num_bodies(), 1);
        tree.calc_force_elements_contribution(&pc, &vc, &mut forces)
            .unwrap();
        let tau = tree
            .calc_inverse_dynamics(&pc, &vc, &v, &DVector::zeros(1), &forces)
            .unwrap();
        // The torque required to hold the pendulum still: m·g·L·sin(θ).
        assert_relative_eq!(tau[0], mass * G * length * theta.sin(), epsilon = 1e-10);
    }

    #[test]
    fn test_free_sphere_mass_matrix_is_block_diagonal() {
        let mass = 1.0;
        let (tree, _) = free_sphere(mass);
        let q = tree.default_positions();
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let m = tree.calc_mass_matrix_via_inverse_dynamics(&pc).unwrap();
        let inertia = 0.4 * mass * 0.1 * 0.1;
        for i in 0..3 {
            assert_relative_eq!(m[(i, i)], inertia, epsilon = 1e-12);
            assert_relative_eq!(m[(3 + i, 3 + i)], mass, epsilon = 1e-12);
        }
        // No coupling for a centered sphere.
        assert_relative_eq!(m[(0, 3)], 0.0, epsilon = 1e-12);
        assert_relative_eq!((m.clone() - m.transpose()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall_acceleration() {
        let (tree, _) = free_sphere(1.0);
        let q = tree.default_positions();
        let v = DVector::zeros(6);
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let vc = tree.calc_velocity_kinematics_cache(&pc, &v).unwrap();

        let mut forces = MultibodyForces::new(tree.num_bodies(), 6);
        tree.calc_force_elements_contribution(&pc, &vc, &mut forces)
            .unwrap();
        // Bias at v̇ = 0 is −(applied gravity) in generalized coordinates.
        let minus_tau = tree
            .calc_inverse_dynamics(&pc, &vc, &v, &DVector::zeros(6), &forces)
            .unwrap();
        let m = tree.calc_mass_matrix_via_inverse_dynamics(&pc).unwrap();
        let vdot = m.cholesky().unwrap().solve(&(-minus_tau));
        for k in 0..5 {
            assert_relative_eq!(vdot[k], 0.0, epsilon = 1e-12);
        }
        assert_relative_eq!(vdot[5], -G, epsilon = 1e-12);
    }

    #[test]
    fn test_gyroscopic_torque_of_spinning_body() {
        // A body with anisotropic inertia spinning off-axis needs a torque
        // ω×(I·ω) to keep α = 0.
        let mut tree = MultibodyTree::new();
        let inertia = Matrix3::from_diagonal(&Vector3::new(0.1, 0.2, 0.3));
        let body = tree
            .add_rigid_body(
                "top",
                ModelInstanceIndex::default_instance(),
                MassProperties::new(1.0, Vector3::zeros(), inertia).unwrap(),
            )
            .unwrap();
        let joint = tree
            .add_joint(
                "floating",
                ModelInstanceIndex::default_instance(),
                BodyIndex::world(),
                body,
                JointKind::Free,
                Isometry3::identity(),
                0.0,
            )
            .unwrap();
        tree.finalize().unwrap();

        let q = tree.default_positions();
        let omega = Vector3::new(1.0, 2.0, 3.0);
        let mut v = DVector::zeros(6);
        tree.set_free_joint_velocity(
            joint,
            &SpatialVelocity::new(omega, Vector3::zeros()),
            &mut v,
        )
        .unwrap();
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let vc = tree.calc_velocity_kinematics_cache(&pc, &v).unwrap();

        let forces = MultibodyForces::new(tree.num_bodies(), 6);
        let tau = tree
            .calc_inverse_dynamics(&pc, &vc, &v, &DVector::zeros(6), &forces)
            .unwrap();
        let expected = omega.cross(&(inertia * omega));
        for k in 0..3 {
            assert_relative_eq!(tau[k], expected[k], epsilon = 1e-12);
            assert_relative_eq!(tau[3 + k], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_joint_damping_forces() {
        let mut tree = MultibodyTree::new();
        let body = tree
            .add_rigid_body(
                "bob",
                ModelInstanceIndex::default_instance(),
                MassProperties::point_mass_at(1.0, Vector3::new(0.0, 0.0, -1.0)),
            )
            .unwrap();
        tree.add_joint(
            "pivot",
            ModelInstanceIndex::default_instance(),
            BodyIndex::world(),
            body,
            JointKind::Revolute { axis: Vector3::y() },
            Isometry3::identity(),
            0.25,
        )
        .unwrap();
        tree.finalize().unwrap();

        let v = DVector::from_element(1, 2.0);
        let mut forces = MultibodyForces::new(tree.num_bodies(), 1);
        tree.add_joint_damping_forces(&v, &mut forces).unwrap();
        assert_relative_eq!(forces.generalized_forces()[0], -0.5, epsilon = 1e-14);
    }
}
