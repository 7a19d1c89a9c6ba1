//! Continuous-mode contact forces by the penalty method.
//!
//! Each penetration contributes a compliant normal force and a regularized
//! friction force at the contact point C (midpoint of the witness points):
//!
//! ```text
//! vₙ  = (v_WBc − v_WAc)·n̂        approach speed, > 0 closing
//! fₙ  = k·x·(1 + d·vₙ)           clamped at zero (liftoff stays continuous)
//! f_t = μ(‖v_t‖)·fₙ·v_t/‖v_t‖   opposing A's motion relative to B
//! ```
//!
//! The resulting spatial force is shifted from C to each body origin and
//! accumulated additively; the world body receives nothing.

use mbd_types::{PlantError, PointPair, Result, SpatialForce, Vector3};
use mbd_tree::{PositionKinematicsCache, VelocityKinematicsCache};

use crate::plant::MultibodyPlant;

/// Slip speeds whose square falls below this are treated as zero.
const SLIP_SPEED_SQUARED_FLOOR: f64 = 1e-28;

impl MultibodyPlant {
    /// Compute penalty contact forces for every point pair and accumulate
    /// them into `body_forces` (indexed by body, at each body origin, world
    /// frame).
    pub(crate) fn calc_and_add_contact_forces_by_penalty_method(
        &self,
        pc: &PositionKinematicsCache,
        vc: &VelocityKinematicsCache,
        point_pairs: &[PointPair],
        body_forces: &mut [SpatialForce],
    ) -> Result<()> {
        if self.num_collision_geometries() == 0 {
            return Ok(());
        }
        let params = self
            .penalty_parameters()
            .copied()
            .ok_or_else(|| PlantError::invalid_argument(
                "penalty parameters are unset; call set_penetration_allowance()".to_string(),
            ))?;
        let stribeck = self.stribeck_model().copied().ok_or_else(|| {
            PlantError::invalid_argument(
                "stiction tolerance is unset; call set_stiction_tolerance()".to_string(),
            )
        })?;
        let combined_frictions = self.calc_combined_friction_coefficients(point_pairs)?;

        for (pair, friction) in point_pairs.iter().zip(&combined_frictions) {
            let body_a = self.body_of_geometry(pair.id_a)?;
            let body_b = self.body_of_geometry(pair.id_b)?;

            let depth = pair.depth;
            debug_assert!(depth >= 0.0);
            let nhat = pair.normal_from_b;
            let p_wc = pair.contact_point();

            // Offsets from the contact point to each body origin.
            let p_co_ao = pc.pose(body_a).translation.vector - p_wc.coords;
            let p_co_bo = pc.pose(body_b).translation.vector - p_wc.coords;

            // Witness point velocities as points of their bodies.
            let v_wac = vc.velocity(body_a).shift(&(-p_co_ao)).linear;
            let v_wbc = vc.velocity(body_b).shift(&(-p_co_bo)).linear;
            let v_acbc = v_wbc - v_wac;

            // Approach speed: positive while the bodies close.
            let vn = v_acbc.dot(&nhat);

            let fn_ac = params.stiffness * depth * (1.0 + params.damping * vn);
            if fn_ac <= 0.0 {
                continue;
            }
            let fn_ac_w = fn_ac * nhat;

            // Tangential velocity in the contact plane.
            let vt_acbc_w = v_acbc - vn * nhat;
            let vt_squared = vt_acbc_w.norm_squared();
            let ft_ac_w = if vt_squared > SLIP_SPEED_SQUARED_FLOOR {
                let vt = vt_squared.sqrt();
                let mu = stribeck.friction_coefficient(vt, friction);
                (mu * fn_ac) * (vt_acbc_w / vt)
            } else {
                Vector3::zeros()
            };

            // Spatial force on A at C, world frame.
            let f_ac_w = SpatialForce::new(Vector3::zeros(), fn_ac_w + ft_ac_w);

            if !body_a.is_world() {
                body_forces[body_a.raw()] += f_ac_w.shift(&p_co_ao);
            }
            if !body_b.is_world() {
                body_forces[body_b.raw()] += (-f_ac_w).shift(&p_co_bo);
            }
        }
        Ok(())
    }
}
