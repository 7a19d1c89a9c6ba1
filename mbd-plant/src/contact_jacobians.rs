//! Contact Jacobians and contact frames from penetration witnesses.
//!
//! For each point pair the plant builds one row of the normal Jacobian and
//! two rows of the tangential Jacobian:
//!
//! ```text
//! Jn[i, :]      =  n̂ᵀ (J_WAc − J_WBc)      separation rate, vₙ = Jn·v
//! Jt[2i, :]     =  t̂₁ᵀ (J_WBc − J_WAc)     slip along the first tangent
//! Jt[2i+1, :]   =  t̂₂ᵀ (J_WBc − J_WAc)     slip along the second tangent
//! ```
//!
//! The opposite body ordering between the normal and tangential rows is part
//! of the solver's contract; do not unify them. `vₙ > 0` means the witness
//! points separate, and the tangential rows measure the velocity of Bc
//! relative to Ac in the contact frame.
//!
//! The contact frame C has its third axis along `n̂` and two arbitrary but
//! deterministic right-handed tangents, a pure function of `n̂` so the rows
//! are reproducible across evaluations.

use nalgebra::{DMatrix, Matrix3, Vector3};

use mbd_types::{PointPair, Result};
use mbd_tree::PositionKinematicsCache;

use crate::plant::MultibodyPlant;

/// A right-handed orthonormal basis `[t̂₁ t̂₂ n̂]` with the given unit vector
/// as its third column. Deterministic in `n̂` alone.
#[must_use]
pub(crate) fn compute_basis_from_unit_normal(normal: &Vector3<f64>) -> Matrix3<f64> {
    debug_assert!((normal.norm() - 1.0).abs() < 1e-6);
    // Seed with the world axis least aligned with the normal.
    let seed = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = normal.cross(&seed).normalize();
    let t2 = normal.cross(&t1);
    Matrix3::from_columns(&[t1, t2, *normal])
}

impl MultibodyPlant {
    /// Build the `nc × nv` normal separation-rate Jacobian.
    pub(crate) fn calc_normal_separation_velocities_jacobian(
        &self,
        pc: &PositionKinematicsCache,
        point_pairs: &[PointPair],
    ) -> Result<DMatrix<f64>> {
        let nv = self.tree().num_velocities();
        let mut jn = DMatrix::zeros(point_pairs.len(), nv);
        for (i, pair) in point_pairs.iter().enumerate() {
            let body_a = self.body_of_geometry(pair.id_a)?;
            let body_b = self.body_of_geometry(pair.id_b)?;

            let j_wac = self.tree().calc_points_geometric_jacobian_expressed_in_world(
                pc,
                body_a,
                &pair.point_on_a,
            )?;
            let j_wbc = self.tree().calc_points_geometric_jacobian_expressed_in_world(
                pc,
                body_b,
                &pair.point_on_b,
            )?;

            let diff = j_wac - j_wbc;
            let row = pair.normal_from_b.transpose() * &diff;
            jn.row_mut(i).copy_from(&row);
        }
        Ok(jn)
    }

    /// Build the `2nc × nv` tangential velocity Jacobian and the contact
    /// frame rotation `R_WC` per pair.
    pub(crate) fn calc_tangent_velocities_jacobian(
        &self,
        pc: &PositionKinematicsCache,
        point_pairs: &[PointPair],
    ) -> Result<(DMatrix<f64>, Vec<Matrix3<f64>>)> {
        let nv = self.tree().num_velocities();
        let mut jt = DMatrix::zeros(2 * point_pairs.len(), nv);
        let mut r_wc_set = Vec::with_capacity(point_pairs.len());
        for (i, pair) in point_pairs.iter().enumerate() {
            let body_a = self.body_of_geometry(pair.id_a)?;
            let body_b = self.body_of_geometry(pair.id_b)?;

            let r_wc = compute_basis_from_unit_normal(&pair.normal_from_b);
            let t1 = r_wc.column(0).clone_owned();
            let t2 = r_wc.column(1).clone_owned();
            r_wc_set.push(r_wc);

            let j_wac = self.tree().calc_points_geometric_jacobian_expressed_in_world(
                pc,
                body_a,
                &pair.point_on_a,
            )?;
            let j_wbc = self.tree().calc_points_geometric_jacobian_expressed_in_world(
                pc,
                body_b,
                &pair.point_on_b,
            )?;

            let diff = j_wbc - j_wac;
            jt.row_mut(2 * i).copy_from(&(t1.transpose() * &diff));
            jt.row_mut(2 * i + 1).copy_from(&(t2.transpose() * &diff));
        }
        Ok((jt, r_wc_set))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basis_is_right_handed_orthonormal() {
        for normal in [
            Vector3::z(),
            Vector3::x(),
            -Vector3::y(),
            Vector3::new(1.0, 2.0, -0.5).normalize(),
        ] {
            let r = compute_basis_from_unit_normal(&normal);
            let t1 = r.column(0).clone_owned();
            let t2 = r.column(1).clone_owned();
            let n = r.column(2).clone_owned();
            assert_relative_eq!(n, normal, epsilon = 1e-14);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&t2), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&normal), 0.0, epsilon = 1e-12);
            // Right-handed: t̂₁ × t̂₂ = n̂.
            assert_relative_eq!(t1.cross(&t2), normal, epsilon = 1e-12);
            assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_basis_is_deterministic() {
        let normal = Vector3::new(0.3, -0.4, 0.8).normalize();
        let a = compute_basis_from_unit_normal(&normal);
        let b = compute_basis_from_unit_normal(&normal);
        assert_eq!(a, b);
    }
}
