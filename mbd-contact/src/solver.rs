//! Implicit Stribeck solver for discrete contact dynamics.
//!
//! One discrete step of size `Δt` must find the next-step generalized
//! velocities `v` together with the contact forces they induce:
//!
//! ```text
//! M (v − v0) = Δt·(−τ_bias) + Δt·(Jnᵀ fₙ + Jtᵀ f_t)
//! fₙ_i = k_i · (φ0_i − Δt·vₙ_i)₊ · (1 − d_i·vₙ_i)₊
//! f_t_i = −μ_i(‖v_t_i‖) · fₙ_i · v_t_i / ‖v_t_i‖
//! vₙ = Jn v,   v_t = Jt v
//! ```
//!
//! `vₙ` is the normal **separation rate** (negative while the pair
//! approaches), so the compliance term forecasts the end-of-step penetration
//! `φ = φ0 − Δt·vₙ` and the dissipation factor `(1 − d·vₙ)` grows with
//! approach speed. Both factors clamp at zero independently; a product clamp
//! would let two negative factors fabricate a positive force. μ is the
//! Stribeck curve of [`StribeckModel`], evaluated with the combined *static*
//! coefficient for both branches - the regularization itself supplies the
//! static/dynamic distinction in discrete mode.
//!
//! Normal compliance and friction are two-way coupled: fₙ depends on v
//! through `vₙ`, and f_t depends on both `v_t` and fₙ. The solver iterates
//! Newton on v with an analytic Jacobian carrying all three coupling blocks,
//! and limits each update so that no contact's slip speed can jump across
//! the stiction band in a single iterate (full Newton steps across the μ
//! ramp oscillate instead of converging).
//!
//! Problem data is borrowed for the duration of one solve; results are
//! returned by value in [`SolverSolution`] so a solver can be shared across
//! contexts without carrying solve-dependent state.

use nalgebra::{DMatrix, DVector, Vector2};
use tracing::trace;

use mbd_types::{CoulombFriction, PlantError, Result, SolverFailure};

use crate::stribeck::StribeckModel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Iteration controls for [`ImplicitStribeckSolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverParameters {
    /// Stiction tolerance `v*` (m/s) of the internal Stribeck regularization.
    pub stiction_tolerance: f64,
    /// Newton iteration budget.
    pub max_iterations: usize,
    /// Relative convergence tolerance on the mass-matrix norm of the update,
    /// `‖Δv‖_M < abs + rel·‖v‖_M`.
    pub relative_tolerance: f64,
    /// Absolute convergence tolerance (same norm).
    pub absolute_tolerance: f64,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            stiction_tolerance: 1e-4,
            max_iterations: 100,
            relative_tolerance: 1e-6,
            absolute_tolerance: 1e-12,
        }
    }
}

/// Borrowed view of one step's problem data.
///
/// All references must stay valid for the duration of a single
/// [`ImplicitStribeckSolver::solve_with_guess`] call; nothing is retained
/// afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ProblemData<'a> {
    mass_matrix: &'a DMatrix<f64>,
    jn: &'a DMatrix<f64>,
    jt: &'a DMatrix<f64>,
    p_star: &'a DVector<f64>,
    phi0: &'a DVector<f64>,
    stiffness: &'a DVector<f64>,
    damping: &'a DVector<f64>,
    mu: &'a DVector<f64>,
}

impl<'a> ProblemData<'a> {
    /// Bundle the two-way coupled problem data, validating dimensions.
    ///
    /// * `mass_matrix` - `nv × nv` mass matrix `M(q0)`
    /// * `jn` - `nc × nv` normal separation-rate Jacobian
    /// * `jt` - `2nc × nv` tangential velocity Jacobian
    /// * `p_star` - momentum `M v0 − Δt·τ_bias` before contact impulses
    /// * `phi0` - penetration depths at the start of the step (≥ 0)
    /// * `stiffness`, `damping` - per-contact compliance parameters
    /// * `mu` - per-contact combined static friction coefficients
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mass_matrix: &'a DMatrix<f64>,
        jn: &'a DMatrix<f64>,
        jt: &'a DMatrix<f64>,
        p_star: &'a DVector<f64>,
        phi0: &'a DVector<f64>,
        stiffness: &'a DVector<f64>,
        damping: &'a DVector<f64>,
        mu: &'a DVector<f64>,
    ) -> Result<Self> {
        let nv = mass_matrix.nrows();
        if mass_matrix.ncols() != nv {
            return Err(PlantError::invalid_argument(
                "mass matrix must be square".to_string(),
            ));
        }
        if p_star.len() != nv {
            return Err(PlantError::invalid_argument(format!(
                "p_star has length {}, expected {nv}",
                p_star.len()
            )));
        }
        let nc = jn.nrows();
        if jn.ncols() != nv || jt.ncols() != nv {
            return Err(PlantError::invalid_argument(
                "contact Jacobians must have nv columns".to_string(),
            ));
        }
        if jt.nrows() != 2 * nc {
            return Err(PlantError::invalid_argument(format!(
                "tangential Jacobian has {} rows, expected {}",
                jt.nrows(),
                2 * nc
            )));
        }
        for (name, vec) in [
            ("phi0", phi0),
            ("stiffness", stiffness),
            ("damping", damping),
            ("mu", mu),
        ] {
            if vec.len() != nc {
                return Err(PlantError::invalid_argument(format!(
                    "{name} has length {}, expected {nc}",
                    vec.len()
                )));
            }
            if vec.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(PlantError::invalid_argument(format!(
                    "{name} entries must be finite and non-negative"
                )));
            }
        }
        Ok(Self {
            mass_matrix,
            jn,
            jt,
            p_star,
            phi0,
            stiffness,
            damping,
            mu,
        })
    }

    /// Number of contacts `nc`.
    #[must_use]
    pub fn num_contacts(&self) -> usize {
        self.jn.nrows()
    }

    /// Number of generalized velocities `nv`.
    #[must_use]
    pub fn num_velocities(&self) -> usize {
        self.mass_matrix.nrows()
    }
}

/// The converged outputs of one solve, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSolution {
    v_next: DVector<f64>,
    fn_: DVector<f64>,
    ft: DVector<f64>,
    vn: DVector<f64>,
    vt: DVector<f64>,
    tau_contact: DVector<f64>,
    iterations: usize,
}

impl SolverSolution {
    /// Next-step generalized velocities `v` (nv).
    #[must_use]
    pub fn generalized_velocities(&self) -> &DVector<f64> {
        &self.v_next
    }

    /// Normal force magnitudes `fₙ` (nc).
    #[must_use]
    pub fn normal_forces(&self) -> &DVector<f64> {
        &self.fn_
    }

    /// Tangential friction forces `f_t` in contact-frame components (2nc).
    #[must_use]
    pub fn friction_forces(&self) -> &DVector<f64> {
        &self.ft
    }

    /// Normal separation rates `vₙ = Jn v` (nc).
    #[must_use]
    pub fn normal_velocities(&self) -> &DVector<f64> {
        &self.vn
    }

    /// Tangential velocities `v_t = Jt v` (2nc).
    #[must_use]
    pub fn tangential_velocities(&self) -> &DVector<f64> {
        &self.vt
    }

    /// Generalized contact forces `τ_c = Jnᵀ fₙ + Jtᵀ f_t` (nv).
    #[must_use]
    pub fn generalized_contact_forces(&self) -> &DVector<f64> {
        &self.tau_contact
    }

    /// Newton iterations spent.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

/// Per-contact force evaluation at a velocity iterate.
struct ForceEvaluation {
    fn_: DVector<f64>,
    ft: DVector<f64>,
    /// ∂fₙ/∂vₙ per contact (≤ 0).
    dfn_dvn: DVector<f64>,
    /// Soft-norm slip speed per contact.
    slip: DVector<f64>,
    /// μ(slip) per contact.
    mu_v: DVector<f64>,
    /// dμ/d‖v_t‖ per contact.
    dmu_dv: DVector<f64>,
}

/// Newton solver for the two-way coupled implicit Stribeck problem.
///
/// The solver itself holds only its size and parameters; every solve borrows
/// its inputs through [`ProblemData`] and returns a fresh
/// [`SolverSolution`], so concurrent contexts can share one instance.
#[derive(Debug, Clone)]
pub struct ImplicitStribeckSolver {
    nv: usize,
    parameters: SolverParameters,
}

impl ImplicitStribeckSolver {
    /// Create a solver for a system with `nv` generalized velocities.
    #[must_use]
    pub fn new(nv: usize) -> Self {
        Self {
            nv,
            parameters: SolverParameters::default(),
        }
    }

    /// The current iteration controls.
    #[must_use]
    pub fn parameters(&self) -> &SolverParameters {
        &self.parameters
    }

    /// Replace the iteration controls.
    pub fn set_parameters(&mut self, parameters: SolverParameters) {
        self.parameters = parameters;
    }

    /// Update only the stiction tolerance `v*`.
    pub fn set_stiction_tolerance(&mut self, stiction_tolerance: f64) -> Result<()> {
        // Validate through the model constructor.
        StribeckModel::new(stiction_tolerance)?;
        self.parameters.stiction_tolerance = stiction_tolerance;
        Ok(())
    }

    /// Solve one step of size `dt` starting the Newton iteration at
    /// `v_guess` (typically `v0`).
    ///
    /// Fails with [`PlantError::SolverDidNotConverge`] carrying
    /// [`SolverFailure::MaxIterationsReached`] or
    /// [`SolverFailure::LinearSolverFailure`].
    pub fn solve_with_guess(
        &self,
        dt: f64,
        data: &ProblemData<'_>,
        v_guess: &DVector<f64>,
    ) -> Result<SolverSolution> {
        if data.num_velocities() != self.nv {
            return Err(PlantError::invalid_argument(format!(
                "problem data is sized for nv = {}, solver expects {}",
                data.num_velocities(),
                self.nv
            )));
        }
        if v_guess.len() != self.nv {
            return Err(PlantError::invalid_argument(format!(
                "initial guess has length {}, expected {}",
                v_guess.len(),
                self.nv
            )));
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "step size must be strictly positive, got {dt}"
            )));
        }

        let nc = data.num_contacts();
        if nc == 0 {
            return self.solve_without_contact(data);
        }

        let stribeck = StribeckModel::new(self.parameters.stiction_tolerance)?;
        // Discrete mode receives a single coefficient per contact; the
        // regularization alone distinguishes stuck from sliding.
        let frictions = data
            .mu
            .iter()
            .map(|&mu| CoulombFriction::new(mu, mu))
            .collect::<Result<Vec<_>>>()?;

        let mut v = v_guess.clone();
        for iteration in 0..self.parameters.max_iterations {
            let vn = data.jn * &v;
            let vt = data.jt * &v;
            let eval = self.evaluate_forces(dt, data, &stribeck, &frictions, &vn, &vt);

            let residual = data.mass_matrix * &v
                - data.p_star
                - (data.jn.transpose() * &eval.fn_ + data.jt.transpose() * &eval.ft) * dt;

            let jacobian = self.assemble_newton_matrix(dt, data, &vt, &eval);
            let Some(dv) = jacobian.lu().solve(&(-&residual)) else {
                return Err(PlantError::SolverDidNotConverge(
                    SolverFailure::LinearSolverFailure,
                ));
            };

            let alpha = self.limit_step(data, &vt, &dv);
            let step = &dv * alpha;
            v += &step;

            // Convergence in the kinetic-energy norm of the update.
            let dv_norm = (step.dot(&(data.mass_matrix * &step))).max(0.0).sqrt();
            let v_norm = (v.dot(&(data.mass_matrix * &v))).max(0.0).sqrt();
            trace!(
                iteration,
                alpha,
                dv_norm,
                residual_norm = residual.norm(),
                "implicit Stribeck iterate"
            );
            if dv_norm
                < self.parameters.absolute_tolerance + self.parameters.relative_tolerance * v_norm
            {
                return Ok(self.package_solution(dt, data, &stribeck, &frictions, v, iteration + 1));
            }
        }

        Err(PlantError::SolverDidNotConverge(
            SolverFailure::MaxIterationsReached,
        ))
    }

    /// With no contacts the balance reduces to `M v = p*`.
    fn solve_without_contact(&self, data: &ProblemData<'_>) -> Result<SolverSolution> {
        let Some(chol) = data.mass_matrix.clone().cholesky() else {
            return Err(PlantError::SolverDidNotConverge(
                SolverFailure::LinearSolverFailure,
            ));
        };
        let v_next = chol.solve(data.p_star);
        Ok(SolverSolution {
            v_next,
            fn_: DVector::zeros(0),
            ft: DVector::zeros(0),
            vn: DVector::zeros(0),
            vt: DVector::zeros(0),
            tau_contact: DVector::zeros(self.nv),
            iterations: 0,
        })
    }

    /// Evaluate the closed-form contact laws and their gradients at a
    /// velocity iterate.
    fn evaluate_forces(
        &self,
        dt: f64,
        data: &ProblemData<'_>,
        stribeck: &StribeckModel,
        frictions: &[CoulombFriction],
        vn: &DVector<f64>,
        vt: &DVector<f64>,
    ) -> ForceEvaluation {
        let nc = data.num_contacts();
        // Soft-norm floor, far below any meaningful slip.
        let epsilon_v = self.parameters.stiction_tolerance * 1e-7;

        let mut fn_ = DVector::zeros(nc);
        let mut ft = DVector::zeros(2 * nc);
        let mut dfn_dvn = DVector::zeros(nc);
        let mut slip = DVector::zeros(nc);
        let mut mu_v = DVector::zeros(nc);
        let mut dmu_dv = DVector::zeros(nc);

        for i in 0..nc {
            let k = data.stiffness[i];
            let d = data.damping[i];
            // Forecast penetration and dissipation, each clamped on its own.
            let x = (data.phi0[i] - dt * vn[i]).max(0.0);
            let w = (1.0 - d * vn[i]).max(0.0);
            fn_[i] = k * x * w;
            dfn_dvn[i] = if x > 0.0 && w > 0.0 {
                -k * (dt * w + d * x)
            } else {
                0.0
            };

            let vt_i = Vector2::new(vt[2 * i], vt[2 * i + 1]);
            let s = (vt_i.norm_squared() + epsilon_v * epsilon_v).sqrt();
            slip[i] = s;
            let (mu, dmu) = stribeck.friction_coefficient_with_gradient(s, &frictions[i]);
            mu_v[i] = mu;
            dmu_dv[i] = dmu;

            let scale = -mu * fn_[i] / s;
            ft[2 * i] = scale * vt_i.x;
            ft[2 * i + 1] = scale * vt_i.y;
        }

        ForceEvaluation {
            fn_,
            ft,
            dfn_dvn,
            slip,
            mu_v,
            dmu_dv,
        }
    }

    /// Assemble `∂R/∂v` with the three coupling blocks:
    ///
    /// ```text
    /// J = M − Δt·[ Jnᵀ·diag(∂fₙ/∂vₙ)·Jn          (normal compliance)
    ///            + Σᵢ Jtᵢᵀ·Gtᵢ·Jtᵢ               (friction vs. slip)
    ///            + Σᵢ Jtᵢᵀ·gcᵢ·Jnᵢ ]             (friction vs. normal force)
    /// ```
    fn assemble_newton_matrix(
        &self,
        dt: f64,
        data: &ProblemData<'_>,
        vt: &DVector<f64>,
        eval: &ForceEvaluation,
    ) -> DMatrix<f64> {
        let nc = data.num_contacts();
        let mut jacobian = data.mass_matrix.clone();

        jacobian -= (data.jn.transpose() * DMatrix::from_diagonal(&eval.dfn_dvn) * data.jn) * dt;

        for i in 0..nc {
            let s = eval.slip[i];
            let t_hat = Vector2::new(vt[2 * i] / s, vt[2 * i + 1] / s);
            let mu = eval.mu_v[i];
            let fn_i = eval.fn_[i];

            // ∂f_t/∂v_t = −fₙ[ (μ/s)(I − t̂t̂ᵀ) + μ′·t̂t̂ᵀ ]
            let mut gt = DMatrix::zeros(2, 2);
            let mu_over_s = mu / s;
            for r in 0..2 {
                for c in 0..2 {
                    let tt = t_hat[r] * t_hat[c];
                    let identity = if r == c { 1.0 } else { 0.0 };
                    gt[(r, c)] = -fn_i * (mu_over_s * (identity - tt) + eval.dmu_dv[i] * tt);
                }
            }
            // ∂f_t/∂vₙ = −μ·t̂·(∂fₙ/∂vₙ)
            let gc = DMatrix::from_column_slice(
                2,
                1,
                &[
                    -mu * t_hat.x * eval.dfn_dvn[i],
                    -mu * t_hat.y * eval.dfn_dvn[i],
                ],
            );

            let jt_i = data.jt.rows(2 * i, 2);
            let jn_i = data.jn.rows(i, 1);
            jacobian -= (jt_i.transpose() * (&gt * jt_i + &gc * jn_i)) * dt;
        }

        jacobian
    }

    /// Limit the Newton step so no contact's slip speed changes by more than
    /// half of `max(current slip, v*)` - an iterate may approach the
    /// stiction band but never leap across it.
    fn limit_step(&self, data: &ProblemData<'_>, vt: &DVector<f64>, dv: &DVector<f64>) -> f64 {
        let dvt = data.jt * dv;
        let v_stiction = self.parameters.stiction_tolerance;
        let mut alpha: f64 = 1.0;
        for i in 0..data.num_contacts() {
            let vt_i = Vector2::new(vt[2 * i], vt[2 * i + 1]);
            let dvt_i = Vector2::new(dvt[2 * i], dvt[2 * i + 1]);
            let ds = dvt_i.norm();
            if ds < 1e-14 {
                continue;
            }
            let cap = 0.5 * vt_i.norm().max(v_stiction);
            alpha = alpha.min(cap / ds);
        }
        alpha.min(1.0)
    }

    /// Re-evaluate the contact laws at the converged velocity and bundle the
    /// outputs.
    fn package_solution(
        &self,
        dt: f64,
        data: &ProblemData<'_>,
        stribeck: &StribeckModel,
        frictions: &[CoulombFriction],
        v: DVector<f64>,
        iterations: usize,
    ) -> SolverSolution {
        let vn = data.jn * &v;
        let vt = data.jt * &v;
        let eval = self.evaluate_forces(dt, data, stribeck, frictions, &vn, &vt);
        let tau_contact = data.jn.transpose() * &eval.fn_ + data.jt.transpose() * &eval.ft;
        SolverSolution {
            v_next: v,
            fn_: eval.fn_,
            ft: eval.ft,
            vn,
            vt,
            tau_contact,
            iterations,
        }
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
    use approx::assert_relative_eq;

    const DT: f64 = 1e-3;
    const MASS: f64 = 1.0;
    const G: f64 = 9.81;
    const V_STICTION: f64 = 1e-4;

    fn solver(nv: usize) -> ImplicitStribeckSolver {
        let mut solver = ImplicitStribeckSolver::new(nv);
        let mut params = SolverParameters::default();
        params.stiction_tolerance = V_STICTION;
        solver.set_parameters(params);
        solver
    }

    /// A unit mass free to move along Z, resting on a compliant ground.
    /// At the equilibrium depth mg/k the solver must keep it at rest with
    /// fₙ = mg.
    #[test]
    fn test_normal_equilibrium() {
        let delta = 1e-4;
        let k = MASS * G / delta;
        let d = 0.0;

        let m = DMatrix::from_element(1, 1, MASS);
        let jn = DMatrix::from_element(1, 1, 1.0);
        let jt = DMatrix::zeros(2, 1);
        // p* = M v0 − Δt·minus_tau, with gravity the only applied force.
        let p_star = DVector::from_element(1, -DT * MASS * G);
        let phi0 = DVector::from_element(1, MASS * G / k);
        let stiffness = DVector::from_element(1, k);
        let damping = DVector::from_element(1, d);
        let mu = DVector::from_element(1, 0.5);

        let data = ProblemData::new(&m, &jn, &jt, &p_star, &phi0, &stiffness, &damping, &mu)
            .unwrap();
        let solution = solver(1)
            .solve_with_guess(DT, &data, &DVector::zeros(1))
            .unwrap();

        assert_relative_eq!(solution.generalized_velocities()[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(solution.normal_forces()[0], MASS * G, epsilon = 1e-6);
        assert_relative_eq!(solution.normal_velocities()[0], 0.0, epsilon = 1e-10);
    }

    /// An approaching contact must produce a larger force than the static
    /// law (Hunt–Crossley dissipation) and slow the approach.
    #[test]
    fn test_approach_is_damped() {
        let delta = 1e-4;
        let k = MASS * G / delta;
        let d = 0.1;
        let v0 = -0.1; // approaching: separation rate negative

        let m = DMatrix::from_element(1, 1, MASS);
        let jn = DMatrix::from_element(1, 1, 1.0);
        let jt = DMatrix::zeros(2, 1);
        let p_star = DVector::from_element(1, MASS * v0 - DT * MASS * G);
        let phi0 = DVector::from_element(1, delta);
        let stiffness = DVector::from_element(1, k);
        let damping = DVector::from_element(1, d);
        let mu = DVector::from_element(1, 0.5);

        let data = ProblemData::new(&m, &jn, &jt, &p_star, &phi0, &stiffness, &damping, &mu)
            .unwrap();
        let solution = solver(1)
            .solve_with_guess(DT, &data, &DVector::from_element(1, v0))
            .unwrap();

        // The contact pushes back: next velocity is less negative than the
        // no-contact prediction v0 − Δt·g.
        assert!(solution.generalized_velocities()[0] > v0 - DT * G);
        assert!(solution.normal_forces()[0] > 0.0);
    }

    /// Horizontal slider with a constant normal load: below the friction
    /// limit the slip stays within the stiction band.
    #[test]
    fn test_stiction_holds_below_friction_limit() {
        let mu_s = 0.5;
        let applied = 0.5 * mu_s * MASS * G;
        let solution = solve_slider(mu_s, applied, DVector::zeros(1));
        let v = solution.generalized_velocities()[0];
        assert!(
            v.abs() < V_STICTION,
            "slider crept to {v} with |v*| = {V_STICTION}"
        );
        // Friction balances the applied force while stuck, up to the small
        // momentum carried by the regularized creep velocity.
        assert_relative_eq!(
            solution.friction_forces()[1].abs(),
            applied,
            max_relative = 0.05
        );
    }

    /// Above the friction limit the slider accelerates.
    #[test]
    fn test_sliding_above_friction_limit() {
        let mu_s = 0.5;
        let applied = 1.5 * mu_s * MASS * G;
        let mut v = DVector::zeros(1);
        for _ in 0..20 {
            let solution = solve_slider(mu_s, applied, v.clone());
            v = solution.generalized_velocities().clone();
        }
        assert!(v[0] > V_STICTION, "slider stuck at {}", v[0]);
        // Terminal per-step gain approaches Δt·(F − μ·m·g)/m.
        let expected_gain = DT * (applied - mu_s * MASS * G) / MASS;
        let before = v[0];
        let after = solve_slider(mu_s, applied, v).generalized_velocities()[0];
        assert_relative_eq!(after - before, expected_gain, max_relative = 0.05);
    }

    /// One horizontal DOF, fixed penetration so that fₙ = m·g, pushed by a
    /// constant force.
    fn solve_slider(mu_s: f64, applied: f64, v0: DVector<f64>) -> SolverSolution {
        let delta = 1e-4;
        let k = MASS * G / delta;

        let m = DMatrix::from_element(1, 1, MASS);
        // Motion is orthogonal to the normal: Jn row is zero, the second
        // tangent row carries the DOF.
        let jn = DMatrix::zeros(1, 1);
        let mut jt = DMatrix::zeros(2, 1);
        jt[(1, 0)] = 1.0;
        let p_star = DVector::from_element(1, MASS * v0[0] + DT * applied);
        let phi0 = DVector::from_element(1, MASS * G / k);
        let stiffness = DVector::from_element(1, k);
        let damping = DVector::from_element(1, 0.0);
        let mu = DVector::from_element(1, mu_s);

        let data = ProblemData::new(&m, &jn, &jt, &p_star, &phi0, &stiffness, &damping, &mu)
            .unwrap();
        solver(1).solve_with_guess(DT, &data, &v0).unwrap()
    }

    /// With no contacts the step must reduce to v = M⁻¹ p*.
    #[test]
    fn test_contact_free_step() {
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 3.0]));
        let jn = DMatrix::zeros(0, 2);
        let jt = DMatrix::zeros(0, 2);
        let p_star = DVector::from_vec(vec![4.0, -6.0]);
        let empty = DVector::zeros(0);

        let data =
            ProblemData::new(&m, &jn, &jt, &p_star, &empty, &empty, &empty, &empty).unwrap();
        let solution = solver(2)
            .solve_with_guess(DT, &data, &DVector::zeros(2))
            .unwrap();

        assert_relative_eq!(solution.generalized_velocities()[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(solution.generalized_velocities()[1], -2.0, epsilon = 1e-12);
        assert_eq!(solution.iterations(), 0);
        assert_relative_eq!(
            solution.generalized_contact_forces().norm(),
            0.0,
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_dimension_validation() {
        let m = DMatrix::from_element(1, 1, MASS);
        let jn = DMatrix::zeros(1, 2); // wrong nv
        let jt = DMatrix::zeros(2, 1);
        let p_star = DVector::zeros(1);
        let one = DVector::from_element(1, 1.0);
        assert!(ProblemData::new(&m, &jn, &jt, &p_star, &one, &one, &one, &one).is_err());
    }

    #[test]
    fn test_guess_length_validation() {
        let m = DMatrix::from_element(1, 1, MASS);
        let jn = DMatrix::zeros(0, 1);
        let jt = DMatrix::zeros(0, 1);
        let p_star = DVector::zeros(1);
        let empty = DVector::zeros(0);
        let data =
            ProblemData::new(&m, &jn, &jt, &p_star, &empty, &empty, &empty, &empty).unwrap();
        let err = solver(1)
            .solve_with_guess(DT, &data, &DVector::zeros(3))
            .unwrap_err();
        assert!(matches!(err, PlantError::InvalidArgument { .. }));
    }
}
