//! Sequential quadratic programming with Clarabel QP subproblems.
//!
//! Each iteration:
//! 1. Evaluate objective gradient, constraint residuals and Jacobians, and
//!    the problem's PSD Lagrangian Hessian at the current iterate.
//! 2. Solve the QP subproblem for the step `d` and new multipliers.
//! 3. Stop if both `|d|_inf` and the constraint violation are below tolerance.
//! 4. Otherwise backtrack on the ℓ1 merit `f + ρ (|c|_1 + |max(g, 0)|_1)`
//!    against the maximum of the last few merit values (non-monotone), with
//!    `ρ` raised above the multiplier magnitude whenever needed.

use std::collections::VecDeque;
use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use lcmpc_core::config::SolverConfig;
use lcmpc_core::error::{DynamicsError, SolverFailure};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::nlp::{NlpProblem, NlpSolution, NlpSolver, SolveError};

/// Sufficient-decrease constant for the merit line search.
const ARMIJO: f64 = 1e-4;

/// Number of past merit values the line search compares against.
const MERIT_MEMORY: usize = 4;

/// Gap and feasibility tolerance handed to Clarabel.
const QP_TOLERANCE: f64 = 1e-9;

/// Magnitude below which dense entries are dropped from the CSC matrices.
const SPARSITY_EPS: f64 = 1e-15;

// ---------------------------------------------------------------------------
// SqpSolver
// ---------------------------------------------------------------------------

/// Line-search SQP solver. Stateless: every call starts from its own guess.
#[derive(Clone, Debug, Default)]
pub struct SqpSolver {
    config: SolverConfig,
}

impl SqpSolver {
    /// Create a new SQP solver with the given configuration.
    pub const fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Access the solver configuration.
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn elapsed_ms(start: Instant) -> u64 {
        u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn check_time(&self, start: Instant) -> Result<(), SolverFailure> {
        match self.config.time_limit_secs {
            Some(limit) if start.elapsed().as_secs_f64() > limit => {
                Err(SolverFailure::TimeLimitExceeded {
                    elapsed_ms: Self::elapsed_ms(start),
                })
            }
            _ => Ok(()),
        }
    }

    /// Build and solve the QP subproblem at `current`.
    #[allow(clippy::too_many_arguments)]
    fn solve_qp(
        &self,
        problem: &dyn NlpProblem,
        current: &Iterate,
        gradient: &DVector<f64>,
        lambda: &DVector<f64>,
        mu: &DVector<f64>,
        bounds: (&DVector<f64>, &DVector<f64>),
        start: Instant,
    ) -> Result<QpStep, SolveError> {
        let n = current.z.len();
        let m_eq = current.eq.len();
        let m_in = current.ineq.len();
        let (lb, ub) = bounds;

        let mut hessian = problem.lagrangian_hessian(&current.z, lambda, mu)?;
        let jac_eq = problem.equality_jacobian(&current.z)?;
        let jac_in = problem.inequality_jacobian(&current.z)?;
        if hessian.shape() != (n, n) || jac_eq.shape() != (m_eq, n) || jac_in.shape() != (m_in, n)
        {
            return Err(SolverFailure::NumericalError(format!(
                "derivative shapes H={:?}, Jc={:?}, Jg={:?} do not match n={n}, m_eq={m_eq}, m_in={m_in}",
                hessian.shape(),
                jac_eq.shape(),
                jac_in.shape()
            ))
            .into());
        }
        for i in 0..n {
            hessian[(i, i)] += self.config.hessian_regularization;
        }

        // Bound rows in step space: d_i <= ub_i - z_i and -d_i <= z_i - lb_i.
        let upper: Vec<(usize, f64)> = (0..n)
            .filter(|&i| ub[i].is_finite())
            .map(|i| (i, ub[i] - current.z[i]))
            .collect();
        let lower: Vec<(usize, f64)> = (0..n)
            .filter(|&i| lb[i].is_finite())
            .map(|i| (i, current.z[i] - lb[i]))
            .collect();

        let n_cone = m_in + upper.len() + lower.len();
        let n_rows = m_eq + n_cone;
        let mut a_all = DMatrix::zeros(n_rows, n);
        let mut b_all = DVector::zeros(n_rows);

        a_all.rows_mut(0, m_eq).copy_from(&jac_eq);
        b_all.rows_mut(0, m_eq).copy_from(&(-&current.eq));
        a_all.rows_mut(m_eq, m_in).copy_from(&jac_in);
        b_all.rows_mut(m_eq, m_in).copy_from(&(-&current.ineq));

        let mut row = m_eq + m_in;
        for &(i, slack) in &upper {
            a_all[(row, i)] = 1.0;
            b_all[row] = slack;
            row += 1;
        }
        for &(i, slack) in &lower {
            a_all[(row, i)] = -1.0;
            b_all[row] = slack;
            row += 1;
        }
        debug_assert_eq!(row, n_rows, "QP constraint row count mismatch");

        let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
        if m_eq > 0 {
            cones.push(ZeroConeT(m_eq));
        }
        if n_cone > 0 {
            cones.push(NonnegativeConeT(n_cone));
        }

        let mut builder = DefaultSettingsBuilder::default();
        builder
            .max_iter(self.config.qp_max_iterations)
            .verbose(false)
            .tol_gap_abs(QP_TOLERANCE)
            .tol_gap_rel(QP_TOLERANCE)
            .tol_feas(QP_TOLERANCE);
        if let Some(limit) = self.config.time_limit_secs {
            let remaining = (limit - start.elapsed().as_secs_f64()).max(1e-3);
            builder.time_limit(remaining);
        }
        let settings = builder
            .build()
            .map_err(|e| SolverFailure::NumericalError(format!("invalid QP settings: {e}")))?;

        let p_csc = dmatrix_to_csc_upper_tri(&hessian);
        let a_csc = dmatrix_to_csc(&a_all);
        let q_slice: Vec<f64> = gradient.iter().copied().collect();
        let b_slice: Vec<f64> = b_all.iter().copied().collect();

        let mut solver = DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_slice, &cones, settings);
        solver.solve();
        let sol = &solver.solution;

        match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                return Err(SolverFailure::Infeasible.into());
            }
            SolverStatus::MaxTime => {
                return Err(SolverFailure::TimeLimitExceeded {
                    elapsed_ms: Self::elapsed_ms(start),
                }
                .into());
            }
            status => {
                return Err(SolverFailure::NumericalError(format!(
                    "QP subproblem ended with status {status:?}"
                ))
                .into());
            }
        }

        let d = DVector::from_column_slice(&sol.x);
        if !d.iter().all(|v| v.is_finite()) {
            return Err(SolverFailure::NumericalError("QP step is not finite".into()).into());
        }

        Ok(QpStep {
            d,
            lambda: DVector::from_column_slice(&sol.z[..m_eq]),
            mu: DVector::from_column_slice(&sol.z[m_eq..m_eq + m_in]),
            qp_iterations: sol.iterations,
        })
    }
}

impl NlpSolver for SqpSolver {
    fn solve(
        &self,
        problem: &dyn NlpProblem,
        guess: Option<&DVector<f64>>,
    ) -> Result<NlpSolution, SolveError> {
        let start = Instant::now();
        let n = problem.num_variables();
        let lb = problem.lower_bounds();
        let ub = problem.upper_bounds();

        let z0 = match guess {
            Some(g) if g.len() == n => g.clone(),
            Some(g) => {
                return Err(SolverFailure::NumericalError(format!(
                    "initial guess has {} entries, expected {n}",
                    g.len()
                ))
                .into());
            }
            None => DVector::zeros(n),
        };

        let mut current = Iterate::evaluate(problem, project(&z0, &lb, &ub))?;
        if !current.is_finite() {
            return Err(SolverFailure::NumericalError(
                "objective or residuals not finite at the initial guess".into(),
            )
            .into());
        }

        let mut lambda = DVector::zeros(current.eq.len());
        let mut mu = DVector::zeros(current.ineq.len());
        let mut penalty = 1.0_f64;
        let mut history: VecDeque<(f64, f64)> = VecDeque::with_capacity(MERIT_MEMORY);

        for iteration in 1..=self.config.max_iterations {
            self.check_time(start)?;

            let gradient = problem.gradient(&current.z)?;
            let step = self.solve_qp(
                problem,
                &current,
                &gradient,
                &lambda,
                &mu,
                (&lb, &ub),
                start,
            )?;

            let step_norm = inf_norm(&step.d);
            let violation = current.violation_inf();
            debug!(
                iteration,
                objective = current.objective,
                violation,
                step_norm,
                penalty,
                qp_iterations = step.qp_iterations,
                "sqp iteration"
            );

            if step_norm <= self.config.step_tolerance * (1.0 + inf_norm(&current.z))
                && violation <= self.config.feasibility_tolerance
            {
                return Ok(NlpSolution {
                    objective: current.objective,
                    constraint_violation: violation,
                    z: current.z,
                    lambda: step.lambda,
                    iterations: iteration,
                    solve_time_us: u64::try_from(start.elapsed().as_micros())
                        .unwrap_or(u64::MAX),
                });
            }

            lambda = step.lambda;
            mu = step.mu;
            penalty = penalty.max(1.1 * inf_norm(&lambda).max(inf_norm(&mu)) + 1e-3);

            let slope = (gradient.dot(&step.d) - penalty * current.violation_l1()).min(0.0);
            if history.len() == MERIT_MEMORY {
                history.pop_front();
            }
            history.push_back((current.objective, current.violation_l1()));
            let reference = history
                .iter()
                .map(|(f, v)| f + penalty * v)
                .fold(f64::NEG_INFINITY, f64::max);

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..=self.config.max_backtracks {
                let trial_z = project(&(&current.z + alpha * &step.d), &lb, &ub);
                let trial = Iterate::evaluate(problem, trial_z)?;
                if trial.is_finite() && trial.merit(penalty) <= reference + ARMIJO * alpha * slope {
                    accepted = Some(trial);
                    break;
                }
                trace!(iteration, alpha, "merit line search backtrack");
                alpha *= 0.5;
            }

            current = accepted.ok_or_else(|| {
                SolverFailure::NumericalError(format!(
                    "line search failed at iteration {iteration} (step norm {step_norm:e})"
                ))
            })?;
        }

        Err(SolverFailure::MaxIterationsExceeded {
            iterations: self.config.max_iterations,
        }
        .into())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "SqpSolver"
    }
}

// ---------------------------------------------------------------------------
// Iterate
// ---------------------------------------------------------------------------

/// A decision vector together with its objective and residuals.
struct Iterate {
    z: DVector<f64>,
    objective: f64,
    eq: DVector<f64>,
    ineq: DVector<f64>,
}

impl Iterate {
    fn evaluate(problem: &dyn NlpProblem, z: DVector<f64>) -> Result<Self, DynamicsError> {
        let objective = problem.objective(&z)?;
        let eq = problem.equalities(&z)?;
        let ineq = problem.inequalities(&z)?;
        Ok(Self {
            z,
            objective,
            eq,
            ineq,
        })
    }

    fn is_finite(&self) -> bool {
        self.objective.is_finite()
            && self.eq.iter().all(|v| v.is_finite())
            && self.ineq.iter().all(|v| v.is_finite())
    }

    fn violation_l1(&self) -> f64 {
        self.eq.iter().map(|v| v.abs()).sum::<f64>()
            + self.ineq.iter().map(|v| v.max(0.0)).sum::<f64>()
    }

    fn violation_inf(&self) -> f64 {
        let eq = inf_norm(&self.eq);
        let ineq = self.ineq.iter().fold(0.0_f64, |acc, v| acc.max(*v));
        eq.max(ineq)
    }

    fn merit(&self, penalty: f64) -> f64 {
        self.objective + penalty * self.violation_l1()
    }
}

struct QpStep {
    d: DVector<f64>,
    lambda: DVector<f64>,
    mu: DVector<f64>,
    qp_iterations: u32,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Clamp `z` into `[lb, ub]` componentwise.
fn project(z: &DVector<f64>, lb: &DVector<f64>, ub: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        z.len(),
        z.iter()
            .zip(lb.iter().zip(ub.iter()))
            .map(|(v, (lo, hi))| v.max(*lo).min(*hi)),
    )
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>` (full matrix).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for (j, column) in m.column_iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            if v.abs() > SPARSITY_EPS {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a symmetric `DMatrix<f64>` as a Clarabel `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            // Average the mirrored entries so tiny asymmetries from finite
            // differences cancel.
            let v = 0.5 * (m[(i, j)] + m[(j, i)]);
            if v.abs() > SPARSITY_EPS {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::project_psd;
    use approx::assert_relative_eq;
    use lcmpc_test_utils::test_solver_config;

    /// min (z0-1)² + (z1-2)²  s.t.  z0 + z1 = 1, optional bound z0 <= ub0.
    struct LinearEquality {
        ub0: f64,
    }

    impl NlpProblem for LinearEquality {
        fn num_variables(&self) -> usize {
            2
        }
        fn num_equalities(&self) -> usize {
            1
        }
        fn objective(&self, z: &DVector<f64>) -> Result<f64, DynamicsError> {
            Ok((z[0] - 1.0).powi(2) + (z[1] - 2.0).powi(2))
        }
        fn gradient(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            Ok(DVector::from_vec(vec![2.0 * (z[0] - 1.0), 2.0 * (z[1] - 2.0)]))
        }
        fn lagrangian_hessian(
            &self,
            _z: &DVector<f64>,
            _lambda: &DVector<f64>,
            _mu: &DVector<f64>,
        ) -> Result<DMatrix<f64>, DynamicsError> {
            Ok(DMatrix::identity(2, 2) * 2.0)
        }
        fn equalities(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            Ok(DVector::from_vec(vec![z[0] + z[1] - 1.0]))
        }
        fn equality_jacobian(&self, _z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
            Ok(DMatrix::from_row_slice(1, 2, &[1.0, 1.0]))
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, f64::NEG_INFINITY)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_vec(vec![self.ub0, f64::INFINITY])
        }
    }

    /// min z0² + z1²  s.t.  z0 z1 = 1, optionally z0 + z1 >= 2.5.
    struct Hyperbola {
        with_inequality: bool,
    }

    impl NlpProblem for Hyperbola {
        fn num_variables(&self) -> usize {
            2
        }
        fn num_equalities(&self) -> usize {
            1
        }
        fn num_inequalities(&self) -> usize {
            usize::from(self.with_inequality)
        }
        fn objective(&self, z: &DVector<f64>) -> Result<f64, DynamicsError> {
            Ok(z.norm_squared())
        }
        fn gradient(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            Ok(2.0 * z)
        }
        fn lagrangian_hessian(
            &self,
            _z: &DVector<f64>,
            lambda: &DVector<f64>,
            _mu: &DVector<f64>,
        ) -> Result<DMatrix<f64>, DynamicsError> {
            let h = DMatrix::from_row_slice(2, 2, &[2.0, lambda[0], lambda[0], 2.0]);
            Ok(project_psd(&h))
        }
        fn equalities(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            Ok(DVector::from_vec(vec![z[0] * z[1] - 1.0]))
        }
        fn equality_jacobian(&self, z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
            Ok(DMatrix::from_row_slice(1, 2, &[z[1], z[0]]))
        }
        fn inequalities(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            if self.with_inequality {
                Ok(DVector::from_vec(vec![2.5 - z[0] - z[1]]))
            } else {
                Ok(DVector::zeros(0))
            }
        }
        fn inequality_jacobian(&self, _z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
            if self.with_inequality {
                Ok(DMatrix::from_row_slice(1, 2, &[-1.0, -1.0]))
            } else {
                Ok(DMatrix::zeros(0, 2))
            }
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, f64::NEG_INFINITY)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, f64::INFINITY)
        }
    }

    /// Equalities that always fail to evaluate.
    struct Broken;

    impl NlpProblem for Broken {
        fn num_variables(&self) -> usize {
            1
        }
        fn num_equalities(&self) -> usize {
            1
        }
        fn objective(&self, z: &DVector<f64>) -> Result<f64, DynamicsError> {
            Ok(z[0] * z[0])
        }
        fn gradient(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            Ok(2.0 * z)
        }
        fn lagrangian_hessian(
            &self,
            _z: &DVector<f64>,
            _lambda: &DVector<f64>,
            _mu: &DVector<f64>,
        ) -> Result<DMatrix<f64>, DynamicsError> {
            Ok(DMatrix::identity(1, 1))
        }
        fn equalities(&self, _z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
            Err(DynamicsError::NonFinite)
        }
        fn equality_jacobian(&self, _z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
            Err(DynamicsError::NonFinite)
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(1, f64::NEG_INFINITY)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(1, f64::INFINITY)
        }
    }

    fn solver() -> SqpSolver {
        SqpSolver::new(test_solver_config())
    }

    #[test]
    fn linear_equality_qp_solved_exactly() {
        let sol = solver()
            .solve(&LinearEquality { ub0: f64::INFINITY }, None)
            .unwrap();
        assert_relative_eq!(sol.z[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(sol.z[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(sol.objective, 2.0, epsilon = 1e-6);
        assert!(sol.constraint_violation < 1e-7);
    }

    #[test]
    fn active_upper_bound_respected() {
        // Unbounded optimum has z0 = 0; forcing z0 <= -1 moves it to (-1, 2).
        let sol = solver().solve(&LinearEquality { ub0: -1.0 }, None).unwrap();
        assert!(sol.z[0] <= -1.0 + 1e-9);
        assert_relative_eq!(sol.z[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(sol.z[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn nonlinear_equality_converges_to_nearest_minimum() {
        let guess = DVector::from_vec(vec![2.0, 1.0]);
        let sol = solver()
            .solve(&Hyperbola { with_inequality: false }, Some(&guess))
            .unwrap();
        assert_relative_eq!(sol.z[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(sol.z[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(sol.objective, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn nonlinear_inequality_active_at_solution() {
        // z0 z1 = 1 and z0 + z1 >= 2.5: minimiser sits on z0 + z1 = 2.5,
        // i.e. {2, 0.5} in either order, objective 4.25.
        let guess = DVector::from_vec(vec![3.0, 0.5]);
        let sol = solver()
            .solve(&Hyperbola { with_inequality: true }, Some(&guess))
            .unwrap();
        assert_relative_eq!(sol.z[0] + sol.z[1], 2.5, epsilon = 1e-5);
        assert_relative_eq!(sol.z[0] * sol.z[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(sol.objective, 4.25, epsilon = 1e-4);
    }

    #[test]
    fn conflicting_bound_reports_infeasible() {
        // z0 = 5 cannot hold inside |z0| <= 1.
        struct Conflict;
        impl NlpProblem for Conflict {
            fn num_variables(&self) -> usize {
                1
            }
            fn num_equalities(&self) -> usize {
                1
            }
            fn objective(&self, z: &DVector<f64>) -> Result<f64, DynamicsError> {
                Ok(z[0] * z[0])
            }
            fn gradient(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
                Ok(2.0 * z)
            }
            fn lagrangian_hessian(
                &self,
                _z: &DVector<f64>,
                _lambda: &DVector<f64>,
                _mu: &DVector<f64>,
            ) -> Result<DMatrix<f64>, DynamicsError> {
                Ok(DMatrix::identity(1, 1) * 2.0)
            }
            fn equalities(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
                Ok(DVector::from_vec(vec![z[0] - 5.0]))
            }
            fn equality_jacobian(&self, _z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
                Ok(DMatrix::identity(1, 1))
            }
            fn lower_bounds(&self) -> DVector<f64> {
                DVector::from_element(1, -1.0)
            }
            fn upper_bounds(&self) -> DVector<f64> {
                DVector::from_element(1, 1.0)
            }
        }

        let err = solver().solve(&Conflict, None).unwrap_err();
        assert_eq!(err, SolveError::Failure(SolverFailure::Infeasible));
    }

    #[test]
    fn iteration_cap_reported() {
        let sqp = SqpSolver::new(test_solver_config().with_max_iterations(1));
        let guess = DVector::from_vec(vec![4.0, 3.0]);
        let err = sqp
            .solve(&Hyperbola { with_inequality: false }, Some(&guess))
            .unwrap_err();
        assert_eq!(
            err,
            SolveError::Failure(SolverFailure::MaxIterationsExceeded { iterations: 1 })
        );
    }

    #[test]
    fn wrong_guess_dimension_rejected() {
        let guess = DVector::zeros(3);
        let err = solver()
            .solve(&LinearEquality { ub0: f64::INFINITY }, Some(&guess))
            .unwrap_err();
        assert!(matches!(
            err,
            SolveError::Failure(SolverFailure::NumericalError(_))
        ));
    }

    #[test]
    fn evaluation_error_propagates() {
        let err = solver().solve(&Broken, None).unwrap_err();
        assert_eq!(err, SolveError::Evaluation(DynamicsError::NonFinite));
    }

    #[test]
    fn repeated_solves_identical() {
        let guess = DVector::from_vec(vec![2.0, 1.0]);
        let problem = Hyperbola { with_inequality: false };
        let a = solver().solve(&problem, Some(&guess)).unwrap();
        let b = solver().solve(&problem, Some(&guess)).unwrap();
        assert_eq!(a.z, b.z);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn csc_conversion_keeps_nonzeros() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let csc = dmatrix_to_csc(&m);
        assert_eq!(csc.colptr, vec![0, 1, 2, 3]);
        assert_eq!(csc.rowval, vec![0, 1, 0]);
        assert_eq!(csc.nzval, vec![1.0, 3.0, 2.0]);

        let sym = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 5.0]);
        let upper = dmatrix_to_csc_upper_tri(&sym);
        assert_eq!(upper.colptr, vec![0, 1, 3]);
        assert_eq!(upper.rowval, vec![0, 0, 1]);
        assert_eq!(upper.nzval, vec![4.0, 1.0, 5.0]);
    }
}
