//! Generic nonlinear-program boundary.
//!
//! ```text
//! min_z  f(z)
//! s.t.   c(z)  = 0
//!        g(z) <= 0
//!        lb <= z <= ub
//! ```

use lcmpc_core::error::{DynamicsError, SolverFailure};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

// ---------------------------------------------------------------------------
// NlpProblem
// ---------------------------------------------------------------------------

/// A smooth constrained nonlinear program.
///
/// Evaluation may fail with a [`DynamicsError`] (e.g. a singular mass
/// matrix inside the dynamics residuals); solvers propagate such errors
/// instead of treating them as a solver status.
pub trait NlpProblem {
    /// Dimension of the decision vector `z`.
    fn num_variables(&self) -> usize;

    /// Number of equality residuals `c(z)`.
    fn num_equalities(&self) -> usize;

    /// Number of inequality residuals `g(z) <= 0`.
    fn num_inequalities(&self) -> usize {
        0
    }

    /// Objective value `f(z)`.
    fn objective(&self, z: &DVector<f64>) -> Result<f64, DynamicsError>;

    /// Objective gradient `∇f(z)`.
    fn gradient(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError>;

    /// Positive semi-definite approximation of the Hessian of the Lagrangian
    /// `L = f + λᵀc + μᵀg` at `z`.
    fn lagrangian_hessian(
        &self,
        z: &DVector<f64>,
        lambda: &DVector<f64>,
        mu: &DVector<f64>,
    ) -> Result<DMatrix<f64>, DynamicsError>;

    /// Equality residuals `c(z)`.
    fn equalities(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError>;

    /// Jacobian of `c` (`num_equalities × num_variables`).
    fn equality_jacobian(&self, z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError>;

    /// Inequality residuals `g(z)`.
    fn inequalities(&self, _z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
        Ok(DVector::zeros(0))
    }

    /// Jacobian of `g` (`num_inequalities × num_variables`).
    fn inequality_jacobian(&self, _z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
        Ok(DMatrix::zeros(0, self.num_variables()))
    }

    /// Variable lower bounds; `-inf` where unbounded.
    fn lower_bounds(&self) -> DVector<f64>;

    /// Variable upper bounds; `+inf` where unbounded.
    fn upper_bounds(&self) -> DVector<f64>;
}

// ---------------------------------------------------------------------------
// NlpSolution
// ---------------------------------------------------------------------------

/// Primal solution of a successful solve.
#[derive(Clone, Debug)]
pub struct NlpSolution {
    /// Optimal decision vector.
    pub z: DVector<f64>,
    /// Objective value at `z`.
    pub objective: f64,
    /// Equality multipliers from the final QP.
    pub lambda: DVector<f64>,
    /// Infinity norm of the constraint violation at `z`.
    pub constraint_violation: f64,
    /// SQP iterations performed.
    pub iterations: u32,
    /// Wall-clock solve time in microseconds.
    pub solve_time_us: u64,
}

// ---------------------------------------------------------------------------
// NlpSolver
// ---------------------------------------------------------------------------

/// Why a solve produced no solution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// The solver ran but did not reach an optimal point.
    #[error(transparent)]
    Failure(#[from] SolverFailure),

    /// Problem evaluation failed; fatal for this solve.
    #[error(transparent)]
    Evaluation(#[from] DynamicsError),
}

/// A nonlinear program solver.
///
/// Solvers are stateless across calls: everything a solve depends on is the
/// problem and the optional initial guess.
pub trait NlpSolver: Send + Sync {
    /// Solve `problem`, starting from `guess` (zeros when `None`).
    fn solve(
        &self,
        problem: &dyn NlpProblem,
        guess: Option<&DVector<f64>>,
    ) -> Result<NlpSolution, SolveError>;

    /// Human-readable name for this solver.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Nearest positive semi-definite matrix to the symmetric part of `m`
/// (negative eigenvalues clamped to zero).
pub fn project_psd(m: &DMatrix<f64>) -> DMatrix<f64> {
    let sym = 0.5 * (m + m.transpose());
    let mut eig = sym.clone().symmetric_eigen();
    if eig.eigenvalues.iter().all(|&v| v >= 0.0) {
        return sym;
    }
    eig.eigenvalues.apply(|v| *v = v.max(0.0));
    eig.recompose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn psd_matrix_unchanged() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        assert_relative_eq!(project_psd(&m), m, epsilon = 1e-12);
    }

    #[test]
    fn indefinite_matrix_clamped() {
        // Eigenvalues 3 and -1 along (1,1)/√2 and (1,-1)/√2.
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let p = project_psd(&m);
        let expected = DMatrix::from_row_slice(2, 2, &[1.5, 1.5, 1.5, 1.5]);
        assert_relative_eq!(p, expected, epsilon = 1e-12);
    }

    #[test]
    fn solve_error_display_is_transparent() {
        let err = SolveError::from(SolverFailure::Infeasible);
        assert_eq!(err.to_string(), SolverFailure::Infeasible.to_string());
        let err = SolveError::from(DynamicsError::NonFinite);
        assert_eq!(err.to_string(), DynamicsError::NonFinite.to_string());
    }
}
