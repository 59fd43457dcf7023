//! Glue between [`OcpProblem`] and a generic [`NlpSolver`].

use lcmpc_core::config::SolverConfig;
use lcmpc_core::error::{DynamicsError, SolverFailure};
use lcmpc_core::types::{Control, State};
use thiserror::Error;

use crate::nlp::{NlpSolver, SolveError};
use crate::sqp::SqpSolver;
use crate::transcription::{InitialGuess, OcpProblem};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an OCP could not be built or solved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcpError {
    #[error("Dynamics error: {0}")]
    Dynamics(#[from] DynamicsError),

    #[error("Solver failure: {0}")]
    Solver(#[from] SolverFailure),

    #[error("Invalid problem: {0}")]
    InvalidProblem(String),
}

impl From<SolveError> for OcpError {
    fn from(err: SolveError) -> Self {
        match err {
            SolveError::Failure(failure) => Self::Solver(failure),
            SolveError::Evaluation(dynamics) => Self::Dynamics(dynamics),
        }
    }
}

impl OcpError {
    /// `true` for recoverable solver outcomes (as opposed to dynamics
    /// singularities or malformed problems).
    pub const fn is_solver_failure(&self) -> bool {
        matches!(self, Self::Solver(_))
    }
}

// ---------------------------------------------------------------------------
// OcpSolution
// ---------------------------------------------------------------------------

/// Optimal trajectories of a solved OCP with the cost split into parts.
#[derive(Debug, Clone, PartialEq)]
pub struct OcpSolution {
    /// `N + 1` states; `states[0]` is the problem's initial state.
    pub states: Vec<State>,
    /// `N` controls.
    pub controls: Vec<Control>,
    pub stage_cost: f64,
    pub terminal_cost: f64,
    /// `stage_cost + terminal_cost`.
    pub total_cost: f64,
    pub iterations: u32,
    pub solve_time_us: u64,
    /// Constraint violation (infinity norm) reported by the solver.
    pub constraint_violation: f64,
}

impl OcpSolution {
    /// First control of the optimal sequence.
    pub fn first_control(&self) -> Control {
        self.controls[0]
    }

    /// Solver-predicted state after applying [`first_control`](Self::first_control).
    pub fn predicted_next_state(&self) -> State {
        self.states[1]
    }

    pub fn terminal_state(&self) -> State {
        self.states[self.states.len() - 1]
    }

    /// Horizon N.
    pub fn horizon(&self) -> usize {
        self.controls.len()
    }

    /// Reuse these trajectories as an initial guess.
    pub fn to_guess(&self) -> InitialGuess {
        InitialGuess {
            states: self.states.clone(),
            controls: self.controls.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// OcpSolver
// ---------------------------------------------------------------------------

/// Solves [`OcpProblem`]s with any [`NlpSolver`].
///
/// Holds no state between solves; the only carry-over is an explicit
/// [`InitialGuess`] passed by the caller.
#[derive(Debug, Clone, Default)]
pub struct OcpSolver<S: NlpSolver = SqpSolver> {
    solver: S,
}

impl OcpSolver<SqpSolver> {
    /// Convenience constructor for the default SQP backend.
    pub const fn sqp(config: SolverConfig) -> Self {
        Self {
            solver: SqpSolver::new(config),
        }
    }
}

impl<S: NlpSolver> OcpSolver<S> {
    pub const fn new(solver: S) -> Self {
        Self { solver }
    }

    pub const fn backend(&self) -> &S {
        &self.solver
    }

    /// Solve `problem`, cold-starting from zeros when `guess` is `None`.
    pub fn solve(
        &self,
        problem: &OcpProblem,
        guess: Option<&InitialGuess>,
    ) -> Result<OcpSolution, OcpError> {
        let z0 = match guess {
            Some(g) => problem.pack(g)?,
            None => problem.pack(&problem.zero_guess())?,
        };

        let nlp = self.solver.solve(problem, Some(&z0))?;
        let (mut states, controls) = problem.split(&nlp.z)?;

        // x_0 = x0 is a linear identity row; pin it exactly.
        states[0] = *problem.initial_state();

        let stage_cost = problem.stage_cost(&states, &controls);
        let terminal_cost = problem.terminal_cost(&states[problem.horizon()]);

        Ok(OcpSolution {
            states,
            controls,
            stage_cost,
            terminal_cost,
            total_cost: stage_cost + terminal_cost,
            iterations: nlp.iterations,
            solve_time_us: nlp.solve_time_us,
            constraint_violation: nlp.constraint_violation,
        })
    }
}
