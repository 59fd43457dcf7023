//! Optimal control problem transcription and nonlinear programming.
//!
//! This crate turns a pendulum model, stage weights and an optional
//! terminal term into a finite-horizon nonlinear program and solves it:
//!
//! 1. **Transcription**: [`OcpTranscriber`] builds an [`OcpProblem`] with
//!    decision vector `z = [x_0, …, x_N, u_0, …, u_{N-1}]`, the initial-state
//!    and dynamics equalities, and box bounds on the controls.
//! 2. **NLP boundary**: [`NlpProblem`] / [`NlpSolver`] describe a generic
//!    equality/inequality constrained program and a stateless solver.
//! 3. **SQP**: [`SqpSolver`] linearises the constraints around the current
//!    iterate and solves each QP subproblem with Clarabel (pure Rust
//!    interior point), globalised by an ℓ1 merit line search.
//! 4. **Glue**: [`OcpSolver`] maps a primal vector back onto state and
//!    control trajectories and splits the cost into stage and terminal parts.
//!
//! # QP subproblem
//!
//! ```text
//! min_d   ½ dᵀ H d + ∇f(z)ᵀ d
//! s.t.    c(z) + J_c(z) d  = 0      (zero cone)
//!         g(z) + J_g(z) d <= 0      (non-negative cone)
//!         lb <= z + d <= ub         (non-negative cone)
//! ```
//!
//! `H` is a positive semi-definite approximation of the Lagrangian Hessian
//! supplied by the problem.

pub mod nlp;
pub mod solver;
pub mod sqp;
pub mod transcription;

pub use nlp::{NlpProblem, NlpSolution, NlpSolver, SolveError};
pub use solver::{OcpError, OcpSolution, OcpSolver};
pub use sqp::SqpSolver;
pub use transcription::{InitialGuess, OcpProblem, OcpTranscriber, TerminalCost};
