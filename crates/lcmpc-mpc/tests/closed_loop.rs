//! Integration test: receding-horizon loop against the bare OCP.
//!
//! Checks that:
//! 1. A zero terminal model reproduces repeated bare OCP solves exactly
//! 2. Run bookkeeping (lengths, cost sum) holds over a full run
//! 3. A solver failure mid-run returns the iterations completed so far

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lcmpc_core::config::{MpcConfig, SolverConfig};
use lcmpc_core::error::SolverFailure;
use lcmpc_core::types::State;
use lcmpc_dynamics::DoublePendulum;
use lcmpc_mpc::{MpcController, MpcPhase};
use lcmpc_ocp::{
    NlpProblem, NlpSolution, NlpSolver, OcpError, OcpSolver, OcpTranscriber, SolveError,
    SqpSolver, TerminalCost,
};
use lcmpc_surrogate::{ConstantCostModel, TerminalCostModel};
use lcmpc_test_utils::{default_pendulum_params, reference_weights, test_solver_config};
use nalgebra::DVector;

const HORIZON: usize = 10;

fn transcriber() -> OcpTranscriber {
    let model = DoublePendulum::new(default_pendulum_params()).unwrap();
    OcpTranscriber::new(Arc::new(model), 1.99).unwrap()
}

fn zero_model() -> Arc<dyn TerminalCostModel> {
    Arc::new(ConstantCostModel::zero())
}

#[test]
fn zero_terminal_model_matches_bare_resolves() {
    let steps = 20;
    let x0 = State::new(0.6, -0.4, 0.2, 0.1);
    let weights = reference_weights();

    let controller = MpcController::new(
        transcriber(),
        OcpSolver::sqp(test_solver_config()),
        MpcConfig::default(),
    );
    let run = controller
        .run(x0, HORIZON, &weights, steps, zero_model())
        .unwrap();

    let bare = transcriber();
    let solver = OcpSolver::sqp(test_solver_config());
    let mut x = x0;
    let mut expected_states = vec![x0];
    let mut expected_controls = Vec::new();
    for _ in 0..steps {
        let problem = bare.build(x, HORIZON, &weights, TerminalCost::None).unwrap();
        let solution = solver.solve(&problem, None).unwrap();
        expected_controls.push(solution.first_control());
        x = solution.states[1];
        expected_states.push(x);
    }

    assert_eq!(run.controls, expected_controls);
    assert_eq!(run.states, expected_states);
    assert!(run.terminal_costs.iter().all(|&c| c == 0.0));
}

#[test]
fn run_bookkeeping() {
    let steps = 8;
    let controller = MpcController::new(
        transcriber(),
        OcpSolver::sqp(test_solver_config()),
        MpcConfig::default(),
    );
    let run = controller
        .run(
            State::new(-0.5, 0.3, 0.0, 0.2),
            HORIZON,
            &reference_weights(),
            steps,
            Arc::new(ConstantCostModel::new(2.5)),
        )
        .unwrap();

    assert_eq!(run.states.len(), steps + 1);
    assert_eq!(run.controls.len(), steps);
    assert_eq!(run.solved_costs.len(), steps);
    assert_eq!(run.stats.len(), steps);
    let sum: f64 = run.solved_costs.iter().sum();
    assert!((run.total_cost - sum).abs() <= 1e-9 * sum.abs().max(1.0));
    for u in &run.controls {
        assert!(u.iter().all(|c| c.abs() <= 1.99 + 1e-6));
    }
    // Frozen constant model: every solved problem carries the same 2.5.
    assert!(run.terminal_costs.iter().all(|&c| c == 2.5));
}

/// SQP backend that fails once a fixed number of solves has succeeded.
struct FlakySolver {
    inner: SqpSolver,
    calls: AtomicUsize,
    fail_on: usize,
}

impl NlpSolver for FlakySolver {
    fn solve(
        &self,
        problem: &dyn NlpProblem,
        guess: Option<&DVector<f64>>,
    ) -> Result<NlpSolution, SolveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_on {
            return Err(SolverFailure::Infeasible.into());
        }
        self.inner.solve(problem, guess)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "FlakySolver"
    }
}

#[test]
fn failure_returns_partial_run() {
    let backend = FlakySolver {
        inner: SqpSolver::new(test_solver_config()),
        calls: AtomicUsize::new(0),
        fail_on: 2,
    };
    let controller =
        MpcController::new(transcriber(), OcpSolver::new(backend), MpcConfig::default());
    let x0 = State::new(0.4, 0.0, -0.2, 0.0);

    let failure = controller
        .run(x0, HORIZON, &reference_weights(), 10, zero_model())
        .unwrap_err();

    assert_eq!(failure.iteration, 2);
    assert_eq!(failure.source, OcpError::Solver(SolverFailure::Infeasible));
    assert_eq!(failure.partial.steps(), 2);
    assert_eq!(failure.partial.states.len(), 3);
    assert_eq!(failure.partial.states[0], x0);
}

#[test]
fn session_reports_failed_phase() {
    let config = SolverConfig::default().with_max_iterations(1);
    let controller =
        MpcController::new(transcriber(), OcpSolver::sqp(config), MpcConfig::default());
    let mut session = controller.session(
        State::new(1.2, -1.0, 0.8, 0.5),
        HORIZON,
        &reference_weights(),
        3,
        zero_model(),
    );

    assert_eq!(session.advance(), MpcPhase::Solve);
    assert_eq!(session.advance(), MpcPhase::Failed);
    assert!(matches!(
        session.failure(),
        Some(OcpError::Solver(SolverFailure::MaxIterationsExceeded { .. }))
    ));
    assert_eq!(session.advance(), MpcPhase::Failed);
    assert_eq!(session.run().steps(), 0);
}
