//! Reference configurations used across the test suites.

use lcmpc_core::config::{PendulumParams, SolverConfig};
use lcmpc_core::types::CostWeights;

/// Unit links and masses, `g = 9.81`, `dt = 0.05`.
pub fn default_pendulum_params() -> PendulumParams {
    PendulumParams::default()
}

/// `Q = diag(10, 10, 10, 10)`, `R = diag(1, 1)`.
pub fn reference_weights() -> CostWeights {
    CostWeights::new([10.0; 4], [1.0; 2]).unwrap_or_else(|e| panic!("reference weights: {e}"))
}

/// Solver settings with a generous iteration cap for test problems.
pub fn test_solver_config() -> SolverConfig {
    SolverConfig::default().with_max_iterations(400)
}
