use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{CONTROL_DIM, CostWeights, STATE_DIM};

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_link_length() -> f64 {
    1.0
}
const fn default_link_mass() -> f64 {
    1.0
}
const fn default_gravity() -> f64 {
    9.81
}
const fn default_dt() -> f64 {
    0.05
}
const fn default_singularity_tol() -> f64 {
    1e-9
}
const fn default_horizon() -> usize {
    10
}
const fn default_q_diag() -> [f64; STATE_DIM] {
    [10.0, 10.0, 10.0, 10.0]
}
const fn default_r_diag() -> [f64; CONTROL_DIM] {
    [1.0, 1.0]
}
const fn default_control_bound() -> f64 {
    1.99
}
const fn default_max_iterations() -> u32 {
    200
}
const fn default_step_tolerance() -> f64 {
    1e-6
}
const fn default_feasibility_tolerance() -> f64 {
    1e-7
}
const fn default_qp_max_iterations() -> u32 {
    200
}
const fn default_max_backtracks() -> u32 {
    40
}
const fn default_hessian_regularization() -> f64 {
    1e-9
}
const fn default_num_samples() -> usize {
    200
}
const fn default_state_bound() -> f64 {
    1.5
}
const fn default_mpc_steps() -> usize {
    20
}
const fn default_ridge() -> f64 {
    1e-6
}
const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// PendulumParams
// ---------------------------------------------------------------------------

/// Physical parameters of the two-link pendulum and its integrator step.
///
/// Point masses `m1`, `m2` sit at the ends of massless links of length
/// `l1`, `l2`. `m1` may be zero (that configuration has a genuine
/// mass-matrix singularity at `q1 == q2`), `m2` must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendulumParams {
    #[serde(default = "default_link_length")]
    pub l1: f64,

    #[serde(default = "default_link_length")]
    pub l2: f64,

    #[serde(default = "default_link_mass")]
    pub m1: f64,

    #[serde(default = "default_link_mass")]
    pub m2: f64,

    /// Gravitational acceleration magnitude (m/s^2).
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// Explicit Euler step in seconds.
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Relative threshold on the mass-matrix determinant below which a
    /// step is reported as singular.
    #[serde(default = "default_singularity_tol")]
    pub singularity_tol: f64,
}

impl Default for PendulumParams {
    fn default() -> Self {
        Self {
            l1: default_link_length(),
            l2: default_link_length(),
            m1: default_link_mass(),
            m2: default_link_mass(),
            gravity: default_gravity(),
            dt: default_dt(),
            singularity_tol: default_singularity_tol(),
        }
    }
}

impl PendulumParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("dynamics.l1", self.l1)?;
        positive("dynamics.l2", self.l2)?;
        positive("dynamics.m2", self.m2)?;
        positive("dynamics.dt", self.dt)?;
        positive("dynamics.singularity_tol", self.singularity_tol)?;
        non_negative("dynamics.m1", self.m1)?;
        non_negative("dynamics.gravity", self.gravity)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProblemConfig
// ---------------------------------------------------------------------------

/// Finite-horizon problem shape shared by sampling and control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemConfig {
    /// Number of control intervals N.
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    #[serde(default = "default_q_diag")]
    pub q_diag: [f64; STATE_DIM],

    #[serde(default = "default_r_diag")]
    pub r_diag: [f64; CONTROL_DIM],

    /// Symmetric torque bound: every control component lies in `[-b, b]`.
    #[serde(default = "default_control_bound")]
    pub control_bound: f64,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            q_diag: default_q_diag(),
            r_diag: default_r_diag(),
            control_bound: default_control_bound(),
        }
    }
}

impl ProblemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon == 0 {
            return Err(ConfigError::invalid("problem.horizon", "must be >= 1"));
        }
        positive("problem.control_bound", self.control_bound)?;
        self.weights().map(|_| ())
    }

    pub fn weights(&self) -> Result<CostWeights, ConfigError> {
        CostWeights::new(self.q_diag, self.r_diag)
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Settings for the SQP solver and its QP subproblems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum SQP iterations per solve.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Converged when the infinity norm of the QP step is below
    /// `step_tolerance * (1 + |z|_inf)`.
    #[serde(default = "default_step_tolerance")]
    pub step_tolerance: f64,

    /// Maximum tolerated constraint violation (infinity norm) at exit.
    #[serde(default = "default_feasibility_tolerance")]
    pub feasibility_tolerance: f64,

    /// Wall-clock budget per solve in seconds. `None` means unbounded.
    #[serde(default)]
    pub time_limit_secs: Option<f64>,

    /// Iteration cap handed to Clarabel for each QP subproblem.
    #[serde(default = "default_qp_max_iterations")]
    pub qp_max_iterations: u32,

    /// Step halvings tried by the line search before giving up.
    #[serde(default = "default_max_backtracks")]
    pub max_backtracks: u32,

    /// Diagonal shift added to the QP Hessian.
    #[serde(default = "default_hessian_regularization")]
    pub hessian_regularization: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            step_tolerance: default_step_tolerance(),
            feasibility_tolerance: default_feasibility_tolerance(),
            time_limit_secs: None,
            qp_max_iterations: default_qp_max_iterations(),
            max_backtracks: default_max_backtracks(),
            hessian_regularization: default_hessian_regularization(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("solver.max_iterations", "must be >= 1"));
        }
        if self.qp_max_iterations == 0 {
            return Err(ConfigError::invalid("solver.qp_max_iterations", "must be >= 1"));
        }
        positive("solver.step_tolerance", self.step_tolerance)?;
        positive("solver.feasibility_tolerance", self.feasibility_tolerance)?;
        non_negative("solver.hessian_regularization", self.hessian_regularization)?;
        if let Some(limit) = self.time_limit_secs {
            positive("solver.time_limit_secs", limit)?;
        }
        Ok(())
    }

    /// Builder: set the per-solve wall-clock limit.
    #[must_use]
    pub const fn with_time_limit(mut self, secs: f64) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    /// Builder: set the SQP iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

// ---------------------------------------------------------------------------
// SamplerConfig
// ---------------------------------------------------------------------------

/// Training-data generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Initial states are drawn uniformly from `[-state_bound, state_bound]^4`.
    #[serde(default = "default_state_bound")]
    pub state_bound: f64,

    #[serde(default)]
    pub seed: u64,

    /// Solve the draws on the rayon thread pool.
    #[serde(default)]
    pub parallel: bool,

    /// Seed each solve with the solution of the nearest already-solved draw.
    #[serde(default)]
    pub warm_start: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            state_bound: default_state_bound(),
            seed: 0,
            parallel: false,
            warm_start: false,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("sampler.state_bound", self.state_bound)?;
        if self.parallel && self.warm_start {
            return Err(ConfigError::Incompatible(
                "sampler.warm_start needs sequential sampling (sampler.parallel = false)".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MPC policies
// ---------------------------------------------------------------------------

/// How the controller advances its state after applying the first control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateUpdate {
    /// Trust the solver's own one-step prediction.
    #[default]
    Nominal,
    /// Re-step the plant model independently of the solver.
    Simulated,
}

/// Initial guess policy for consecutive MPC solves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmStart {
    /// Zero guess every iteration.
    #[default]
    Cold,
    /// Previous solution shifted by one interval.
    Shifted,
}

/// Terminal-state estimate used by the first MPC iteration, before any
/// solved trajectory exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalSeed {
    /// Evaluate the model at the initial state.
    #[default]
    InitialState,
    /// Use a zero terminal cost for the first iteration.
    ZeroCost,
}

/// How the learned terminal cost enters each MPC problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalCoupling {
    /// Constant: model evaluated at the previous solve's terminal state.
    #[default]
    Frozen,
    /// Function of the current decision variable x_N.
    Live,
}

/// Receding-horizon loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcConfig {
    /// Number of closed-loop iterations (applied controls).
    #[serde(default = "default_mpc_steps")]
    pub steps: usize,

    #[serde(default)]
    pub state_update: StateUpdate,

    #[serde(default)]
    pub warm_start: WarmStart,

    #[serde(default)]
    pub terminal_seed: TerminalSeed,

    #[serde(default)]
    pub terminal_coupling: TerminalCoupling,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            steps: default_mpc_steps(),
            state_update: StateUpdate::default(),
            warm_start: WarmStart::default(),
            terminal_seed: TerminalSeed::default(),
            terminal_coupling: TerminalCoupling::default(),
        }
    }
}

impl MpcConfig {
    /// Builder: set the state-update policy.
    #[must_use]
    pub const fn with_state_update(mut self, state_update: StateUpdate) -> Self {
        self.state_update = state_update;
        self
    }

    /// Builder: set the warm-start policy.
    #[must_use]
    pub const fn with_warm_start(mut self, warm_start: WarmStart) -> Self {
        self.warm_start = warm_start;
        self
    }

    /// Builder: set the first-iteration terminal seed.
    #[must_use]
    pub const fn with_terminal_seed(mut self, seed: TerminalSeed) -> Self {
        self.terminal_seed = seed;
        self
    }

    /// Builder: set the terminal coupling.
    #[must_use]
    pub const fn with_terminal_coupling(mut self, coupling: TerminalCoupling) -> Self {
        self.terminal_coupling = coupling;
        self
    }
}

// ---------------------------------------------------------------------------
// SurrogateConfig
// ---------------------------------------------------------------------------

/// Settings for the built-in quadratic regression surrogate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateConfig {
    /// Ridge penalty on the regression weights.
    #[serde(default = "default_ridge")]
    pub ridge: f64,

    /// Clamp predictions at zero (costs-to-go are non-negative).
    #[serde(default = "default_true")]
    pub clamp_nonnegative: bool,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            ridge: default_ridge(),
            clamp_nonnegative: true,
        }
    }
}

impl SurrogateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("surrogate.ridge", self.ridge)
    }
}

// ---------------------------------------------------------------------------
// LcmpcConfig
// ---------------------------------------------------------------------------

/// Complete pipeline configuration. Every section is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LcmpcConfig {
    #[serde(default)]
    pub dynamics: PendulumParams,

    #[serde(default)]
    pub problem: ProblemConfig,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub mpc: MpcConfig,

    #[serde(default)]
    pub surrogate: SurrogateConfig,
}

impl LcmpcConfig {
    /// Validate every section. Returns the first error found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dynamics.validate()?;
        self.problem.validate()?;
        self.solver.validate()?;
        self.sampler.validate()?;
        self.surrogate.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} (must be > 0)")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} (must be >= 0)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        LcmpcConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_match_reference_problem() {
        let config = LcmpcConfig::default();
        assert_eq!(config.problem.horizon, 10);
        assert!((config.problem.control_bound - 1.99).abs() < f64::EPSILON);
        assert!((config.sampler.state_bound - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.mpc.state_update, StateUpdate::Nominal);
        assert_eq!(config.mpc.warm_start, WarmStart::Cold);
        assert_eq!(config.mpc.terminal_coupling, TerminalCoupling::Frozen);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = LcmpcConfig::from_toml_str("").unwrap();
        assert_eq!(config, LcmpcConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = LcmpcConfig::from_toml_str(
            r#"
            [dynamics]
            dt = 0.02
            m1 = 2.0

            [problem]
            horizon = 15
            r_diag = [0.5, 0.5]

            [mpc]
            state_update = "simulated"
            warm_start = "shifted"
            terminal_seed = "zero_cost"
            "#,
        )
        .unwrap();
        assert!((config.dynamics.dt - 0.02).abs() < f64::EPSILON);
        assert!((config.dynamics.m1 - 2.0).abs() < f64::EPSILON);
        assert!((config.dynamics.l1 - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.problem.horizon, 15);
        assert_eq!(config.problem.r_diag, [0.5, 0.5]);
        assert_eq!(config.mpc.state_update, StateUpdate::Simulated);
        assert_eq!(config.mpc.warm_start, WarmStart::Shifted);
        assert_eq!(config.mpc.terminal_seed, TerminalSeed::ZeroCost);
    }

    #[test]
    fn zero_horizon_rejected() {
        let err = LcmpcConfig::from_toml_str("[problem]\nhorizon = 0\n").unwrap_err();
        assert!(err.to_string().contains("problem.horizon"));
    }

    #[test]
    fn negative_dt_rejected() {
        let params = PendulumParams {
            dt: -0.1,
            ..PendulumParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn massless_first_link_allowed() {
        let params = PendulumParams {
            m1: 0.0,
            ..PendulumParams::default()
        };
        params.validate().unwrap();
    }

    #[test]
    fn parallel_warm_start_incompatible() {
        let sampler = SamplerConfig {
            parallel: true,
            warm_start: true,
            ..SamplerConfig::default()
        };
        assert!(matches!(sampler.validate(), Err(ConfigError::Incompatible(_))));
    }

    #[test]
    fn negative_weight_in_file_rejected() {
        let err = LcmpcConfig::from_toml_str("[problem]\nq_diag = [1.0, 1.0, -1.0, 1.0]\n")
            .unwrap_err();
        assert!(err.to_string().contains("q_diag"));
    }

    #[test]
    fn from_file_roundtrip() {
        let mut config = LcmpcConfig::default();
        config.sampler.num_samples = 7;
        config.solver = config.solver.with_time_limit(0.5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lcmpc.toml");
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = LcmpcConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LcmpcConfig::from_file("/nonexistent/lcmpc.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
