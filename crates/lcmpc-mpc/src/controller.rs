//! Receding-horizon control with a learned terminal cost.
//!
//! ```text
//! Init ──► Solve ──► Apply ──┐
//!            ▲               │  (fewer than `steps` controls applied)
//!            └───────────────┘
//!          Solve ──error──► Failed          Apply ──last step──► Done
//! ```
//!
//! Every `Solve` builds a fresh OCP from the current state. With
//! [`TerminalCoupling::Frozen`] the terminal term is the model's prediction
//! at the terminal state of the *previous* solve, held as a constant; the
//! first iteration uses the configured [`TerminalSeed`].

use std::sync::Arc;

use lcmpc_core::config::{MpcConfig, StateUpdate, TerminalCoupling, TerminalSeed, WarmStart};
use lcmpc_core::types::{Control, CostWeights, State};
use lcmpc_dynamics::Dynamics;
use lcmpc_ocp::{
    InitialGuess, NlpSolver, OcpError, OcpSolution, OcpSolver, OcpTranscriber, SqpSolver,
    TerminalCost,
};
use lcmpc_surrogate::TerminalCostModel;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// MpcRun
// ---------------------------------------------------------------------------

/// Solver statistics of one MPC iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveStats {
    pub iterations: u32,
    pub solve_time_us: u64,
    pub constraint_violation: f64,
}

/// Closed-loop trajectory, grown one iteration at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcRun {
    /// Visited states, starting with the initial state (`steps + 1`).
    pub states: Vec<State>,
    /// Applied controls (`steps`).
    pub controls: Vec<Control>,
    /// Total cost (stage + terminal) of each iteration's solved problem.
    pub solved_costs: Vec<f64>,
    /// Terminal part of each entry in `solved_costs`.
    pub terminal_costs: Vec<f64>,
    /// Sum of `solved_costs`.
    pub total_cost: f64,
    pub stats: Vec<SolveStats>,
}

impl MpcRun {
    /// Empty run at `x0`.
    pub fn new(x0: State) -> Self {
        Self {
            states: vec![x0],
            controls: Vec::new(),
            solved_costs: Vec::new(),
            terminal_costs: Vec::new(),
            total_cost: 0.0,
            stats: Vec::new(),
        }
    }

    /// Number of completed iterations.
    pub fn steps(&self) -> usize {
        self.controls.len()
    }

    pub fn current_state(&self) -> State {
        self.states[self.states.len() - 1]
    }

    /// Sample times `k * dt` of every entry in `states`.
    #[allow(clippy::cast_precision_loss)]
    pub fn time_grid(&self, dt: f64) -> Vec<f64> {
        (0..self.states.len()).map(|k| k as f64 * dt).collect()
    }

    fn record(&mut self, next: State, control: Control, solution: &OcpSolution) {
        self.states.push(next);
        self.controls.push(control);
        self.solved_costs.push(solution.total_cost);
        self.terminal_costs.push(solution.terminal_cost);
        self.total_cost += solution.total_cost;
        self.stats.push(SolveStats {
            iterations: solution.iterations,
            solve_time_us: solution.solve_time_us,
            constraint_violation: solution.constraint_violation,
        });
    }

    /// Reporting view with the time grid attached.
    pub fn summary(&self, dt: f64) -> RunSummary {
        RunSummary {
            time: self.time_grid(dt),
            states: self.states.iter().map(|x| [x[0], x[1], x[2], x[3]]).collect(),
            controls: self.controls.iter().map(|u| [u[0], u[1]]).collect(),
            solved_costs: self.solved_costs.clone(),
            total_cost: self.total_cost,
            total_sqp_iterations: self.stats.iter().map(|s| u64::from(s.iterations)).sum(),
            total_solve_time_us: self.stats.iter().map(|s| s.solve_time_us).sum(),
        }
    }
}

/// Flat, plot-friendly summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub time: Vec<f64>,
    pub states: Vec<[f64; 4]>,
    pub controls: Vec<[f64; 2]>,
    pub solved_costs: Vec<f64>,
    pub total_cost: f64,
    pub total_sqp_iterations: u64,
    pub total_solve_time_us: u64,
}

/// A control run that stopped early.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("MPC stopped at iteration {iteration}: {source}")]
pub struct MpcFailure {
    /// Zero-based index of the iteration that failed.
    pub iteration: usize,
    /// Everything accumulated before the failure.
    pub partial: MpcRun,
    pub source: OcpError,
}

// ---------------------------------------------------------------------------
// MpcPhase / MpcSession
// ---------------------------------------------------------------------------

/// Lifecycle of one control run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpcPhase {
    Init,
    Solve,
    Apply,
    Done,
    Failed,
}

impl MpcPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// A control run driven one transition at a time.
pub struct MpcSession<'a, S: NlpSolver = SqpSolver> {
    controller: &'a MpcController<S>,
    model: Arc<dyn TerminalCostModel>,
    weights: CostWeights,
    horizon: usize,
    steps: usize,
    phase: MpcPhase,
    run: MpcRun,
    /// Terminal state of the last solved problem, as a value.
    terminal_estimate: Option<State>,
    pending: Option<OcpSolution>,
    next_guess: Option<InitialGuess>,
    failure: Option<OcpError>,
}

impl<S: NlpSolver> MpcSession<'_, S> {
    pub const fn phase(&self) -> MpcPhase {
        self.phase
    }

    pub const fn run(&self) -> &MpcRun {
        &self.run
    }

    /// Error that moved the session to [`MpcPhase::Failed`].
    pub const fn failure(&self) -> Option<&OcpError> {
        self.failure.as_ref()
    }

    /// Perform one transition and return the new phase. Terminal phases
    /// are absorbing.
    pub fn advance(&mut self) -> MpcPhase {
        self.phase = match self.phase {
            MpcPhase::Init => {
                if self.steps == 0 {
                    MpcPhase::Done
                } else {
                    MpcPhase::Solve
                }
            }
            MpcPhase::Solve => self.solve(),
            MpcPhase::Apply => self.apply(),
            phase @ (MpcPhase::Done | MpcPhase::Failed) => phase,
        };
        self.phase
    }

    /// Drive the session to a terminal phase.
    pub fn finish(mut self) -> Result<MpcRun, MpcFailure> {
        while !self.phase.is_terminal() {
            self.advance();
        }
        match self.failure {
            None => Ok(self.run),
            Some(source) => Err(MpcFailure {
                iteration: self.run.steps(),
                partial: self.run,
                source,
            }),
        }
    }

    fn fail(&mut self, err: OcpError) -> MpcPhase {
        warn!(iteration = self.run.steps(), error = %err, "MPC iteration failed");
        self.failure = Some(err);
        MpcPhase::Failed
    }

    fn terminal_cost(&self, x: &State) -> TerminalCost {
        match self.controller.config.terminal_coupling {
            TerminalCoupling::Frozen => {
                let value = match (self.terminal_estimate, self.controller.config.terminal_seed) {
                    (Some(estimate), _) => self.model.predict(&estimate),
                    (None, TerminalSeed::InitialState) => self.model.predict(x),
                    (None, TerminalSeed::ZeroCost) => 0.0,
                };
                TerminalCost::Constant(value)
            }
            TerminalCoupling::Live => {
                let model = Arc::clone(&self.model);
                TerminalCost::function(move |x| model.predict(x))
            }
        }
    }

    fn solve(&mut self) -> MpcPhase {
        let x = self.run.current_state();
        let terminal = self.terminal_cost(&x);
        debug!(iteration = self.run.steps(), ?terminal, "building MPC problem");

        let result = self
            .controller
            .transcriber
            .build(x, self.horizon, &self.weights, terminal)
            .and_then(|problem| {
                self.controller
                    .solver
                    .solve(&problem, self.next_guess.as_ref())
            });

        match result {
            Ok(solution) => {
                self.pending = Some(solution);
                MpcPhase::Apply
            }
            Err(err) => self.fail(err),
        }
    }

    fn apply(&mut self) -> MpcPhase {
        let Some(solution) = self.pending.take() else {
            return self.fail(OcpError::InvalidProblem(
                "apply reached without a solved problem".into(),
            ));
        };
        let x = self.run.current_state();
        let u = solution.first_control();

        let next = match self.controller.config.state_update {
            StateUpdate::Nominal => solution.predicted_next_state(),
            StateUpdate::Simulated => match self.controller.plant().step(&x, &u) {
                Ok(next) => next,
                Err(err) => return self.fail(err.into()),
            },
        };

        self.next_guess = match self.controller.config.warm_start {
            WarmStart::Cold => None,
            WarmStart::Shifted => {
                match solution
                    .to_guess()
                    .shifted(self.controller.transcriber.dynamics().as_ref())
                {
                    Ok(guess) => Some(guess.with_initial_state(next)),
                    Err(err) => return self.fail(err.into()),
                }
            }
        };

        self.terminal_estimate = Some(solution.terminal_state());
        self.run.record(next, u, &solution);
        info!(
            iteration = self.run.steps(),
            cost = solution.total_cost,
            terminal = solution.terminal_cost,
            sqp_iterations = solution.iterations,
            "MPC step applied"
        );

        if self.run.steps() >= self.steps {
            MpcPhase::Done
        } else {
            MpcPhase::Solve
        }
    }
}

// ---------------------------------------------------------------------------
// MpcController
// ---------------------------------------------------------------------------

/// Receding-horizon controller.
///
/// Stateless between runs; everything a run carries lives in its
/// [`MpcSession`].
#[derive(Clone)]
pub struct MpcController<S: NlpSolver = SqpSolver> {
    transcriber: OcpTranscriber,
    solver: OcpSolver<S>,
    plant: Option<Arc<dyn Dynamics>>,
    config: MpcConfig,
}

impl<S: NlpSolver> MpcController<S> {
    pub const fn new(transcriber: OcpTranscriber, solver: OcpSolver<S>, config: MpcConfig) -> Self {
        Self {
            transcriber,
            solver,
            plant: None,
            config,
        }
    }

    /// Builder: plant stepped under [`StateUpdate::Simulated`]. Defaults
    /// to the prediction model.
    #[must_use]
    pub fn with_plant(mut self, plant: Arc<dyn Dynamics>) -> Self {
        self.plant = Some(plant);
        self
    }

    pub const fn config(&self) -> &MpcConfig {
        &self.config
    }

    fn plant(&self) -> &dyn Dynamics {
        self.plant
            .as_deref()
            .unwrap_or_else(|| self.transcriber.dynamics().as_ref())
    }

    /// Start a run at `x0` without executing any transition.
    pub fn session(
        &self,
        x0: State,
        horizon: usize,
        weights: &CostWeights,
        steps: usize,
        model: Arc<dyn TerminalCostModel>,
    ) -> MpcSession<'_, S> {
        MpcSession {
            controller: self,
            model,
            weights: *weights,
            horizon,
            steps,
            phase: MpcPhase::Init,
            run: MpcRun::new(x0),
            terminal_estimate: None,
            pending: None,
            next_guess: None,
            failure: None,
        }
    }

    /// Run exactly `steps` iterations from `x0`.
    pub fn run(
        &self,
        x0: State,
        horizon: usize,
        weights: &CostWeights,
        steps: usize,
        model: Arc<dyn TerminalCostModel>,
    ) -> Result<MpcRun, MpcFailure> {
        info!(steps, horizon, model = model.name(), "starting MPC run");
        self.session(x0, horizon, weights, steps, model).finish()
    }
}

impl<S: NlpSolver> std::fmt::Debug for MpcController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpcController")
            .field("transcriber", &self.transcriber)
            .field("solver", &self.solver.backend().name())
            .field("plant", &self.plant.as_ref().map(|p| p.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}
