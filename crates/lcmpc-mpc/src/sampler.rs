//! Training-data generation for the terminal cost surrogate.
//!
//! Each draw samples an initial state uniformly from `[-b, b]^4`, solves the
//! bare OCP (no terminal term) and records a tagged [`SampleOutcome`]. Solver
//! failures never abort generation; they are counted and logged so that
//! mass failure stays visible in the [`GenerationReport`]. A dynamics
//! singularity or a malformed problem is fatal and stops generation.

use lcmpc_core::config::SamplerConfig;
use lcmpc_core::error::{ConfigError, SolverFailure};
use lcmpc_core::types::{CostWeights, State};
use lcmpc_ocp::{
    InitialGuess, NlpSolver, OcpError, OcpSolver, OcpTranscriber, SqpSolver, TerminalCost,
};
use lcmpc_surrogate::SampleSet;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// SampleOutcome / GenerationReport
// ---------------------------------------------------------------------------

/// Result of one draw.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Succeeded { x0: State, cost: f64 },
    Skipped { x0: State, reason: OcpError },
}

impl SampleOutcome {
    pub const fn initial_state(&self) -> &State {
        match self {
            Self::Succeeded { x0, .. } | Self::Skipped { x0, .. } => x0,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Per-draw outcomes of one generation run, in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    outcomes: Vec<SampleOutcome>,
}

impl GenerationReport {
    pub const fn new(outcomes: Vec<SampleOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn skipped(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn outcomes(&self) -> &[SampleOutcome] {
        &self.outcomes
    }

    /// Reasons of every skipped draw, in draw order.
    pub fn skip_reasons(&self) -> impl Iterator<Item = &OcpError> {
        self.outcomes.iter().filter_map(|o| match o {
            SampleOutcome::Skipped { reason, .. } => Some(reason),
            SampleOutcome::Succeeded { .. } => None,
        })
    }

    /// Successful `(x0, cost)` pairs as a sample set.
    pub fn sample_set(&self) -> SampleSet {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                SampleOutcome::Succeeded { x0, cost } => Some((*x0, *cost)),
                SampleOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn into_sample_set(self) -> SampleSet {
        self.sample_set()
    }
}

// ---------------------------------------------------------------------------
// SampleGenerator
// ---------------------------------------------------------------------------

/// Draws initial states and solves the bare OCP for each.
#[derive(Debug, Clone)]
pub struct SampleGenerator<S: NlpSolver = SqpSolver> {
    transcriber: OcpTranscriber,
    solver: OcpSolver<S>,
    config: SamplerConfig,
}

impl<S: NlpSolver> SampleGenerator<S> {
    pub fn new(
        transcriber: OcpTranscriber,
        solver: OcpSolver<S>,
        config: SamplerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transcriber,
            solver,
            config,
        })
    }

    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// The first `count` initial states of this generator's seeded stream.
    ///
    /// Drawn sequentially so the set of problems does not depend on whether
    /// they are later solved in parallel.
    pub fn draw_initial_states(&self, count: usize) -> Vec<State> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let bound = self.config.state_bound;
        let dist = Uniform::new_inclusive(-bound, bound);
        (0..count)
            .map(|_| State::from_fn(|_, _| dist.sample(&mut rng)))
            .collect()
    }

    /// Run `num_samples` draws with horizon `horizon` and weights `weights`.
    ///
    /// Returns the first fatal error (anything other than a solver failure)
    /// instead of a report.
    pub fn generate(
        &self,
        num_samples: usize,
        horizon: usize,
        weights: &CostWeights,
    ) -> Result<GenerationReport, OcpError> {
        let initial_states = self.draw_initial_states(num_samples);

        let outcomes: Vec<SampleOutcome> = if self.config.parallel {
            initial_states
                .par_iter()
                .map(|x0| Ok(self.solve_one(*x0, horizon, weights, None)?.0))
                .collect::<Result<_, OcpError>>()?
        } else if self.config.warm_start {
            self.generate_warm(&initial_states, horizon, weights)?
        } else {
            initial_states
                .iter()
                .map(|x0| Ok(self.solve_one(*x0, horizon, weights, None)?.0))
                .collect::<Result<_, OcpError>>()?
        };

        let report = GenerationReport::new(outcomes);
        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            "sample generation finished"
        );
        if report.attempted() > 0 && report.succeeded() == 0 {
            warn!(attempted = report.attempted(), "every sample was skipped");
        }
        Ok(report)
    }

    /// Sequential draws, each seeded from the solution of the nearest
    /// already-solved initial state.
    fn generate_warm(
        &self,
        initial_states: &[State],
        horizon: usize,
        weights: &CostWeights,
    ) -> Result<Vec<SampleOutcome>, OcpError> {
        let mut solved: Vec<(State, InitialGuess)> = Vec::new();
        let mut outcomes = Vec::with_capacity(initial_states.len());

        for x0 in initial_states {
            let guess = solved
                .iter()
                .min_by(|a, b| (a.0 - x0).norm().total_cmp(&(b.0 - x0).norm()))
                .map(|(_, g)| g.clone().with_initial_state(*x0));

            let (outcome, solution) = self.solve_one(*x0, horizon, weights, guess.as_ref())?;
            if let Some(solution) = solution {
                solved.push((*x0, solution));
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn solve_one(
        &self,
        x0: State,
        horizon: usize,
        weights: &CostWeights,
        guess: Option<&InitialGuess>,
    ) -> Result<(SampleOutcome, Option<InitialGuess>), OcpError> {
        let result = self
            .transcriber
            .build(x0, horizon, weights, TerminalCost::None)
            .and_then(|problem| self.solver.solve(&problem, guess));

        match result {
            Ok(solution) if solution.total_cost.is_finite() => Ok((
                SampleOutcome::Succeeded {
                    x0,
                    cost: solution.total_cost,
                },
                Some(solution.to_guess()),
            )),
            Ok(solution) => {
                let reason = OcpError::Solver(SolverFailure::NumericalError(format!(
                    "non-finite optimal cost {}",
                    solution.total_cost
                )));
                warn!(?x0, %reason, "sample skipped");
                Ok((SampleOutcome::Skipped { x0, reason }, None))
            }
            Err(reason @ OcpError::Solver(_)) => {
                warn!(?x0, %reason, "sample skipped");
                Ok((SampleOutcome::Skipped { x0, reason }, None))
            }
            Err(err) => {
                error!(?x0, %err, "sample generation aborted");
                Err(err)
            }
        }
    }
}
