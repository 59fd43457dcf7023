//! Stage sequencing: sample → check → train → control.
//!
//! Training only starts once generation has finished, and control only
//! starts from a trained model. An empty sample set stops the pipeline
//! before the trainer is ever called.

use std::sync::Arc;

use lcmpc_core::config::LcmpcConfig;
use lcmpc_core::error::ConfigError;
use lcmpc_core::types::{CostWeights, State};
use lcmpc_dynamics::{DoublePendulum, Dynamics};
use lcmpc_ocp::{OcpError, OcpSolver, OcpTranscriber};
use lcmpc_surrogate::{CostModelTrainer, SampleSet, TerminalCostModel, TrainError};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info};

use crate::controller::{MpcController, MpcFailure, MpcRun};
use crate::sampler::{GenerationReport, SampleGenerator};

/// Pipeline-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Problem setup error: {0}")]
    Problem(#[from] OcpError),

    #[error("Insufficient training data: 0 of {attempted} samples succeeded")]
    InsufficientTrainingData { attempted: usize },

    #[error("Training error: {0}")]
    Train(#[from] TrainError),

    #[error("Control run failed: {0}")]
    Control(#[from] Box<MpcFailure>),
}

impl From<MpcFailure> for PipelineError {
    fn from(failure: MpcFailure) -> Self {
        Self::Control(Box::new(failure))
    }
}

/// Everything produced by [`Pipeline::run`].
pub struct PipelineOutcome {
    pub report: GenerationReport,
    pub model: Arc<dyn TerminalCostModel>,
    pub run: MpcRun,
}

impl std::fmt::Debug for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOutcome")
            .field("report", &self.report)
            .field("model", &self.model.name())
            .field("run", &self.run)
            .finish()
    }
}

/// Wires one configuration into generator, trainer input and controller.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: LcmpcConfig,
    transcriber: OcpTranscriber,
    weights: CostWeights,
}

impl Pipeline {
    /// Validate `config` and build the prediction model.
    pub fn new(config: LcmpcConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let model = DoublePendulum::new(config.dynamics)?;
        let transcriber = OcpTranscriber::new(Arc::new(model), config.problem.control_bound)?;
        let weights = config.problem.weights()?;
        Ok(Self {
            config,
            transcriber,
            weights,
        })
    }

    pub const fn config(&self) -> &LcmpcConfig {
        &self.config
    }

    pub const fn weights(&self) -> &CostWeights {
        &self.weights
    }

    pub fn dynamics(&self) -> &dyn Dynamics {
        self.transcriber.dynamics().as_ref()
    }

    fn solver(&self) -> OcpSolver {
        OcpSolver::sqp(self.config.solver.clone())
    }

    pub fn sample_generator(&self) -> Result<SampleGenerator, PipelineError> {
        Ok(SampleGenerator::new(
            self.transcriber.clone(),
            self.solver(),
            self.config.sampler.clone(),
        )?)
    }

    pub fn controller(&self) -> MpcController {
        MpcController::new(
            self.transcriber.clone(),
            self.solver(),
            self.config.mpc.clone(),
        )
    }

    /// Stage 1: solve the configured number of bare OCPs. A dynamics
    /// singularity in any draw stops the pipeline here.
    pub fn generate_samples(&self) -> Result<GenerationReport, PipelineError> {
        let generator = self.sample_generator()?;
        Ok(generator.generate(
            self.config.sampler.num_samples,
            self.config.problem.horizon,
            &self.weights,
        )?)
    }

    /// Stage 2: train on the successful draws of `report`.
    pub fn train<T: CostModelTrainer>(
        &self,
        report: &GenerationReport,
        trainer: &T,
    ) -> Result<T::Model, PipelineError> {
        self.train_on(&report.sample_set(), report.attempted(), trainer)
    }

    /// Stage 2 from a sample set loaded elsewhere.
    pub fn train_samples<T: CostModelTrainer>(
        &self,
        samples: &SampleSet,
        trainer: &T,
    ) -> Result<T::Model, PipelineError> {
        self.train_on(samples, samples.len(), trainer)
    }

    fn train_on<T: CostModelTrainer>(
        &self,
        samples: &SampleSet,
        attempted: usize,
        trainer: &T,
    ) -> Result<T::Model, PipelineError> {
        if samples.is_empty() {
            error!(attempted, "no successful samples; refusing to train");
            return Err(PipelineError::InsufficientTrainingData { attempted });
        }
        info!(
            samples = samples.len(),
            trainer = trainer.name(),
            "training terminal cost model"
        );
        Ok(trainer.train(samples)?)
    }

    /// Stage 3: one control run from `x0`.
    pub fn control(
        &self,
        x0: State,
        model: Arc<dyn TerminalCostModel>,
    ) -> Result<MpcRun, PipelineError> {
        Ok(self.controller().run(
            x0,
            self.config.problem.horizon,
            &self.weights,
            self.config.mpc.steps,
            model,
        )?)
    }

    /// Independent control runs sharing one read-only model, in parallel.
    /// Results are returned in the order of `initial_states`.
    pub fn control_many(
        &self,
        initial_states: &[State],
        model: &Arc<dyn TerminalCostModel>,
    ) -> Vec<Result<MpcRun, PipelineError>> {
        let controller = self.controller();
        initial_states
            .par_iter()
            .map(|x0| {
                controller
                    .run(
                        *x0,
                        self.config.problem.horizon,
                        &self.weights,
                        self.config.mpc.steps,
                        Arc::clone(model),
                    )
                    .map_err(PipelineError::from)
            })
            .collect()
    }

    /// All three stages in order.
    pub fn run<T: CostModelTrainer>(
        &self,
        x0: State,
        trainer: &T,
    ) -> Result<PipelineOutcome, PipelineError> {
        let report = self.generate_samples()?;
        let model: Arc<dyn TerminalCostModel> = Arc::new(self.train(&report, trainer)?);
        let run = self.control(x0, Arc::clone(&model))?;
        Ok(PipelineOutcome { report, model, run })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcmpc_core::error::{DynamicsError, SolverFailure};
    use lcmpc_surrogate::{ConstantCostModel, MeanCostTrainer};

    #[test]
    fn invalid_config_rejected() {
        let mut config = LcmpcConfig::default();
        config.problem.horizon = 0;
        assert!(matches!(
            Pipeline::new(config).unwrap_err(),
            PipelineError::Config(_)
        ));
    }

    #[test]
    fn empty_report_blocks_training() {
        let pipeline = Pipeline::new(LcmpcConfig::default()).unwrap();
        let err = pipeline
            .train(&GenerationReport::default(), &MeanCostTrainer)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientTrainingData { attempted: 0 }
        ));
    }

    #[test]
    fn singular_model_stops_sampling() {
        let mut config = LcmpcConfig::default();
        config.dynamics.m1 = 0.0;
        config.problem.horizon = 4;
        config.sampler.num_samples = 3;
        let pipeline = Pipeline::new(config).unwrap();
        let err = pipeline.generate_samples().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Problem(OcpError::Dynamics(DynamicsError::Singularity { .. }))
        ));
    }

    #[test]
    fn error_display() {
        let err = PipelineError::InsufficientTrainingData { attempted: 5 };
        assert_eq!(
            err.to_string(),
            "Insufficient training data: 0 of 5 samples succeeded"
        );

        let failure = MpcFailure {
            iteration: 2,
            partial: MpcRun::new(State::zeros()),
            source: OcpError::Solver(SolverFailure::Infeasible),
        };
        let err = PipelineError::from(failure);
        assert!(err.to_string().contains("iteration 2"));
    }

    #[test]
    fn control_many_preserves_order() {
        let mut config = LcmpcConfig::default();
        config.problem.horizon = 4;
        config.mpc.steps = 2;
        let pipeline = Pipeline::new(config).unwrap();
        let model: Arc<dyn TerminalCostModel> = Arc::new(ConstantCostModel::zero());
        let starts = [
            State::new(0.2, 0.0, 0.0, 0.0),
            State::new(-0.3, 0.1, 0.0, 0.0),
            State::new(0.0, 0.4, 0.1, 0.0),
        ];
        let runs = pipeline.control_many(&starts, &model);
        assert_eq!(runs.len(), 3);
        for (run, x0) in runs.iter().zip(&starts) {
            let run = run.as_ref().unwrap();
            assert_eq!(run.states[0], *x0);
            assert_eq!(run.steps(), 2);
        }
    }
}
