//! Surrogate model and trainer traits.

use lcmpc_core::types::State;
use thiserror::Error;

use crate::dataset::SampleSet;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Training and persistence errors.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Cannot train on an empty sample set")]
    EmptyDataset,

    #[error("Sample {index} has a non-finite state or cost")]
    NonFinite { index: usize },

    #[error("Regression system is ill-conditioned: {0}")]
    IllConditioned(String),

    #[error("Malformed model: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Learned approximation of the cost-to-go beyond the horizon.
///
/// Immutable after training: `predict` is deterministic and side-effect
/// free, so one model can be shared by concurrent control runs.
pub trait TerminalCostModel: Send + Sync {
    /// Estimated cost-to-go from `x`.
    fn predict(&self, x: &State) -> f64;

    /// Human-readable name for this model.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Fits a [`TerminalCostModel`] to a [`SampleSet`].
pub trait CostModelTrainer {
    type Model: TerminalCostModel + 'static;

    fn train(&self, samples: &SampleSet) -> Result<Self::Model, TrainError>;

    /// Human-readable name for this trainer.
    fn name(&self) -> &str;
}

/// Root-mean-square prediction error over a sample set (`0.0` when empty).
#[allow(clippy::cast_precision_loss)]
pub fn rmse(model: &dyn TerminalCostModel, samples: &SampleSet) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sq: f64 = samples
        .iter()
        .map(|s| (model.predict(&s.state) - s.cost).powi(2))
        .sum();
    (sq / samples.len() as f64).sqrt()
}

// ---------------------------------------------------------------------------
// ConstantCostModel
// ---------------------------------------------------------------------------

/// Predicts the same value everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantCostModel {
    value: f64,
}

impl ConstantCostModel {
    pub const fn new(value: f64) -> Self {
        Self { value }
    }

    pub const fn zero() -> Self {
        Self::new(0.0)
    }

    pub const fn value(&self) -> f64 {
        self.value
    }
}

impl TerminalCostModel for ConstantCostModel {
    fn predict(&self, _x: &State) -> f64 {
        self.value
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ConstantCostModel"
    }
}

/// Baseline trainer: the mean sample cost as a constant model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanCostTrainer;

impl CostModelTrainer for MeanCostTrainer {
    type Model = ConstantCostModel;

    fn train(&self, samples: &SampleSet) -> Result<ConstantCostModel, TrainError> {
        if let Some(index) = samples.first_non_finite() {
            return Err(TrainError::NonFinite { index });
        }
        samples
            .mean_cost()
            .map(ConstantCostModel::new)
            .ok_or(TrainError::EmptyDataset)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "MeanCostTrainer"
    }
}
