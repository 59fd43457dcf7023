//! Ridge regression on quadratic state monomials.
//!
//! ```text
//! φ(x) = [1, x_0..x_3, x_i x_j (i <= j)]        15 features
//! w    = (ΦᵀΦ + ρ D)⁻¹ Φᵀ y                      D = diag(0, 1, …, 1)
//! ```
//!
//! The intercept is not penalised. Optimal costs of the regulated pendulum
//! are close to quadratic near the hanging equilibrium, so this family is a
//! good fit for moderate sampling boxes.

use std::fs;
use std::path::Path;

use lcmpc_core::config::SurrogateConfig;
use lcmpc_core::types::{STATE_DIM, State};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::SampleSet;
use crate::model::{CostModelTrainer, TerminalCostModel, TrainError, rmse};

/// `1 + 4 + 4·5/2`.
pub const NUM_FEATURES: usize = 1 + STATE_DIM + STATE_DIM * (STATE_DIM + 1) / 2;

/// Feature vector `φ(x)`.
pub fn quadratic_features(x: &State) -> [f64; NUM_FEATURES] {
    let mut phi = [0.0; NUM_FEATURES];
    phi[0] = 1.0;
    phi[1..=STATE_DIM].copy_from_slice(x.as_slice());
    let mut k = 1 + STATE_DIM;
    for i in 0..STATE_DIM {
        for j in i..STATE_DIM {
            phi[k] = x[i] * x[j];
            k += 1;
        }
    }
    phi
}

// ---------------------------------------------------------------------------
// QuadraticCostModel
// ---------------------------------------------------------------------------

/// Trained quadratic surrogate `V(x) = wᵀφ(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticCostModel {
    coefficients: Vec<f64>,
    #[serde(default = "default_clamp")]
    clamp_nonnegative: bool,
}

const fn default_clamp() -> bool {
    true
}

impl QuadraticCostModel {
    pub fn new(coefficients: Vec<f64>, clamp_nonnegative: bool) -> Result<Self, TrainError> {
        let model = Self {
            coefficients,
            clamp_nonnegative,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), TrainError> {
        if self.coefficients.len() != NUM_FEATURES {
            return Err(TrainError::Malformed(format!(
                "expected {NUM_FEATURES} coefficients, found {}",
                self.coefficients.len()
            )));
        }
        if !self.coefficients.iter().all(|w| w.is_finite()) {
            return Err(TrainError::Malformed("non-finite coefficient".into()));
        }
        Ok(())
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub const fn clamps_nonnegative(&self) -> bool {
        self.clamp_nonnegative
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), TrainError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load and validate a model written by [`save_json`](Self::save_json).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TrainError> {
        let model: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        model.validate()?;
        Ok(model)
    }
}

impl TerminalCostModel for QuadraticCostModel {
    fn predict(&self, x: &State) -> f64 {
        let raw: f64 = quadratic_features(x)
            .iter()
            .zip(&self.coefficients)
            .map(|(phi, w)| phi * w)
            .sum();
        if self.clamp_nonnegative {
            raw.max(0.0)
        } else {
            raw
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "QuadraticCostModel"
    }
}

// ---------------------------------------------------------------------------
// QuadraticRegressor
// ---------------------------------------------------------------------------

/// Closed-form ridge trainer for [`QuadraticCostModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticRegressor {
    ridge: f64,
    clamp_nonnegative: bool,
}

impl Default for QuadraticRegressor {
    fn default() -> Self {
        Self::from_config(&SurrogateConfig::default())
    }
}

impl QuadraticRegressor {
    pub const fn new(ridge: f64, clamp_nonnegative: bool) -> Self {
        Self {
            ridge,
            clamp_nonnegative,
        }
    }

    pub const fn from_config(config: &SurrogateConfig) -> Self {
        Self::new(config.ridge, config.clamp_nonnegative)
    }

    pub const fn ridge(&self) -> f64 {
        self.ridge
    }
}

impl CostModelTrainer for QuadraticRegressor {
    type Model = QuadraticCostModel;

    fn train(&self, samples: &SampleSet) -> Result<QuadraticCostModel, TrainError> {
        if samples.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        if let Some(index) = samples.first_non_finite() {
            return Err(TrainError::NonFinite { index });
        }

        let n = samples.len();
        let mut phi = DMatrix::zeros(n, NUM_FEATURES);
        let mut y = DVector::zeros(n);
        for (row, sample) in samples.iter().enumerate() {
            for (col, v) in quadratic_features(&sample.state).iter().enumerate() {
                phi[(row, col)] = *v;
            }
            y[row] = sample.cost;
        }

        let mut normal = phi.transpose() * &phi;
        for i in 1..NUM_FEATURES {
            normal[(i, i)] += self.ridge;
        }
        let rhs = phi.transpose() * &y;

        let chol = normal.cholesky().ok_or_else(|| {
            TrainError::IllConditioned(format!(
                "normal equations not positive definite ({n} samples, ridge {})",
                self.ridge
            ))
        })?;
        let weights = chol.solve(&rhs);
        if !weights.iter().all(|w| w.is_finite()) {
            return Err(TrainError::IllConditioned(
                "solution has non-finite weights".into(),
            ));
        }

        let model =
            QuadraticCostModel::new(weights.iter().copied().collect(), self.clamp_nonnegative)?;
        info!(
            samples = n,
            ridge = self.ridge,
            rmse = rmse(&model, samples),
            "trained quadratic terminal cost model"
        );
        Ok(model)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "QuadraticRegressor"
    }
}
