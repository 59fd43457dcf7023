use nalgebra::{Matrix2, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of pendulum states: [q1, q2, dq1, dq2].
pub const STATE_DIM: usize = 4;

/// Number of joint torques.
pub const CONTROL_DIM: usize = 2;

/// Pendulum state: absolute link angles from the downward vertical (rad)
/// followed by their rates (rad/s).
pub type State = Vector4<f64>;

/// Joint torques.
pub type Control = Vector2<f64>;

// ---------------------------------------------------------------------------
// CostWeights
// ---------------------------------------------------------------------------

/// Diagonal stage-cost weights `Q = diag(q)`, `R = diag(r)`.
///
/// Entries are validated to be finite and non-negative, so both matrices
/// are positive semi-definite and every stage cost is `>= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    q: [f64; STATE_DIM],
    r: [f64; CONTROL_DIM],
}

impl CostWeights {
    pub fn new(q: [f64; STATE_DIM], r: [f64; CONTROL_DIM]) -> Result<Self, ConfigError> {
        let weights = Self { q, r };
        weights.validate()?;
        Ok(weights)
    }

    /// Check every diagonal entry is finite and `>= 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(i) = self.q.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "q_diag",
                format!("entry {i} is {} (must be finite and >= 0)", self.q[i]),
            ));
        }
        if let Some(i) = self.r.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "r_diag",
                format!("entry {i} is {} (must be finite and >= 0)", self.r[i]),
            ));
        }
        Ok(())
    }

    pub const fn q_diag(&self) -> &[f64; STATE_DIM] {
        &self.q
    }

    pub const fn r_diag(&self) -> &[f64; CONTROL_DIM] {
        &self.r
    }

    pub fn q_matrix(&self) -> Matrix4<f64> {
        Matrix4::from_diagonal(&Vector4::from(self.q))
    }

    pub fn r_matrix(&self) -> Matrix2<f64> {
        Matrix2::from_diagonal(&Vector2::from(self.r))
    }

    /// `xᵀQx + uᵀRu`.
    pub fn stage_cost(&self, x: &State, u: &Control) -> f64 {
        let state: f64 = self.q.iter().zip(x.iter()).map(|(w, v)| w * v * v).sum();
        let control: f64 = self.r.iter().zip(u.iter()).map(|(w, v)| w * v * v).sum();
        state + control
    }

    /// Copy with one state weight replaced.
    pub fn with_q(mut self, index: usize, value: f64) -> Result<Self, ConfigError> {
        if index >= STATE_DIM {
            return Err(ConfigError::invalid("q_diag", format!("index {index} out of range")));
        }
        self.q[index] = value;
        self.validate()?;
        Ok(self)
    }

    /// Copy with one control weight replaced.
    pub fn with_r(mut self, index: usize, value: f64) -> Result<Self, ConfigError> {
        if index >= CONTROL_DIM {
            return Err(ConfigError::invalid("r_diag", format!("index {index} out of range")));
        }
        self.r[index] = value;
        self.validate()?;
        Ok(self)
    }
}
