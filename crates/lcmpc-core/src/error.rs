use thiserror::Error;

/// Top-level error type for lcmpc-core.
#[derive(Debug, Error)]
pub enum LcmpcError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dynamics error: {0}")]
    Dynamics(#[from] DynamicsError),

    #[error("Solver failure: {0}")]
    Solver(#[from] SolverFailure),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Incompatible configuration: {0}")]
    Incompatible(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised while evaluating the pendulum equations of motion.
///
/// Copy so it can be threaded through solver hot paths without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DynamicsError {
    #[error(
        "Dynamics singularity at q1={q1:.6}, q2={q2:.6}: mass-matrix determinant {determinant:e} is below tolerance"
    )]
    Singularity { q1: f64, q2: f64, determinant: f64 },

    #[error("Dynamics produced a non-finite value")]
    NonFinite,
}

/// Typed failure of a nonlinear program solve.
///
/// Recoverable at the call site: the sampler skips the draw, the MPC loop
/// stops and hands the partial run back to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFailure {
    #[error("Problem is infeasible")]
    Infeasible,

    #[error("Maximum iterations exceeded ({iterations})")]
    MaxIterationsExceeded { iterations: u32 },

    #[error("Numerical error: {0}")]
    NumericalError(String),

    #[error("Time limit exceeded after {elapsed_ms} ms")]
    TimeLimitExceeded { elapsed_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcmpc_error_from_config_error() {
        let err = ConfigError::invalid("dt", "must be > 0");
        let top: LcmpcError = err.into();
        assert!(matches!(top, LcmpcError::Config(_)));
        assert!(top.to_string().contains("dt"));
    }

    #[test]
    fn lcmpc_error_from_dynamics_error() {
        let top: LcmpcError = DynamicsError::NonFinite.into();
        assert!(matches!(top, LcmpcError::Dynamics(_)));
        assert!(top.to_string().contains("non-finite"));
    }

    #[test]
    fn lcmpc_error_from_solver_failure() {
        let top: LcmpcError = SolverFailure::Infeasible.into();
        assert!(matches!(top, LcmpcError::Solver(_)));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn dynamics_error_is_copy() {
        let err = DynamicsError::Singularity {
            q1: 0.1,
            q2: 0.1,
            determinant: 0.0,
        };
        let err2 = err;
        assert_eq!(err, err2);
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ConfigError::invalid("horizon", "must be >= 1").to_string(),
            "Invalid value for horizon: must be >= 1"
        );
        assert_eq!(
            ConfigError::Incompatible("parallel sampling cannot warm start".into()).to_string(),
            "Incompatible configuration: parallel sampling cannot warm start"
        );
        assert_eq!(
            SolverFailure::MaxIterationsExceeded { iterations: 50 }.to_string(),
            "Maximum iterations exceeded (50)"
        );
        assert_eq!(
            SolverFailure::NumericalError("line search failed".into()).to_string(),
            "Numerical error: line search failed"
        );
        assert_eq!(
            SolverFailure::TimeLimitExceeded { elapsed_ms: 12 }.to_string(),
            "Time limit exceeded after 12 ms"
        );
        let singular = DynamicsError::Singularity {
            q1: 0.5,
            q2: 0.5,
            determinant: 0.0,
        }
        .to_string();
        assert!(singular.starts_with("Dynamics singularity at q1=0.500000, q2=0.500000"));
    }
}
