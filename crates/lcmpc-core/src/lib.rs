// lcmpc-core: Types, config and errors shared by the lcmpc crates.

pub mod config;
pub mod error;
pub mod types;

pub mod prelude {
    pub use crate::config::{
        LcmpcConfig, MpcConfig, PendulumParams, ProblemConfig, SamplerConfig, SolverConfig,
        StateUpdate, SurrogateConfig, TerminalCoupling, TerminalSeed, WarmStart,
    };
    pub use crate::error::{ConfigError, DynamicsError, LcmpcError, SolverFailure};
    pub use crate::types::{CONTROL_DIM, Control, CostWeights, STATE_DIM, State};
}
