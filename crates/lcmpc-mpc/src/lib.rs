//! Learned-terminal-cost model-predictive control.
//!
//! - [`sampler`]: draws initial states and solves bare OCPs to produce
//!   training data, with per-draw tagged outcomes.
//! - [`controller`]: the receding-horizon loop, as an explicit
//!   [`MpcPhase`] state machine.
//! - [`pipeline`]: sequences sampling, training and control from one
//!   [`LcmpcConfig`](lcmpc_core::config::LcmpcConfig).

pub mod controller;
pub mod pipeline;
pub mod sampler;

pub use controller::{
    MpcController, MpcFailure, MpcPhase, MpcRun, MpcSession, RunSummary, SolveStats,
};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};
pub use sampler::{GenerationReport, SampleGenerator, SampleOutcome};

pub mod prelude {
    pub use lcmpc_core::prelude::*;
    pub use lcmpc_dynamics::{DoublePendulum, Dynamics};
    pub use lcmpc_ocp::{
        InitialGuess, OcpError, OcpSolution, OcpSolver, OcpTranscriber, SqpSolver, TerminalCost,
    };
    pub use lcmpc_surrogate::prelude::*;

    pub use crate::{
        GenerationReport, MpcController, MpcFailure, MpcPhase, MpcRun, Pipeline, PipelineError,
        SampleGenerator, SampleOutcome,
    };
}
