//! Terminal cost surrogates for learned-terminal-cost MPC.
//!
//! - [`SampleSet`]: `(initial state, optimal cost)` pairs produced by the
//!   sampler, serialisable to JSON between pipeline stages.
//! - [`TerminalCostModel`]: read-only `predict(&State) -> f64`, shared
//!   across concurrent control runs.
//! - [`CostModelTrainer`]: turns a sample set into a model.
//! - [`QuadraticRegressor`]: ridge regression on the quadratic monomials of
//!   the state, yielding a [`QuadraticCostModel`].

pub mod dataset;
pub mod model;
pub mod quadratic;

pub use dataset::{Sample, SampleSet};
pub use model::{
    ConstantCostModel, CostModelTrainer, MeanCostTrainer, TerminalCostModel, TrainError, rmse,
};
pub use quadratic::{NUM_FEATURES, QuadraticCostModel, QuadraticRegressor, quadratic_features};

pub mod prelude {
    pub use crate::{
        ConstantCostModel, CostModelTrainer, QuadraticCostModel, QuadraticRegressor, SampleSet,
        TerminalCostModel, TrainError,
    };
}
