//! Deterministic RNG utilities for reproducible tests.

use lcmpc_core::types::State;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Draw a state with every component uniform in `[-bound, bound]`.
pub fn random_state(rng: &mut ChaCha8Rng, bound: f64) -> State {
    let dist = Uniform::new_inclusive(-bound, bound);
    State::from_fn(|_, _| dist.sample(rng))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
