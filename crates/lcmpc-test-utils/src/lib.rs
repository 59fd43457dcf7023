//! Shared test fixtures and utilities for lcmpc crates.
//!
//! Provides reference configurations (pendulum parameters, cost weights,
//! solver settings) and deterministic RNG helpers for drawing states.

pub mod fixtures;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{default_pendulum_params, reference_weights, test_solver_config};
pub use rng::{random_state, seeded_rng};
