//! Discrete-time dynamics for the torque-limited double pendulum.
//!
//! The plant is a planar two-link pendulum with point masses at the link
//! tips and a torque on each joint. States use absolute link angles
//! measured from the downward vertical, so the hanging configuration
//! `x = 0` is an equilibrium under zero torque.
//!
//! The continuous model is integrated with a single explicit Euler step:
//!
//! ```text
//! x_{k+1} = x_k + dt * f(x_k, u_k)
//! ```
//!
//! Every evaluation is checked: a vanishing mass-matrix determinant is
//! reported as [`DynamicsError::Singularity`](lcmpc_core::error::DynamicsError)
//! and non-finite results as `NonFinite`.

pub mod model;
pub mod pendulum;

pub use model::{ControlJacobian, Dynamics, StateJacobian};
pub use pendulum::DoublePendulum;
