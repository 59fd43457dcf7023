//! Point-mass double pendulum with a torque on each joint.
//!
//! Equations of motion in absolute angles `q = [q1, q2]`:
//!
//! ```text
//! M(q) q̈ = τ - C(q, q̇) - G(q)
//!
//! M = [ (m1+m2) l1²          m2 l1 l2 cos(q1-q2) ]
//!     [ m2 l1 l2 cos(q1-q2)  m2 l2²              ]
//! C = [  m2 l1 l2 sin(q1-q2) q̇2² ]
//!     [ -m2 l1 l2 sin(q1-q2) q̇1² ]
//! G = [ (m1+m2) g l1 sin q1 ]
//!     [  m2 g l2 sin q2     ]
//! ```
//!
//! `det M = m2 l1² l2² (m1 + m2 sin²(q1-q2))`, which vanishes when the
//! first mass is (near) zero and the links are aligned.

use lcmpc_core::config::PendulumParams;
use lcmpc_core::error::{ConfigError, DynamicsError};
use lcmpc_core::types::{Control, State};

use crate::model::Dynamics;

/// Two-link pendulum integrated with explicit Euler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoublePendulum {
    params: PendulumParams,
}

impl DoublePendulum {
    /// Create a model from validated parameters.
    pub fn new(params: PendulumParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub const fn params(&self) -> &PendulumParams {
        &self.params
    }

    /// Continuous-time state derivative `f(x, u)`.
    pub fn derivative(&self, x: &State, u: &Control) -> Result<State, DynamicsError> {
        if !x.iter().chain(u.iter()).all(|v| v.is_finite()) {
            return Err(DynamicsError::NonFinite);
        }

        let PendulumParams {
            l1,
            l2,
            m1,
            m2,
            gravity: g,
            singularity_tol,
            ..
        } = self.params;
        let (q1, q2, dq1, dq2) = (x[0], x[1], x[2], x[3]);

        let (s, c) = (q1 - q2).sin_cos();
        let coupling = m2 * l1 * l2;

        let m11 = (m1 + m2) * l1 * l1;
        let m12 = coupling * c;
        let m22 = m2 * l2 * l2;
        let determinant = m11 * m22 - m12 * m12;

        // Scale-free test: det / ((m1+m2) m2 l1² l2²) = (m1 + m2 s²) / (m1 + m2).
        let scale = m11 * m22;
        if !(determinant.abs() > singularity_tol * scale) {
            return Err(DynamicsError::Singularity {
                q1,
                q2,
                determinant,
            });
        }

        let rhs1 = u[0] - coupling * s * dq2 * dq2 - (m1 + m2) * g * l1 * q1.sin();
        let rhs2 = u[1] + coupling * s * dq1 * dq1 - m2 * g * l2 * q2.sin();

        let ddq1 = (m22 * rhs1 - m12 * rhs2) / determinant;
        let ddq2 = (m11 * rhs2 - m12 * rhs1) / determinant;

        let xdot = State::new(dq1, dq2, ddq1, ddq2);
        if xdot.iter().all(|v| v.is_finite()) {
            Ok(xdot)
        } else {
            Err(DynamicsError::NonFinite)
        }
    }

    /// Total mechanical energy (kinetic + potential, zero at the hanging
    /// equilibrium). Conserved by the continuous model under zero torque.
    pub fn energy(&self, x: &State) -> f64 {
        let PendulumParams {
            l1,
            l2,
            m1,
            m2,
            gravity: g,
            ..
        } = self.params;
        let (q1, q2, dq1, dq2) = (x[0], x[1], x[2], x[3]);

        let kinetic = 0.5 * (m1 + m2) * l1 * l1 * dq1 * dq1
            + 0.5 * m2 * l2 * l2 * dq2 * dq2
            + m2 * l1 * l2 * dq1 * dq2 * (q1 - q2).cos();
        let potential = (m1 + m2) * g * l1 * (1.0 - q1.cos()) + m2 * g * l2 * (1.0 - q2.cos());
        kinetic + potential
    }
}

impl Dynamics for DoublePendulum {
    fn step(&self, x: &State, u: &Control) -> Result<State, DynamicsError> {
        let next = x + self.params.dt * self.derivative(x, u)?;
        if next.iter().all(|v| v.is_finite()) {
            Ok(next)
        } else {
            Err(DynamicsError::NonFinite)
        }
    }

    fn dt(&self) -> f64 {
        self.params.dt
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "DoublePendulum"
    }
}
