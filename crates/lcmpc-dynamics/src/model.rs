//! The [`Dynamics`] trait consumed by the transcriber and the controller.

use lcmpc_core::error::DynamicsError;
use lcmpc_core::types::{CONTROL_DIM, Control, STATE_DIM, State};
use nalgebra::{Matrix4, Matrix4x2};

/// `∂x_{k+1} / ∂x_k`.
pub type StateJacobian = Matrix4<f64>;

/// `∂x_{k+1} / ∂u_k`.
pub type ControlJacobian = Matrix4x2<f64>;

/// Default central-difference step for [`Dynamics::jacobians`].
pub const JACOBIAN_FD_STEP: f64 = 1e-6;

/// A discrete-time state-transition function `x_{k+1} = F(x_k, u_k)`.
///
/// Implementations are pure: the same `(x, u)` always yields the same
/// result, and no state is kept between calls. `Send + Sync` so one model
/// can be shared by concurrent sampling and control runs.
pub trait Dynamics: Send + Sync {
    /// Advance one integration step.
    fn step(&self, x: &State, u: &Control) -> Result<State, DynamicsError>;

    /// Integration step in seconds.
    fn dt(&self) -> f64;

    /// Jacobians of [`step`](Self::step) with respect to state and control.
    ///
    /// The default uses central differences with [`JACOBIAN_FD_STEP`].
    fn jacobians(
        &self,
        x: &State,
        u: &Control,
    ) -> Result<(StateJacobian, ControlJacobian), DynamicsError> {
        let h = JACOBIAN_FD_STEP;
        let mut jac_x = StateJacobian::zeros();
        let mut jac_u = ControlJacobian::zeros();

        for j in 0..STATE_DIM {
            let mut xp = *x;
            let mut xm = *x;
            xp[j] += h;
            xm[j] -= h;
            let col = (self.step(&xp, u)? - self.step(&xm, u)?) / (2.0 * h);
            jac_x.set_column(j, &col);
        }

        for j in 0..CONTROL_DIM {
            let mut up = *u;
            let mut um = *u;
            up[j] += h;
            um[j] -= h;
            let col = (self.step(x, &up)? - self.step(x, &um)?) / (2.0 * h);
            jac_u.set_column(j, &col);
        }

        Ok((jac_x, jac_u))
    }

    /// Human-readable name for this model.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Linear test system: a discretised double integrator per axis.
    struct DoubleIntegrator {
        dt: f64,
    }

    impl Dynamics for DoubleIntegrator {
        fn step(&self, x: &State, u: &Control) -> Result<State, DynamicsError> {
            Ok(State::new(
                x[0] + self.dt * x[2],
                x[1] + self.dt * x[3],
                x[2] + self.dt * u[0],
                x[3] + self.dt * u[1],
            ))
        }

        fn dt(&self) -> f64 {
            self.dt
        }
    }

    #[test]
    fn finite_difference_jacobian_exact_for_linear_model() {
        let model = DoubleIntegrator { dt: 0.1 };
        let (a, b) = model
            .jacobians(&State::new(0.3, -0.2, 1.0, 0.5), &Control::new(0.7, -0.4))
            .unwrap();

        let mut a_expected = StateJacobian::identity();
        a_expected[(0, 2)] = 0.1;
        a_expected[(1, 3)] = 0.1;
        let mut b_expected = ControlJacobian::zeros();
        b_expected[(2, 0)] = 0.1;
        b_expected[(3, 1)] = 0.1;

        assert_relative_eq!(a, a_expected, epsilon = 1e-8);
        assert_relative_eq!(b, b_expected, epsilon = 1e-8);
    }

    #[test]
    fn default_name_is_type_name() {
        let model = DoubleIntegrator { dt: 0.1 };
        assert!(model.name().ends_with("DoubleIntegrator"));
    }
}
