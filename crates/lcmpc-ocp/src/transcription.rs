//! Finite-horizon OCP transcription.
//!
//! Decision vector layout for horizon `N`:
//!
//! ```text
//! z = [ x_0 | x_1 | … | x_N | u_0 | … | u_{N-1} ]
//!       4     4         4     2         2
//! ```
//!
//! Equalities: `x_0 - x0 = 0`, then `x_{k+1} - F(x_k, u_k) = 0` for every
//! stage. Bounds: states free, controls in `[-u_max, u_max]`.

use std::fmt;
use std::sync::Arc;

use lcmpc_core::error::DynamicsError;
use lcmpc_core::types::{CONTROL_DIM, Control, CostWeights, STATE_DIM, State};
use lcmpc_dynamics::Dynamics;
use nalgebra::{DMatrix, DVector};

use crate::nlp::{NlpProblem, project_psd};
use crate::solver::OcpError;

/// Central-difference step for terminal-cost gradients.
const GRADIENT_FD_STEP: f64 = 1e-6;

/// Second-difference step for terminal-cost and dynamics curvature.
const HESSIAN_FD_STEP: f64 = 1e-4;

/// Stage block size `[x_k, u_k]`.
const STAGE_DIM: usize = STATE_DIM + CONTROL_DIM;

// ---------------------------------------------------------------------------
// TerminalCost
// ---------------------------------------------------------------------------

/// Horizon-end penalty applied to `x_N`.
#[derive(Clone, Default)]
pub enum TerminalCost {
    /// Bare problem.
    #[default]
    None,
    /// A fixed scalar added to the objective; does not depend on `z`.
    Constant(f64),
    /// A smooth function of the terminal state.
    Function(Arc<dyn Fn(&State) -> f64 + Send + Sync>),
}

impl TerminalCost {
    /// Wrap a closure as a [`TerminalCost::Function`].
    pub fn function(f: impl Fn(&State) -> f64 + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(f))
    }

    /// Value at `x`.
    pub fn evaluate(&self, x: &State) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Constant(c) => *c,
            Self::Function(f) => f(x),
        }
    }

    fn gradient(&self, x: &State) -> State {
        let Self::Function(f) = self else {
            return State::zeros();
        };
        let h = GRADIENT_FD_STEP;
        State::from_fn(|i, _| {
            let mut xp = *x;
            let mut xm = *x;
            xp[i] += h;
            xm[i] -= h;
            (f(&xp) - f(&xm)) / (2.0 * h)
        })
    }

    /// PSD-projected Hessian at `x`; `None` for terms without curvature.
    fn hessian(&self, x: &State) -> Option<DMatrix<f64>> {
        let Self::Function(f) = self else {
            return None;
        };
        let w = DVector::from_column_slice(x.as_slice());
        let raw = central_hessian(&w, |v| Ok(f(&State::from_column_slice(v.as_slice()))));
        raw.ok().map(|h| project_psd(&h))
    }
}

impl fmt::Debug for TerminalCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Constant(c) => f.debug_tuple("Constant").field(c).finish(),
            Self::Function(_) => write!(f, "Function(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// InitialGuess
// ---------------------------------------------------------------------------

/// Trajectory-shaped initial guess for a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialGuess {
    pub states: Vec<State>,
    pub controls: Vec<Control>,
}

impl InitialGuess {
    /// All-zero guess for horizon `horizon`.
    pub fn zeros(horizon: usize) -> Self {
        Self {
            states: vec![State::zeros(); horizon + 1],
            controls: vec![Control::zeros(); horizon],
        }
    }

    /// Receding-horizon shift: drop the first stage, repeat the last
    /// control and extend the trajectory by one model step.
    pub fn shifted(&self, dynamics: &dyn Dynamics) -> Result<Self, DynamicsError> {
        let (Some(last_state), Some(last_control)) = (self.states.last(), self.controls.last())
        else {
            return Ok(self.clone());
        };
        let next = dynamics.step(last_state, last_control)?;

        let mut states: Vec<State> = self.states.iter().skip(1).copied().collect();
        states.push(next);
        let mut controls: Vec<Control> = self.controls.iter().skip(1).copied().collect();
        controls.push(*last_control);
        Ok(Self { states, controls })
    }

    /// Same guess with `x_0` replaced.
    #[must_use]
    pub fn with_initial_state(mut self, x0: State) -> Self {
        if let Some(first) = self.states.first_mut() {
            *first = x0;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// OcpTranscriber
// ---------------------------------------------------------------------------

/// Builds [`OcpProblem`]s around a shared dynamics model.
#[derive(Clone)]
pub struct OcpTranscriber {
    dynamics: Arc<dyn Dynamics>,
    control_bound: f64,
}

impl OcpTranscriber {
    pub fn new(dynamics: Arc<dyn Dynamics>, control_bound: f64) -> Result<Self, OcpError> {
        if !(control_bound.is_finite() && control_bound > 0.0) {
            return Err(OcpError::InvalidProblem(format!(
                "control bound must be finite and > 0, got {control_bound}"
            )));
        }
        Ok(Self {
            dynamics,
            control_bound,
        })
    }

    pub fn dynamics(&self) -> &Arc<dyn Dynamics> {
        &self.dynamics
    }

    pub const fn control_bound(&self) -> f64 {
        self.control_bound
    }

    /// Transcribe the horizon-`horizon` problem starting at `x0`.
    pub fn build(
        &self,
        x0: State,
        horizon: usize,
        weights: &CostWeights,
        terminal: TerminalCost,
    ) -> Result<OcpProblem, OcpError> {
        if horizon == 0 {
            return Err(OcpError::InvalidProblem("horizon must be at least 1".into()));
        }
        if !x0.iter().all(|v| v.is_finite()) {
            return Err(OcpError::InvalidProblem(format!(
                "initial state is not finite: {x0:?}"
            )));
        }
        weights
            .validate()
            .map_err(|e| OcpError::InvalidProblem(e.to_string()))?;

        Ok(OcpProblem {
            dynamics: Arc::clone(&self.dynamics),
            x0,
            horizon,
            weights: *weights,
            terminal,
            control_bound: self.control_bound,
        })
    }
}

impl fmt::Debug for OcpTranscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcpTranscriber")
            .field("dynamics", &self.dynamics.name())
            .field("control_bound", &self.control_bound)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// OcpProblem
// ---------------------------------------------------------------------------

/// A transcribed finite-horizon problem. Built per solve and discarded.
pub struct OcpProblem {
    dynamics: Arc<dyn Dynamics>,
    x0: State,
    horizon: usize,
    weights: CostWeights,
    terminal: TerminalCost,
    control_bound: f64,
}

impl OcpProblem {
    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    pub const fn initial_state(&self) -> &State {
        &self.x0
    }

    pub const fn weights(&self) -> &CostWeights {
        &self.weights
    }

    pub const fn terminal(&self) -> &TerminalCost {
        &self.terminal
    }

    pub const fn control_bound(&self) -> f64 {
        self.control_bound
    }

    pub fn dynamics(&self) -> &dyn Dynamics {
        self.dynamics.as_ref()
    }

    const fn state_offset(k: usize) -> usize {
        k * STATE_DIM
    }

    const fn control_offset(&self, k: usize) -> usize {
        (self.horizon + 1) * STATE_DIM + k * CONTROL_DIM
    }

    fn state_at(z: &DVector<f64>, k: usize) -> State {
        z.fixed_rows::<STATE_DIM>(Self::state_offset(k)).into_owned()
    }

    fn control_at(&self, z: &DVector<f64>, k: usize) -> Control {
        z.fixed_rows::<CONTROL_DIM>(self.control_offset(k))
            .into_owned()
    }

    /// Cold-start guess: every state and control zero.
    pub fn zero_guess(&self) -> InitialGuess {
        InitialGuess::zeros(self.horizon)
    }

    /// Flatten a trajectory-shaped guess into a decision vector.
    pub fn pack(&self, guess: &InitialGuess) -> Result<DVector<f64>, OcpError> {
        if guess.states.len() != self.horizon + 1 || guess.controls.len() != self.horizon {
            return Err(OcpError::InvalidProblem(format!(
                "guess has {} states and {} controls, expected {} and {}",
                guess.states.len(),
                guess.controls.len(),
                self.horizon + 1,
                self.horizon
            )));
        }
        let mut z = DVector::zeros(self.num_variables());
        for (k, x) in guess.states.iter().enumerate() {
            z.fixed_rows_mut::<STATE_DIM>(Self::state_offset(k))
                .copy_from(x);
        }
        for (k, u) in guess.controls.iter().enumerate() {
            z.fixed_rows_mut::<CONTROL_DIM>(self.control_offset(k))
                .copy_from(u);
        }
        Ok(z)
    }

    /// Split a decision vector into `N + 1` states and `N` controls.
    pub fn split(&self, z: &DVector<f64>) -> Result<(Vec<State>, Vec<Control>), OcpError> {
        if z.len() != self.num_variables() {
            return Err(OcpError::InvalidProblem(format!(
                "decision vector has {} entries, expected {}",
                z.len(),
                self.num_variables()
            )));
        }
        let states = (0..=self.horizon).map(|k| Self::state_at(z, k)).collect();
        let controls = (0..self.horizon).map(|k| self.control_at(z, k)).collect();
        Ok((states, controls))
    }

    /// `Σ_{k<N} x_kᵀQx_k + u_kᵀRu_k`.
    pub fn stage_cost(&self, states: &[State], controls: &[Control]) -> f64 {
        states
            .iter()
            .zip(controls)
            .map(|(x, u)| self.weights.stage_cost(x, u))
            .sum()
    }

    pub fn terminal_cost(&self, terminal_state: &State) -> f64 {
        self.terminal.evaluate(terminal_state)
    }

    /// Total objective of a trajectory pair.
    pub fn evaluate(&self, states: &[State], controls: &[Control]) -> f64 {
        let terminal = states
            .get(self.horizon)
            .map_or(0.0, |x| self.terminal_cost(x));
        self.stage_cost(states, controls) + terminal
    }

    /// Largest dynamics defect `|x_{k+1} - F(x_k, u_k)|_inf` over all stages.
    pub fn dynamics_defect(
        &self,
        states: &[State],
        controls: &[Control],
    ) -> Result<f64, DynamicsError> {
        let mut worst = 0.0_f64;
        for (k, u) in controls.iter().enumerate() {
            let (Some(x), Some(next)) = (states.get(k), states.get(k + 1)) else {
                break;
            };
            let predicted = self.dynamics.step(x, u)?;
            worst = worst.max((next - predicted).amax());
        }
        Ok(worst)
    }

    /// PSD curvature of `-λᵀ F(x_k, u_k)` over the stage block `[x_k, u_k]`.
    fn dynamics_curvature(
        &self,
        x: &State,
        u: &Control,
        lambda: &State,
    ) -> Result<DMatrix<f64>, DynamicsError> {
        let mut w = DVector::zeros(STAGE_DIM);
        w.fixed_rows_mut::<STATE_DIM>(0).copy_from(x);
        w.fixed_rows_mut::<CONTROL_DIM>(STATE_DIM).copy_from(u);

        central_hessian(&w, |v| {
            let xs = v.fixed_rows::<STATE_DIM>(0).into_owned();
            let us = v.fixed_rows::<CONTROL_DIM>(STATE_DIM).into_owned();
            Ok(-lambda.dot(&self.dynamics.step(&xs, &us)?))
        })
    }
}

impl fmt::Debug for OcpProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcpProblem")
            .field("dynamics", &self.dynamics.name())
            .field("x0", &self.x0)
            .field("horizon", &self.horizon)
            .field("weights", &self.weights)
            .field("terminal", &self.terminal)
            .field("control_bound", &self.control_bound)
            .finish()
    }
}

impl NlpProblem for OcpProblem {
    fn num_variables(&self) -> usize {
        (self.horizon + 1) * STATE_DIM + self.horizon * CONTROL_DIM
    }

    fn num_equalities(&self) -> usize {
        (self.horizon + 1) * STATE_DIM
    }

    fn objective(&self, z: &DVector<f64>) -> Result<f64, DynamicsError> {
        let stage: f64 = (0..self.horizon)
            .map(|k| {
                self.weights
                    .stage_cost(&Self::state_at(z, k), &self.control_at(z, k))
            })
            .sum();
        Ok(stage + self.terminal.evaluate(&Self::state_at(z, self.horizon)))
    }

    fn gradient(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
        let q = self.weights.q_diag();
        let r = self.weights.r_diag();
        let mut grad = DVector::zeros(self.num_variables());

        for k in 0..self.horizon {
            let xo = Self::state_offset(k);
            for i in 0..STATE_DIM {
                grad[xo + i] = 2.0 * q[i] * z[xo + i];
            }
            let uo = self.control_offset(k);
            for i in 0..CONTROL_DIM {
                grad[uo + i] = 2.0 * r[i] * z[uo + i];
            }
        }

        let terminal = self.terminal.gradient(&Self::state_at(z, self.horizon));
        grad.fixed_rows_mut::<STATE_DIM>(Self::state_offset(self.horizon))
            .copy_from(&terminal);
        Ok(grad)
    }

    fn lagrangian_hessian(
        &self,
        z: &DVector<f64>,
        lambda: &DVector<f64>,
        _mu: &DVector<f64>,
    ) -> Result<DMatrix<f64>, DynamicsError> {
        let n = self.num_variables();
        let q = self.weights.q_diag();
        let r = self.weights.r_diag();
        let with_curvature = lambda.len() == self.num_equalities();
        let mut hessian = DMatrix::zeros(n, n);

        for k in 0..self.horizon {
            let x = Self::state_at(z, k);
            let u = self.control_at(z, k);

            let mut block = DMatrix::zeros(STAGE_DIM, STAGE_DIM);
            for i in 0..STATE_DIM {
                block[(i, i)] = 2.0 * q[i];
            }
            for i in 0..CONTROL_DIM {
                block[(STATE_DIM + i, STATE_DIM + i)] = 2.0 * r[i];
            }

            // Multipliers of the defect x_{k+1} - F(x_k, u_k).
            if with_curvature {
                let lam: State = lambda
                    .fixed_rows::<STATE_DIM>(Self::state_offset(k + 1))
                    .into_owned();
                if lam.iter().any(|v| *v != 0.0) {
                    block += self.dynamics_curvature(&x, &u, &lam)?;
                    block = project_psd(&block);
                }
            }

            let global = |a: usize| {
                if a < STATE_DIM {
                    Self::state_offset(k) + a
                } else {
                    self.control_offset(k) + a - STATE_DIM
                }
            };
            for a in 0..STAGE_DIM {
                for b in 0..STAGE_DIM {
                    hessian[(global(a), global(b))] += block[(a, b)];
                }
            }
        }

        if let Some(terminal) = self.terminal.hessian(&Self::state_at(z, self.horizon)) {
            let o = Self::state_offset(self.horizon);
            let mut view = hessian.view_mut((o, o), (STATE_DIM, STATE_DIM));
            view += terminal;
        }

        Ok(hessian)
    }

    fn equalities(&self, z: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
        let mut c = DVector::zeros(self.num_equalities());
        c.fixed_rows_mut::<STATE_DIM>(0)
            .copy_from(&(Self::state_at(z, 0) - self.x0));

        for k in 0..self.horizon {
            let next = self
                .dynamics
                .step(&Self::state_at(z, k), &self.control_at(z, k))?;
            let defect = Self::state_at(z, k + 1) - next;
            c.fixed_rows_mut::<STATE_DIM>(Self::state_offset(k + 1))
                .copy_from(&defect);
        }
        Ok(c)
    }

    fn equality_jacobian(&self, z: &DVector<f64>) -> Result<DMatrix<f64>, DynamicsError> {
        let mut jac = DMatrix::zeros(self.num_equalities(), self.num_variables());
        jac.view_mut((0, 0), (STATE_DIM, STATE_DIM))
            .fill_with_identity();

        for k in 0..self.horizon {
            let (a, b) = self
                .dynamics
                .jacobians(&Self::state_at(z, k), &self.control_at(z, k))?;
            let row = Self::state_offset(k + 1);

            jac.view_mut((row, Self::state_offset(k)), (STATE_DIM, STATE_DIM))
                .copy_from(&(-a));
            jac.view_mut((row, Self::state_offset(k + 1)), (STATE_DIM, STATE_DIM))
                .fill_with_identity();
            jac.view_mut((row, self.control_offset(k)), (STATE_DIM, CONTROL_DIM))
                .copy_from(&(-b));
        }
        Ok(jac)
    }

    fn lower_bounds(&self) -> DVector<f64> {
        let mut lb = DVector::from_element(self.num_variables(), f64::NEG_INFINITY);
        let start = self.control_offset(0);
        lb.rows_mut(start, self.horizon * CONTROL_DIM)
            .fill(-self.control_bound);
        lb
    }

    fn upper_bounds(&self) -> DVector<f64> {
        let mut ub = DVector::from_element(self.num_variables(), f64::INFINITY);
        let start = self.control_offset(0);
        ub.rows_mut(start, self.horizon * CONTROL_DIM)
            .fill(self.control_bound);
        ub
    }
}

// ---------------------------------------------------------------------------
// Finite differences
// ---------------------------------------------------------------------------

/// Symmetric central-difference Hessian of a scalar function.
fn central_hessian(
    w: &DVector<f64>,
    mut eval: impl FnMut(&DVector<f64>) -> Result<f64, DynamicsError>,
) -> Result<DMatrix<f64>, DynamicsError> {
    let n = w.len();
    let h = HESSIAN_FD_STEP;
    let f0 = eval(w)?;
    let mut hess = DMatrix::zeros(n, n);

    let mut shifted = |di: (usize, f64), dj: Option<(usize, f64)>| {
        let mut v = w.clone();
        v[di.0] += di.1;
        if let Some((j, s)) = dj {
            v[j] += s;
        }
        eval(&v)
    };

    for i in 0..n {
        let fp = shifted((i, h), None)?;
        let fm = shifted((i, -h), None)?;
        hess[(i, i)] = (fp - 2.0 * f0 + fm) / (h * h);

        for j in (i + 1)..n {
            let fpp = shifted((i, h), Some((j, h)))?;
            let fpm = shifted((i, h), Some((j, -h)))?;
            let fmp = shifted((i, -h), Some((j, h)))?;
            let fmm = shifted((i, -h), Some((j, -h)))?;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h * h);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }
    Ok(hess)
}
