//! Explicit Runge–Kutta steppers.
//!
//! Two methods are available: an adaptive Dormand–Prince 5(4) pair with
//! error control (the default) and classical fixed-step RK4. Both land exactly
//! on every requested output time by shortening the last step before it.

use getset::CopyGetters;
use log::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{TimeGrid, Trajectory};
use crate::{
    error::{ConfigError, IntegrationError},
    models::CompartmentModel,
    prelude::{Real, Time},
};

/// Integration method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Method {
    /// Adaptive Dormand–Prince 5(4) embedded pair.
    Dopri5,
    /// Classical RK4 with a fixed step `dt`.
    Rk4 { dt: Real },
}

impl Default for Method {
    fn default() -> Self {
        Method::Dopri5
    }
}

/// Accuracy and budget options for the integrator.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters, Serialize, Deserialize)]
#[getset(get_copy = "pub")]
#[serde(default)]
pub struct SolverOptions {
    method: Method,
    /// Relative tolerance of the adaptive method.
    rtol: Real,
    /// Absolute tolerance of the adaptive method.
    atol: Real,
    /// Initial step of the adaptive method. Defaults to 1% of the time span.
    first_step: Option<Real>,
    /// Upper bound of the adaptive step.
    max_step: Real,
    /// Steps smaller than this are reported as failures.
    min_step: Real,
    /// Budget of accepted plus rejected steps over the whole grid.
    max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            method: Method::Dopri5,
            rtol: 1e-8,
            atol: 1e-10,
            first_step: None,
            max_step: Real::INFINITY,
            min_step: 1e-12,
            max_steps: 100_000,
        }
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    with_setters! {
        method: Method,
        rtol: Real,
        atol: Real,
        first_step: Option<Real>,
        max_step: Real,
        min_step: Real,
        max_steps: usize,
    }

    /// Check that tolerances, step bounds and budgets make sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name, reason| Err(ConfigError::InvalidOption { name, reason });
        if !(self.rtol > 0.0 && self.rtol.is_finite()) {
            return invalid("rtol", "must be positive and finite");
        }
        if !(self.atol >= 0.0 && self.atol.is_finite()) {
            return invalid("atol", "must be non-negative and finite");
        }
        if !(self.min_step > 0.0 && self.min_step.is_finite()) {
            return invalid("min_step", "must be positive and finite");
        }
        if !(self.max_step >= self.min_step) {
            return invalid("max_step", "must not be smaller than min_step");
        }
        if let Some(h) = self.first_step {
            if !(h > 0.0 && h.is_finite()) {
                return invalid("first_step", "must be positive and finite");
            }
        }
        if self.max_steps == 0 {
            return invalid("max_steps", "must be positive");
        }
        if let Method::Rk4 { dt } = self.method {
            if !(dt > 0.0 && dt.is_finite()) {
                return invalid("dt", "must be positive and finite");
            }
        }
        Ok(())
    }
}

// Dormand–Prince 5(4) tableau
const C: [Real; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[Real; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];
/// Difference between the 5th and 4th order weights.
const E: [Real; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

const SAFETY: Real = 0.9;
const MIN_FACTOR: Real = 0.2;
const MAX_FACTOR: Real = 5.0;

/// Preallocated buffers for the stage derivatives, so stepping never
/// allocates.
struct Workspace {
    k: [Vec<Real>; 7],
    ytmp: Vec<Real>,
    ynew: Vec<Real>,
}

impl Workspace {
    fn new(n: usize) -> Self {
        Workspace {
            k: [
                vec![0.0; n],
                vec![0.0; n],
                vec![0.0; n],
                vec![0.0; n],
                vec![0.0; n],
                vec![0.0; n],
                vec![0.0; n],
            ],
            ytmp: vec![0.0; n],
            ynew: vec![0.0; n],
        }
    }
}

/// Shared state of a single integration run.
struct Stepper<'a, M: ?Sized> {
    model: &'a M,
    params: &'a [Real],
    opts: &'a SolverOptions,
    ws: Workspace,
    t: Time,
    y: Vec<Real>,
    steps: usize,
}

impl<'a, M: CompartmentModel + ?Sized> Stepper<'a, M> {
    fn eval(&self, t: Time, y: &[Real], out: &mut [Real]) {
        self.model.derivative_into(y, self.params, t, out);
    }

    fn count_step(&mut self) -> Result<(), IntegrationError> {
        if self.steps >= self.opts.max_steps {
            return Err(IntegrationError::MaxStepsExceeded {
                time: self.t,
                max_steps: self.opts.max_steps,
            });
        }
        self.steps += 1;
        Ok(())
    }

    /// Evaluate all seven stages for a step of size h from (t, y). Stage 0
    /// must already hold f(t, y). Returns the scaled RMS error estimate.
    fn dopri_stages(&mut self, h: Real) -> Real {
        let n = self.y.len();
        for s in 1..7 {
            for j in 0..n {
                let mut acc = 0.0;
                for m in 0..s {
                    acc += A[s][m] * self.ws.k[m][j];
                }
                self.ws.ytmp[j] = self.y[j] + h * acc;
            }
            let ts = self.t + C[s] * h;
            self.model
                .derivative_into(&self.ws.ytmp, self.params, ts, &mut self.ws.k[s]);
        }

        // Stage 6 is evaluated at the 5th order solution (FSAL)
        self.ws.ynew.copy_from_slice(&self.ws.ytmp);

        let mut err = 0.0;
        for j in 0..n {
            let mut e = 0.0;
            for m in 0..7 {
                e += E[m] * self.ws.k[m][j];
            }
            let magnitude = self.y[j].abs().max(self.ws.ynew[j].abs());
            let scale = self.opts.atol + self.opts.rtol * magnitude;
            let ratio = if scale > 0.0 { h * e / scale } else { 0.0 };
            err += ratio * ratio;
        }
        let err = (err / n.max(1) as Real).sqrt();
        if self.ws.ynew.iter().all(|v| v.is_finite()) && err.is_finite() {
            err
        } else {
            Real::INFINITY
        }
    }

    /// Advance from the current time to `target` with the adaptive method.
    /// `h` carries the proposed step between calls.
    fn dopri_advance(&mut self, target: Time, h: &mut Real) -> Result<(), IntegrationError> {
        while self.t < target {
            self.count_step()?;
            let remaining = target - self.t;
            let lands = *h >= remaining;
            let h_try = if lands { remaining } else { *h };
            let err = self.dopri_stages(h_try);

            if err <= 1.0 {
                self.t = if lands { target } else { self.t + h_try };
                std::mem::swap(&mut self.y, &mut self.ws.ynew);
                self.ws.k.swap(0, 6);

                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).max(MIN_FACTOR).min(MAX_FACTOR)
                };
                let next = h_try * factor;
                *h = if lands { h.max(next) } else { next };
                *h = h.min(self.opts.max_step);
            } else {
                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-0.2)).max(MIN_FACTOR)
                } else {
                    MIN_FACTOR
                };
                *h = h_try * factor;
                trace!(
                    target: "ode",
                    "rejected step at t={}: err={:.3e}, next h={:.3e}",
                    self.t,
                    err,
                    h
                );
                if *h < self.opts.min_step {
                    return Err(IntegrationError::StepSizeUnderflow {
                        time: self.t,
                        step: *h,
                    });
                }
            }
        }
        Ok(())
    }

    /// Advance from the current time to `target` with fixed RK4 steps no
    /// larger than `dt`.
    fn rk4_advance(&mut self, target: Time, dt: Real) -> Result<(), IntegrationError> {
        let span = target - self.t;
        let n_steps = ((span / dt) - 1e-9).ceil().max(1.0) as usize;
        let h = span / n_steps as Real;
        let n = self.y.len();

        for i in 0..n_steps {
            self.count_step()?;
            let t = self.t;
            let [k1, k2, k3, k4, _, _, _] = &mut self.ws.k;
            let ytmp = &mut self.ws.ytmp;

            self.model.derivative_into(&self.y, self.params, t, k1);
            for j in 0..n {
                ytmp[j] = self.y[j] + 0.5 * h * k1[j];
            }
            self.model.derivative_into(&ytmp[..], self.params, t + 0.5 * h, k2);
            for j in 0..n {
                ytmp[j] = self.y[j] + 0.5 * h * k2[j];
            }
            self.model.derivative_into(&ytmp[..], self.params, t + 0.5 * h, k3);
            for j in 0..n {
                ytmp[j] = self.y[j] + h * k3[j];
            }
            self.model.derivative_into(&ytmp[..], self.params, t + h, k4);
            for j in 0..n {
                self.y[j] += (h / 6.0) * (k1[j] + 2.0 * k2[j] + 2.0 * k3[j] + k4[j]);
            }

            self.t = if i + 1 == n_steps { target } else { t + h };
            if !self.y.iter().all(|v| v.is_finite()) {
                return Err(IntegrationError::NonFiniteState { time: self.t });
            }
        }
        Ok(())
    }
}

/// Integrate a model over a time grid, assuming already validated inputs.
///
/// The initial state is taken at the first grid time and is copied unchanged
/// as the first row of the trajectory.
pub(crate) fn solve<M: CompartmentModel + ?Sized>(
    model: &M,
    y0: &[Real],
    params: &[Real],
    grid: &TimeGrid,
    opts: &SolverOptions,
) -> Result<Trajectory, IntegrationError> {
    let n = y0.len();
    let times = grid.times();
    let mut states = Array2::zeros((times.len(), n));
    states.row_mut(0).iter_mut().zip(y0).for_each(|(s, &v)| *s = v);

    let mut stepper = Stepper {
        model,
        params,
        opts,
        ws: Workspace::new(n),
        t: grid.start(),
        y: y0.to_vec(),
        steps: 0,
    };

    let mut h = opts
        .first_step
        .unwrap_or(1e-2 * (grid.end() - grid.start()))
        .min(opts.max_step)
        .max(opts.min_step);

    if opts.method == Method::Dopri5 && times.len() > 1 {
        let mut k0 = vec![0.0; n];
        stepper.eval(stepper.t, &stepper.y, &mut k0);
        if !k0.iter().all(|v| v.is_finite()) {
            return Err(IntegrationError::NonFiniteState { time: stepper.t });
        }
        stepper.ws.k[0] = k0;
    }

    for (row, &target) in times.iter().enumerate().skip(1) {
        match opts.method {
            Method::Dopri5 => stepper.dopri_advance(target, &mut h)?,
            Method::Rk4 { dt } => stepper.rk4_advance(target, dt)?,
        }
        states
            .row_mut(row)
            .iter_mut()
            .zip(&stepper.y)
            .for_each(|(s, &v)| *s = v);
    }

    debug!(
        target: "ode",
        "{}: integrated {} points in {} steps",
        model.name(),
        times.len(),
        stepper.steps
    );

    Ok(Trajectory::new(
        times.to_vec(),
        states,
        model.compartments(),
        model.infected_index(),
        stepper.steps,
    ))
}
