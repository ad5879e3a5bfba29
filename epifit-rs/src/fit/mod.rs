//! Calibration of rate parameters against an observed infected series.
//!
//! The objective is the residual sum of squares between the Infected
//! compartment of the model and the observed fractions, minimized with
//! Levenberg–Marquardt over the free rate parameters of the model.

use getset::{CopyGetters, Getters};
use log::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

mod lm;

use crate::{
    data::Observations,
    error::{ConfigError, Result},
    models::{CompartmentModel, RateParams},
    ode::{self, SolverOptions, Trajectory},
    prelude::*,
    utils::sqr,
};

/// Options of the parameter estimator.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters, Serialize, Deserialize)]
#[getset(get_copy = "pub")]
#[serde(default)]
pub struct FitOptions {
    /// Maximum number of Levenberg–Marquardt iterations.
    max_iter: usize,
    /// Stop when an accepted step reduces the cost by less than this
    /// relative amount.
    ftol: Real,
    /// Stop when an accepted step is this small relative to the parameters.
    xtol: Real,
    /// Stop when every gradient component is below this value.
    gtol: Real,
    /// Initial damping.
    lambda0: Real,
    /// Relative step of the finite difference Jacobian.
    fd_step: Real,
    /// Reject candidates with a negative rate.
    non_negative: bool,
    /// Compartments below `-physical_eps` make a candidate unevaluable.
    physical_eps: Real,
    /// Solver used for every candidate. Configuration files set it through
    /// the top level `[solver]` table.
    #[serde(skip)]
    solver: SolverOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            max_iter: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            lambda0: 1e-3,
            fd_step: 1.49e-8,
            non_negative: true,
            physical_eps: 1e-9,
            solver: SolverOptions::default(),
        }
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    with_setters! {
        max_iter: usize,
        ftol: Real,
        xtol: Real,
        gtol: Real,
        lambda0: Real,
        fd_step: Real,
        non_negative: bool,
        physical_eps: Real,
        solver: SolverOptions,
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |name, reason| Err(ConfigError::InvalidOption { name, reason });
        let positive = |x: Real| x > 0.0 && x.is_finite();
        if self.max_iter == 0 {
            return invalid("max_iter", "must be positive");
        }
        for &(name, value) in &[
            ("ftol", self.ftol),
            ("xtol", self.xtol),
            ("lambda0", self.lambda0),
            ("fd_step", self.fd_step),
        ] {
            if !positive(value) {
                return invalid(name, "must be positive and finite");
            }
        }
        if !(self.gtol >= 0.0 && self.gtol.is_finite()) {
            return invalid("gtol", "must be non-negative and finite");
        }
        if !(self.physical_eps >= 0.0 && self.physical_eps.is_finite()) {
            return invalid("physical_eps", "must be non-negative and finite");
        }
        self.solver.validate()
    }
}

/// Outcome of a calibration. Non-convergence is reported here and is never
/// an error.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct FitResult {
    /// Best rate parameters found.
    #[getset(get = "pub")]
    params: RateParams,
    /// Same as `params`, in model order.
    #[getset(get = "pub")]
    values: Vec<Real>,
    /// Residual sum of squares at `params`. Infinite if no candidate could be
    /// evaluated.
    #[getset(get_copy = "pub")]
    residual: Real,
    #[getset(get_copy = "pub")]
    converged: bool,
    #[getset(get_copy = "pub")]
    iterations: usize,
    /// Number of objective evaluations, including the Jacobian.
    #[getset(get_copy = "pub")]
    evaluations: usize,
    /// Number of candidates that could not be evaluated.
    #[getset(get_copy = "pub")]
    rejected: usize,
    /// Basic reproduction number at `params`.
    #[getset(get_copy = "pub")]
    r0: Real,
    /// Statistics of the pointwise residuals (model minus observed).
    #[getset(get = "pub")]
    residuals: Summary,
    /// Model trajectory on the observation times at `params`.
    #[getset(get = "pub")]
    trajectory: Option<Trajectory>,
}

impl FitResult {
    /// Root mean square of the residuals.
    pub fn rms(&self) -> Real {
        self.residuals.rms()
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "params:      {}", self.params)?;
        writeln!(f, "R0:          {:.4}", self.r0)?;
        writeln!(f, "RSS:         {:.6e}", self.residual)?;
        writeln!(f, "converged:   {}", self.converged)?;
        writeln!(
            f,
            "iterations:  {} ({} evaluations, {} rejected)",
            self.iterations, self.evaluations, self.rejected
        )?;
        if self.residuals.size() > 0 {
            write!(
                f,
                "residuals:   rms={:.4e}, max|r|={:.4e}",
                self.residuals.rms(),
                self.residuals.max_abs()
            )?;
        }
        Ok(())
    }
}

/// Least squares estimator of rate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Estimator {
    options: FitOptions,
}

impl Estimator {
    pub fn new(options: FitOptions) -> Self {
        Estimator { options }
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Eager checks shared by every entry point.
    fn check<M: CompartmentModel + ?Sized>(
        &self,
        model: &M,
        initial_state: &[Real],
        observations: &Observations,
    ) -> std::result::Result<(), ConfigError> {
        self.options.validate()?;
        if observations.len() < model.n_params() {
            return Err(ConfigError::TooFewObservations {
                got: observations.len(),
                params: model.n_params(),
            });
        }
        model.check_state(initial_state)
    }

    /// Pointwise residuals at `params`, or `None` if the candidate cannot be
    /// evaluated.
    fn residuals<M: CompartmentModel + ?Sized>(
        &self,
        model: &M,
        initial_state: &[Real],
        observations: &Observations,
        params: &[Real],
    ) -> Option<Vec<Real>> {
        if self.options.non_negative && params.iter().any(|&p| p < 0.0) {
            trace!(target: "fit", "rejected negative candidate {:?}", params);
            return None;
        }
        let solved = ode::solve(
            model,
            initial_state,
            params,
            observations.grid(),
            &self.options.solver,
        );
        let tr = match solved {
            Ok(tr) => tr,
            Err(err) => {
                debug!(target: "fit", "rejected candidate {:?}: {}", params, err);
                return None;
            }
        };
        if !tr.is_physical(self.options.physical_eps) {
            debug!(target: "fit", "rejected unphysical candidate {:?}", params);
            return None;
        }
        let res = tr
            .infected()
            .iter()
            .zip(observations.infected())
            .map(|(m, o)| m - o)
            .collect();
        return Some(res);
    }

    /// Fit the free rate parameters of `model` to `observations`.
    ///
    /// `initial_state` holds the compartment fractions at the first
    /// observation time. Fixed model configuration (such as μ) is not fitted.
    pub fn fit<M: CompartmentModel + ?Sized>(
        &self,
        model: &M,
        initial_state: &[Real],
        observations: &Observations,
        guess: &RateParams,
    ) -> Result<FitResult> {
        self.check(model, initial_state, observations)?;
        let x0 = model.rates_to_vec(guess)?;
        info!(
            target: "fit",
            "fitting {} to {} observations from {}",
            model.name(),
            observations.len(),
            guess
        );

        let out = lm::levenberg_marquardt(
            |p| self.residuals(model, initial_state, observations, p),
            &x0,
            &self.options,
        );

        let (params, r0, trajectory) = if out.cost.is_finite() {
            let tr = ode::solve(
                model,
                initial_state,
                &out.x,
                observations.grid(),
                &self.options.solver,
            )
            .ok();
            (
                model.rates_from_slice(&out.x),
                model.basic_reproduction_number(&out.x),
                tr,
            )
        } else {
            (*guess, model.basic_reproduction_number(&x0), None)
        };

        info!(
            target: "fit",
            "{} fit: {} (RSS = {:.6e}, converged = {})",
            model.name(),
            params,
            out.cost,
            out.converged
        );

        Ok(FitResult {
            params,
            values: out.x,
            residual: out.cost,
            converged: out.converged,
            iterations: out.iterations,
            evaluations: out.evaluations,
            rejected: out.rejected,
            r0,
            residuals: Summary::from_values(out.residuals),
            trajectory,
        })
    }

    /// Residual sum of squares of the model at `rates`. Unlike fit(),
    /// integration failures are returned to the caller.
    pub fn residual_sum_of_squares<M: CompartmentModel + ?Sized>(
        &self,
        model: &M,
        initial_state: &[Real],
        observations: &Observations,
        rates: &RateParams,
    ) -> Result<Real> {
        self.check(model, initial_state, observations)?;
        let params = model.rates_to_vec(rates)?;
        let tr = ode::solve(
            model,
            initial_state,
            &params,
            observations.grid(),
            &self.options.solver,
        )?;
        let rss = tr
            .infected()
            .iter()
            .zip(observations.infected())
            .map(|(m, o)| sqr(m - o))
            .sum();
        Ok(rss)
    }

    /// Run fit() from `guess` and from `starts - 1` random perturbations of
    /// it, keeping the result with the lowest residual. Each rate is scaled by
    /// a uniform factor in `[1 - spread, 1 + spread]`.
    pub fn fit_multistart<M: CompartmentModel + ?Sized, R: Rng>(
        &self,
        model: &M,
        initial_state: &[Real],
        observations: &Observations,
        guess: &RateParams,
        starts: usize,
        spread: Real,
        rng: &mut R,
    ) -> Result<FitResult> {
        if starts == 0 {
            return Err(ConfigError::InvalidOption {
                name: "starts",
                reason: "must be positive",
            }
            .into());
        }
        if !(0.0..1.0).contains(&spread) {
            return Err(ConfigError::InvalidOption {
                name: "spread",
                reason: "must be in [0, 1)",
            }
            .into());
        }
        let x0 = model.rates_to_vec(guess)?;
        let mut best = self.fit(model, initial_state, observations, guess)?;

        for k in 1..starts {
            let x: Vec<Real> = x0
                .iter()
                .map(|&p| p * (1.0 + rng.gen_range(-spread..=spread)))
                .collect();
            let start = model.rates_from_slice(&x);
            let res = self.fit(model, initial_state, observations, &start)?;
            debug!(
                target: "fit",
                "start {}/{}: {} -> RSS = {:.6e}",
                k + 1,
                starts,
                start,
                res.residual
            );
            if res.residual < best.residual {
                best = res;
            }
        }
        Ok(best)
    }
}
