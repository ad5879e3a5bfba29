use log::*;

mod grid;
mod solver;
mod trajectory;
pub use grid::*;
pub use solver::{Method, SolverOptions};
pub use trajectory::*;

use crate::{
    error::{ConfigError, IntegrationError, Result},
    models::{CompartmentModel, InitialFractions, RateParams},
    prelude::Real,
};

pub(crate) use solver::solve;

/// Integrate `model` from `initial_state` at the first grid time, sampling the
/// state at every grid point. Uses the default solver options.
pub fn integrate<M: CompartmentModel + ?Sized>(
    model: &M,
    initial_state: &[Real],
    params: &[Real],
    grid: &TimeGrid,
) -> Result<Trajectory> {
    integrate_with(model, initial_state, params, grid, &SolverOptions::default())
}

/// Like integrate(), with explicit solver options.
///
/// The state may hold fractions or counts; it only needs the right length
/// and finite entries. Solver failures are returned as
/// [`Error::Integration`](crate::Error::Integration).
pub fn integrate_with<M: CompartmentModel + ?Sized>(
    model: &M,
    initial_state: &[Real],
    params: &[Real],
    grid: &TimeGrid,
    options: &SolverOptions,
) -> Result<Trajectory> {
    options.validate()?;
    model.check_params(params)?;
    check_state_shape(model, initial_state)?;
    Ok(solve(model, initial_state, params, grid, options)?)
}

/// Simulate a model from named initial fractions and rate parameters.
///
/// This is the simulate-only entry point: every configuration problem and any
/// integration failure is returned to the caller.
pub fn simulate<M: CompartmentModel + ?Sized>(
    model: &M,
    initial: &InitialFractions,
    rates: &RateParams,
    grid: &TimeGrid,
    options: &SolverOptions,
) -> Result<Trajectory> {
    let y0 = model.initial_state(initial)?;
    let params = model.rates_to_vec(rates)?;
    info!(
        "simulating {} with {} over [{}, {}] (R0 = {:.3})",
        model.name(),
        rates,
        grid.start(),
        grid.end(),
        model.basic_reproduction_number(&params)
    );
    integrate_with(model, &y0, &params, grid, options)
}

/// Result of a single combination of a parameter sweep.
#[derive(Debug, Clone)]
pub struct SweepPoint {
    pub rates: RateParams,
    pub trajectory: std::result::Result<Trajectory, IntegrationError>,
}

/// Simulate every combination of the given β and γ values, keeping the other
/// rates of `base` fixed. Combinations are run sequentially in row-major
/// order (β outer, γ inner). A failing combination does not stop the sweep.
pub fn sweep<M: CompartmentModel + ?Sized>(
    model: &M,
    initial: &InitialFractions,
    base: &RateParams,
    betas: &[Real],
    gammas: &[Real],
    grid: &TimeGrid,
    options: &SolverOptions,
) -> Result<Vec<SweepPoint>> {
    options.validate()?;
    let y0 = model.initial_state(initial)?;
    let mut points = Vec::with_capacity(betas.len() * gammas.len());

    for &beta in betas {
        for &gamma in gammas {
            let rates = RateParams {
                beta,
                gamma,
                ..*base
            };
            let params = model.rates_to_vec(&rates)?;
            let trajectory = solve(model, &y0, &params, grid, options);
            if let Err(err) = &trajectory {
                warn!("sweep: {} failed: {}", rates, err);
            }
            points.push(SweepPoint { rates, trajectory });
        }
    }
    Ok(points)
}

fn check_state_shape<M: CompartmentModel + ?Sized>(
    model: &M,
    state: &[Real],
) -> std::result::Result<(), ConfigError> {
    if state.len() != model.dimension() {
        return Err(ConfigError::StateLength {
            model: model.name(),
            expected: model.dimension(),
            got: state.len(),
        });
    }
    for (&name, &value) in model.compartments().iter().zip(state) {
        if !value.is_finite() {
            return Err(ConfigError::InvalidFraction { name, value });
        }
    }
    Ok(())
}
