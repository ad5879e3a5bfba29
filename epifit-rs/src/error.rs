//! Error types.
//!
//! Configuration problems are detected eagerly, before any numerical work.
//! Integration failures are recoverable: the estimator rejects the offending
//! candidate and carries on, while plain simulations hand them back to the
//! caller. Non-convergence of a fit is not an error and is reported by
//! [`FitResult::converged`](crate::fit::FitResult).

use crate::prelude::{Real, Time};
use thiserror::Error;

/// Malformed model, data or solver configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("initial fractions must sum to 1.0, got {0}")]
    FractionsNotNormalized(Real),

    #[error("initial fraction of compartment {name} is invalid: {value}")]
    InvalidFraction { name: &'static str, value: Real },

    #[error("model {model} has no {name} compartment, but its initial fraction is {value}")]
    MissingCompartment {
        model: &'static str,
        name: &'static str,
        value: Real,
    },

    #[error("population size must be positive, got {0}")]
    NonPositivePopulation(Real),

    #[error("model {model} expects {expected} rate parameters, got {got}")]
    ParamCount {
        model: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("rate parameter {name} must be finite, got {value}")]
    NonFiniteParam { name: &'static str, value: Real },

    #[error("model {model} requires rate parameter {name}")]
    MissingParam {
        model: &'static str,
        name: &'static str,
    },

    #[error("state has {got} compartments, model {model} has {expected}")]
    StateLength {
        model: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{got} observations cannot determine {params} free parameters")]
    TooFewObservations { got: usize, params: usize },

    #[error("time grid is empty")]
    EmptyTimeGrid,

    #[error("times must be finite and strictly increasing (t[{index}] = {time})")]
    UnorderedTimes { index: usize, time: Time },

    #[error("step size must be positive and finite, got {0}")]
    InvalidStep(Real),

    #[error("case count at day {day} is invalid: {cases}")]
    InvalidCases { day: Time, cases: Real },

    #[error("observations have {times} times but {values} values")]
    MismatchedObservations { times: usize, values: usize },

    #[error("invalid option {name}: {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },
}

/// The numerical solver could not produce a trajectory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("step size {step:e} fell below the minimum at t = {time}")]
    StepSizeUnderflow { time: Time, step: Real },

    #[error("step budget of {max_steps} exhausted at t = {time}")]
    MaxStepsExceeded { time: Time, max_steps: usize },

    #[error("state became non-finite at t = {time}")]
    NonFiniteState { time: Time },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("integration failure: {0}")]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for errors raised by configuration checks.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// True for errors raised by the numerical solver.
    pub fn is_integration(&self) -> bool {
        matches!(self, Error::Integration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
