#[macro_use]
mod macros;

pub mod config;
pub mod data;
pub mod error;
pub mod fit;
pub mod models;
pub mod ode;
pub mod prelude;
pub mod utils;
pub use crate::error::{ConfigError, Error, IntegrationError, Result};

/// Basic representation of time. This crate usually assumes time is measured
/// in days.
pub type Time = f64;

/// Base Real type used by this crate. Uses an alias to easily change precision
/// if necessary.
pub type Real = f64;
pub(crate) const INF: Real = Real::INFINITY;
pub(crate) const NAN: Real = Real::NAN;
