pub use crate::config::Config;
pub use crate::data::{CaseRecord, Observations};
pub use crate::error::{ConfigError, Error, IntegrationError, Result};
pub use crate::fit::{Estimator, FitOptions, FitResult};
pub use crate::models::*;
pub use crate::ode::{
    integrate, integrate_with, simulate, sweep, Method, SolverOptions, SweepPoint, TimeGrid,
    Trajectory,
};
pub use crate::utils::{Stats, Summary};
pub use crate::{Real, Time};
pub(crate) use crate::{INF, NAN};
