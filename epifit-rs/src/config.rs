//! TOML configuration shared by the command line tools.
//!
//! Every field has a default, so an empty file is a valid configuration that
//! simulates the closed SIR example over 120 days.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    data::Observations,
    error::{ConfigError, Error, Result},
    fit::{Estimator, FitOptions},
    models::{CompartmentModel, InitialFractions, Model, RateParams},
    ode::{SolverOptions, TimeGrid},
    prelude::{Real, Time},
};

pub const DEFAULT_PATH: &str = "conf.toml";

/// Values of β and γ simulated by a parameter sweep.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub betas: Vec<Real>,
    pub gammas: Vec<Real>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: Model,
    /// Population size used to normalize case counts.
    pub population: Real,
    /// Initial fractions for simulations. Fits seed them from the first
    /// observation unless `seed_from_data` is false.
    pub initial: InitialFractions,
    pub seed_from_data: bool,
    pub t0: Time,
    /// Exclusive end of the simulation grid.
    pub tn: Time,
    pub step: Real,
    /// Simulation rates, also used as the initial guess of a fit.
    pub rates: RateParams,
    pub solver: SolverOptions,
    pub fit: FitOptions,
    /// Number of fits started from perturbed guesses.
    pub starts: usize,
    /// Relative perturbation of multi-start guesses.
    pub spread: Real,
    /// Seed of the random generator. Uses entropy if absent.
    pub seed: Option<u64>,
    /// CSV case series with `day` and `cases` columns.
    pub data: Option<PathBuf>,
    /// Output CSV path. Tools write to stdout if absent.
    pub output: Option<PathBuf>,
    pub sweep: Option<SweepConfig>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: Model::ClosedSIR,
            population: 763.0,
            initial: InitialFractions::seeded(1e-4),
            seed_from_data: true,
            t0: 0.0,
            tn: 120.0,
            step: 1.0,
            rates: RateParams::sir(1.65, 0.4545),
            solver: SolverOptions::default(),
            fit: FitOptions::default(),
            starts: 1,
            spread: 0.5,
            seed: None,
            data: None,
            output: None,
            sweep: None,
            verbose: false,
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl Config {
    /// Read and validate a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(target: "init", "reading configuration from {}", path.display());
        let data = fs::read_to_string(path)?;
        data.parse()
    }

    /// Read `path` if given. Otherwise read `conf.toml` from the working
    /// directory, falling back to the defaults when it does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Config::from_path(path),
            None if Path::new(DEFAULT_PATH).exists() => Config::from_path(DEFAULT_PATH),
            None => {
                info!("{} not found, using default configuration", DEFAULT_PATH);
                Ok(Config::default())
            }
        }
    }

    /// Check the values that do not depend on the data.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.population > 0.0 && self.population.is_finite()) {
            return Err(ConfigError::NonPositivePopulation(self.population));
        }
        if self.starts == 0 {
            return Err(ConfigError::InvalidOption {
                name: "starts",
                reason: "must be positive",
            });
        }
        if !(0.0..1.0).contains(&self.spread) {
            return Err(ConfigError::InvalidOption {
                name: "spread",
                reason: "must be in [0, 1)",
            });
        }
        self.model.validate()?;
        self.solver.validate()?;
        self.fit.validate()
    }

    /// Simulation grid `t0, t0 + step, ...` below `tn`.
    pub fn time_grid(&self) -> std::result::Result<TimeGrid, ConfigError> {
        TimeGrid::range(self.t0, self.tn, self.step)
    }

    /// Initial state vector of a simulation.
    pub fn initial_state(&self) -> std::result::Result<Vec<Real>, ConfigError> {
        self.model.initial_state(&self.initial)
    }

    /// Load the configured case series, if any.
    pub fn observations(&self) -> Result<Option<Observations>> {
        match &self.data {
            Some(path) => {
                let obs = Observations::from_path(path, self.population)?;
                info!("loaded {} observations from {}", obs.len(), path.display());
                Ok(Some(obs))
            }
            None => Ok(None),
        }
    }

    /// Initial fractions of a fit at the first observation time. When seeding
    /// from data, the first observed value is used for I (and for E on models
    /// with an Exposed compartment) and the rest is susceptible.
    pub fn fit_initial_fractions(&self, observations: &Observations) -> InitialFractions {
        if !self.seed_from_data {
            return self.initial;
        }
        let i0 = observations.first();
        match self.model.index_of("E") {
            Some(_) => InitialFractions::seeded_exposed(i0, i0),
            None => InitialFractions::seeded(i0),
        }
    }

    /// Estimator configured from the fit options, integrating with the same
    /// solver as simulations.
    pub fn estimator(&self) -> Estimator {
        Estimator::new(self.fit.with_solver(self.solver))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = "".parse().unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.time_grid().unwrap().len(), 120);
        let y0 = cfg.initial_state().unwrap();
        assert_eq!(y0.len(), 3);
        assert_approx_eq!(y0[0], 0.9999);
        assert_approx_eq!(y0[1], 0.0001);
    }

    #[test]
    fn parses_full_config() {
        let src = r#"
            population = 1000.0
            tn = 60.0
            step = 0.5
            starts = 3
            data = "data/boarding-school.csv"

            [model]
            kind = "DemographicSEIR"
            mu = 0.0000391

            [initial]
            s = 0.1
            e = 0.0001
            i = 0.0001
            r = 0.8998

            [rates]
            beta = 1.56
            gamma = 0.1428
            sigma = 0.071

            [solver]
            rtol = 1e-6
            method = { kind = "Rk4", dt = 0.1 }

            [fit]
            max_iter = 50

            [sweep]
            betas = [1.0, 1.5]
            gammas = [0.2]
        "#;
        let cfg: Config = src.parse().unwrap();
        assert_eq!(cfg.model, Model::DemographicSEIR { mu: 0.0000391 });
        assert_eq!(cfg.rates, RateParams::seir(1.56, 0.1428, 0.071));
        assert_eq!(cfg.solver.method(), crate::ode::Method::Rk4 { dt: 0.1 });
        assert_eq!(cfg.solver.rtol(), 1e-6);
        assert_eq!(cfg.fit.max_iter(), 50);
        assert_eq!(cfg.fit.ftol(), FitOptions::default().ftol());
        assert_eq!(cfg.time_grid().unwrap().len(), 120);
        assert_eq!(cfg.initial_state().unwrap().len(), 4);
        assert_eq!(cfg.sweep.unwrap().betas, vec![1.0, 1.5]);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let err = "population = -5.0".parse::<Config>().unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::NonPositivePopulation(_))
        ));
        let err = "population = \"many\"".parse::<Config>().unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
        let err = "[solver]\nrtol = -1.0".parse::<Config>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn estimator_uses_the_solver_section() {
        let src = r#"
            [solver]
            method = { kind = "Rk4", dt = 0.05 }

            [fit]
            max_iter = 20
        "#;
        let cfg: Config = src.parse().unwrap();
        let est = cfg.estimator();
        assert_eq!(est.options().solver(), cfg.solver);
        assert_eq!(est.options().solver().method(), crate::ode::Method::Rk4 { dt: 0.05 });
        assert_eq!(est.options().max_iter(), 20);
    }

    #[test]
    fn fit_seeds_initial_state_from_data() {
        let obs = Observations::new(vec![0.0, 1.0], vec![0.01, 0.02]).unwrap();
        let mut cfg = Config::default();
        assert_eq!(cfg.fit_initial_fractions(&obs), InitialFractions::seeded(0.01));
        cfg.model = Model::ClosedSEIR;
        assert_eq!(
            cfg.fit_initial_fractions(&obs),
            InitialFractions::seeded_exposed(0.01, 0.01)
        );
        cfg.seed_from_data = false;
        assert_eq!(cfg.fit_initial_fractions(&obs), cfg.initial);
    }
}
