use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    prelude::{Real, Time},
};

pub mod seir;
pub mod sir;
pub use seir::*;
pub use sir::*;

/// Tolerance used when checking that compartment fractions add up to one.
pub const NORMALIZATION_TOL: Real = 1e-6;

/// Basic trait for deterministic compartmental models. A model owns a fixed,
/// ordered list of compartments and maps a state vector, a slice of free rate
/// parameters and the current time to the rate of change of each compartment.
///
/// Models are pure: they hold only fixed configuration (e.g., the vital rate of
/// demographic variants) and never mutate anything while computing derivatives.
pub trait CompartmentModel {
    /// Short human readable name of the model.
    fn name(&self) -> &'static str;

    /// Labels of each compartment, in state vector order.
    fn compartments(&self) -> &'static [&'static str];

    /// Names of the free rate parameters, in the order expected by
    /// derivative_into().
    fn param_names(&self) -> &'static [&'static str];

    /// Position of the Infected compartment in the state vector.
    fn infected_index(&self) -> usize;

    /// Write dy/dt into `out`. Both `state` and `out` have length
    /// `self.dimension()` and `params` has length `self.n_params()`.
    ///
    /// All current models are autonomous and ignore `t`.
    fn derivative_into(&self, state: &[Real], params: &[Real], t: Time, out: &mut [Real]);

    /// Basic reproduction number for the given rate parameters.
    fn basic_reproduction_number(&self, params: &[Real]) -> Real;

    /// Number of compartments.
    fn dimension(&self) -> usize {
        self.compartments().len()
    }

    /// Number of free rate parameters.
    fn n_params(&self) -> usize {
        self.param_names().len()
    }

    /// Allocating version of derivative_into().
    fn derivative(&self, state: &[Real], params: &[Real], t: Time) -> Vec<Real> {
        let mut out = vec![0.0; state.len()];
        self.derivative_into(state, params, t, &mut out);
        return out;
    }

    /// Comma separated compartment labels.
    fn csv_header(&self) -> String {
        self.compartments().join(",")
    }

    /// Position of the compartment with the given label.
    fn index_of(&self, label: &str) -> Option<usize> {
        self.compartments().iter().position(|c| *c == label)
    }

    /// Check parameter count and finiteness.
    fn check_params(&self, params: &[Real]) -> Result<(), ConfigError> {
        if params.len() != self.n_params() {
            return Err(ConfigError::ParamCount {
                model: self.name(),
                expected: self.n_params(),
                got: params.len(),
            });
        }
        for (&name, &value) in self.param_names().iter().zip(params) {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteParam { name, value });
            }
        }
        Ok(())
    }

    /// Check that a state vector is a valid set of population fractions:
    /// correct length, non-negative and summing to one.
    fn check_state(&self, state: &[Real]) -> Result<(), ConfigError> {
        if state.len() != self.dimension() {
            return Err(ConfigError::StateLength {
                model: self.name(),
                expected: self.dimension(),
                got: state.len(),
            });
        }
        for (&name, &value) in self.compartments().iter().zip(state) {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }
        let total: Real = state.iter().sum();
        if (total - 1.0).abs() > NORMALIZATION_TOL {
            return Err(ConfigError::FractionsNotNormalized(total));
        }
        Ok(())
    }

    /// Build the initial state vector from named fractions.
    fn initial_state(&self, fractions: &InitialFractions) -> Result<Vec<Real>, ConfigError> {
        let mut state = Vec::with_capacity(self.dimension());
        for (label, value) in fractions.named() {
            if self.index_of(label).is_some() {
                state.push(value);
            } else if value != 0.0 {
                return Err(ConfigError::MissingCompartment {
                    model: self.name(),
                    name: label,
                    value,
                });
            }
        }
        self.check_state(&state)?;
        return Ok(state);
    }

    /// Extract the free parameters of this model from a named parameter set.
    fn rates_to_vec(&self, rates: &RateParams) -> Result<Vec<Real>, ConfigError> {
        let mut out = Vec::with_capacity(self.n_params());
        for &name in self.param_names() {
            match rates.get(name) {
                Some(value) => out.push(value),
                None => {
                    return Err(ConfigError::MissingParam {
                        model: self.name(),
                        name,
                    })
                }
            }
        }
        self.check_params(&out)?;
        return Ok(out);
    }

    /// Inverse of rates_to_vec(). Missing trailing values are left unset.
    fn rates_from_slice(&self, params: &[Real]) -> RateParams {
        let mut rates = RateParams::default();
        for (name, &value) in self.param_names().iter().zip(params) {
            rates.set(name, value);
        }
        return rates;
    }
}

/// Named rate parameters. σ is only meaningful for models with an Exposed
/// compartment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateParams {
    /// Transmission rate.
    pub beta: Real,
    /// Recovery rate: inverse of the mean infectious period.
    pub gamma: Real,
    /// Progression rate from Exposed to Infected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<Real>,
}

impl RateParams {
    pub fn sir(beta: Real, gamma: Real) -> Self {
        RateParams {
            beta,
            gamma,
            sigma: None,
        }
    }

    pub fn seir(beta: Real, gamma: Real, sigma: Real) -> Self {
        RateParams {
            beta,
            gamma,
            sigma: Some(sigma),
        }
    }

    /// Get parameter by name.
    pub fn get(&self, name: &str) -> Option<Real> {
        match name {
            "beta" => Some(self.beta),
            "gamma" => Some(self.gamma),
            "sigma" => self.sigma,
            _ => None,
        }
    }

    /// Set parameter by name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: Real) {
        match name {
            "beta" => self.beta = value,
            "gamma" => self.gamma = value,
            "sigma" => self.sigma = Some(value),
            _ => (),
        }
    }
}

impl fmt::Display for RateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "beta={:.6}, gamma={:.6}", self.beta, self.gamma)?;
        if let Some(sigma) = self.sigma {
            write!(f, ", sigma={:.6}", sigma)?;
        }
        Ok(())
    }
}

/// Initial population fractions of each compartment.
///
/// Compartments absent from a model must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialFractions {
    pub s: Real,
    pub e: Real,
    pub i: Real,
    pub r: Real,
}

impl InitialFractions {
    pub fn new(s: Real, e: Real, i: Real, r: Real) -> Self {
        InitialFractions { s, e, i, r }
    }

    /// A fully susceptible population seeded with a fraction `i` of
    /// infectious individuals.
    pub fn seeded(i: Real) -> Self {
        InitialFractions {
            s: 1.0 - i,
            e: 0.0,
            i,
            r: 0.0,
        }
    }

    /// A population seeded with both exposed and infectious individuals.
    pub fn seeded_exposed(e: Real, i: Real) -> Self {
        InitialFractions {
            s: 1.0 - e - i,
            e,
            i,
            r: 0.0,
        }
    }

    fn named(&self) -> [(&'static str, Real); 4] {
        [("S", self.s), ("E", self.e), ("I", self.i), ("R", self.r)]
    }
}

impl Default for InitialFractions {
    fn default() -> Self {
        InitialFractions::seeded(1e-4)
    }
}

/// The four supported model variants as a single configuration value.
///
/// Each variant dispatches to its own model type, so a `Model` can be used
/// anywhere a `CompartmentModel` is expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Model {
    ClosedSIR,
    DemographicSIR { mu: Real },
    ClosedSEIR,
    DemographicSEIR { mu: Real },
}

impl Default for Model {
    fn default() -> Self {
        Model::ClosedSIR
    }
}

/// Forward a method call to the concrete model of each variant.
macro_rules! dispatch {
    ($self:ident, $m:ident => $expr:expr) => {
        match *$self {
            Model::ClosedSIR => {
                let $m = ClosedSir;
                $expr
            }
            Model::DemographicSIR { mu } => {
                let $m = DemographicSir::new(mu);
                $expr
            }
            Model::ClosedSEIR => {
                let $m = ClosedSeir;
                $expr
            }
            Model::DemographicSEIR { mu } => {
                let $m = DemographicSeir::new(mu);
                $expr
            }
        }
    };
}

impl Model {
    /// Vital rate of demographic variants.
    pub fn mu(&self) -> Option<Real> {
        match *self {
            Model::DemographicSIR { mu } | Model::DemographicSEIR { mu } => Some(mu),
            _ => None,
        }
    }

    /// Check the fixed configuration of the variant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mu() {
            Some(mu) if !mu.is_finite() => Err(ConfigError::NonFiniteParam {
                name: "mu",
                value: mu,
            }),
            _ => Ok(()),
        }
    }
}

impl CompartmentModel for Model {
    fn name(&self) -> &'static str {
        dispatch!(self, m => m.name())
    }

    fn compartments(&self) -> &'static [&'static str] {
        dispatch!(self, m => m.compartments())
    }

    fn param_names(&self) -> &'static [&'static str] {
        dispatch!(self, m => m.param_names())
    }

    fn infected_index(&self) -> usize {
        dispatch!(self, m => m.infected_index())
    }

    fn derivative_into(&self, state: &[Real], params: &[Real], t: Time, out: &mut [Real]) {
        dispatch!(self, m => m.derivative_into(state, params, t, out))
    }

    fn basic_reproduction_number(&self, params: &[Real]) -> Real {
        dispatch!(self, m => m.basic_reproduction_number(params))
    }

    fn check_params(&self, params: &[Real]) -> Result<(), ConfigError> {
        self.validate()?;
        dispatch!(self, m => m.check_params(params))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn model_dispatches_to_variants() {
        let models = [
            Model::ClosedSIR,
            Model::DemographicSIR { mu: 0.01 },
            Model::ClosedSEIR,
            Model::DemographicSEIR { mu: 0.01 },
        ];
        let dims: Vec<_> = models.iter().map(|m| m.dimension()).collect();
        let params: Vec<_> = models.iter().map(|m| m.n_params()).collect();
        let infected: Vec<_> = models.iter().map(|m| m.infected_index()).collect();
        assert_eq!(dims, vec![3, 3, 4, 4]);
        assert_eq!(params, vec![2, 2, 3, 3]);
        assert_eq!(infected, vec![1, 1, 2, 2]);
        assert_eq!(models[2].csv_header(), "S,E,I,R");
    }

    #[test]
    fn initial_state_is_validated() {
        let sir = Model::ClosedSIR;
        let seir = Model::ClosedSEIR;
        let y0 = sir.initial_state(&InitialFractions::seeded(0.01)).unwrap();
        assert_eq!(y0.len(), 3);
        assert_approx_eq!(y0[0], 0.99);
        assert_approx_eq!(y0[1], 0.01);

        let y0 = seir
            .initial_state(&InitialFractions::seeded_exposed(0.01, 0.02))
            .unwrap();
        assert_eq!(y0.len(), 4);
        assert_approx_eq!(y0[0], 0.97);
        assert_approx_eq!(y0[1], 0.01);
        assert_approx_eq!(y0[2], 0.02);

        let unnormalized = InitialFractions::new(0.5, 0.0, 0.1, 0.0);
        assert!(matches!(
            sir.initial_state(&unnormalized),
            Err(ConfigError::FractionsNotNormalized(_))
        ));

        let exposed = InitialFractions::seeded_exposed(0.01, 0.01);
        assert!(matches!(
            sir.initial_state(&exposed),
            Err(ConfigError::MissingCompartment { name: "E", .. })
        ));

        let negative = InitialFractions::new(1.1, 0.0, -0.1, 0.0);
        assert!(matches!(
            sir.initial_state(&negative),
            Err(ConfigError::InvalidFraction { name: "I", .. })
        ));
    }

    #[test]
    fn rate_params_round_trip_through_models() {
        let seir = Model::ClosedSEIR;
        let rates = RateParams::seir(1.0, 0.5, 0.2);
        let v = seir.rates_to_vec(&rates).unwrap();
        assert_eq!(v, vec![1.0, 0.5, 0.2]);
        assert_eq!(seir.rates_from_slice(&v), rates);

        let missing = seir.rates_to_vec(&RateParams::sir(1.0, 0.5));
        assert!(matches!(
            missing,
            Err(ConfigError::MissingParam { name: "sigma", .. })
        ));

        // Extra sigma is simply ignored by SIR models
        assert_eq!(Model::ClosedSIR.rates_to_vec(&rates).unwrap(), vec![1.0, 0.5]);
    }

    #[test]
    fn params_are_checked() {
        let sir = Model::ClosedSIR;
        assert!(sir.check_params(&[1.0, 0.5]).is_ok());
        assert!(matches!(
            sir.check_params(&[1.0, 0.5, 0.1]),
            Err(ConfigError::ParamCount {
                expected: 2,
                got: 3,
                ..
            })
        ));
        assert!(matches!(
            sir.check_params(&[Real::NAN, 0.5]),
            Err(ConfigError::NonFiniteParam { name: "beta", .. })
        ));
        let bad_mu = Model::DemographicSIR { mu: Real::INFINITY };
        assert!(bad_mu.check_params(&[1.0, 0.5]).is_err());
    }

    #[test]
    fn model_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            model: Model,
        }
        let w: Wrapper =
            toml::from_str("[model]\nkind = \"DemographicSEIR\"\nmu = 0.001\n").unwrap();
        assert_eq!(w.model, Model::DemographicSEIR { mu: 0.001 });
        let w: Wrapper = toml::from_str("[model]\nkind = \"ClosedSIR\"\n").unwrap();
        assert_eq!(w.model, Model::ClosedSIR);
    }
}
