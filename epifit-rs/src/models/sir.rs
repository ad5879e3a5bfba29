use super::CompartmentModel;
use crate::prelude::{Real, Time};

/// Classical closed SIR model: no births or deaths, so S + I + R is conserved.
///
/// ```text
/// dS/dt = -β S I
/// dI/dt =  β S I - γ I
/// dR/dt =  γ I
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClosedSir;

impl CompartmentModel for ClosedSir {
    model_meta! {
        name: "ClosedSIR",
        compartments: ["S", "I", "R"],
        params: ["beta", "gamma"],
        infected: 1,
    }

    fn derivative_into(&self, y: &[Real], p: &[Real], _t: Time, out: &mut [Real]) {
        let (beta, gamma) = (p[0], p[1]);
        let infections = beta * y[0] * y[1];
        let recoveries = gamma * y[1];
        out[0] = -infections;
        out[1] = infections - recoveries;
        out[2] = recoveries;
    }

    fn basic_reproduction_number(&self, p: &[Real]) -> Real {
        p[0] / p[1]
    }
}

/// SIR model with vital dynamics. Births enter S at rate μ and every
/// compartment dies at the same per-capita rate μ, so the total population
/// fraction stays at one.
///
/// ```text
/// dS/dt = μ - β S I - μ S
/// dI/dt = β S I - γ I - μ I
/// dR/dt = γ I - μ R
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemographicSir {
    mu: Real,
}

impl DemographicSir {
    pub fn new(mu: Real) -> Self {
        DemographicSir { mu }
    }

    /// Combined birth/death rate.
    pub fn mu(&self) -> Real {
        self.mu
    }
}

impl CompartmentModel for DemographicSir {
    model_meta! {
        name: "DemographicSIR",
        compartments: ["S", "I", "R"],
        params: ["beta", "gamma"],
        infected: 1,
    }

    fn derivative_into(&self, y: &[Real], p: &[Real], _t: Time, out: &mut [Real]) {
        let (beta, gamma, mu) = (p[0], p[1], self.mu);
        let infections = beta * y[0] * y[1];
        let recoveries = gamma * y[1];
        out[0] = mu - infections - mu * y[0];
        out[1] = infections - recoveries - mu * y[1];
        out[2] = recoveries - mu * y[2];
    }

    fn basic_reproduction_number(&self, p: &[Real]) -> Real {
        p[0] / (p[1] + self.mu)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn closed_sir_derivative() {
        let dy = ClosedSir.derivative(&[0.9, 0.1, 0.0], &[2.0, 0.5], 0.0);
        assert_approx_eq!(dy[0], -0.18);
        assert_approx_eq!(dy[1], 0.13);
        assert_approx_eq!(dy[2], 0.05);
        assert_approx_eq!(dy.iter().sum::<Real>(), 0.0);
    }

    #[test]
    fn demographic_sir_derivative_balances_births_and_deaths() {
        let model = DemographicSir::new(0.02);
        let y = [0.6, 0.1, 0.3];
        let dy = model.derivative(&y, &[1.3, 0.333], 0.0);
        assert_approx_eq!(dy[0], 0.02 - 1.3 * 0.06 - 0.012);
        assert_approx_eq!(dy[1], 1.3 * 0.06 - 0.0333 - 0.002);
        assert_approx_eq!(dy[2], 0.0333 - 0.006);
        assert_approx_eq!(dy.iter().sum::<Real>(), 0.0);
    }

    #[test]
    fn derivative_ignores_time() {
        let y = [0.5, 0.2, 0.3];
        let p = [1.0, 0.2];
        assert_eq!(ClosedSir.derivative(&y, &p, 0.0), ClosedSir.derivative(&y, &p, 100.0));
    }

    #[test]
    fn reproduction_numbers() {
        assert_approx_eq!(ClosedSir.basic_reproduction_number(&[1.65, 0.5]), 3.3);
        assert_approx_eq!(
            DemographicSir::new(0.1).basic_reproduction_number(&[1.2, 0.5]),
            2.0
        );
    }
}
