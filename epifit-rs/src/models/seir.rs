use super::CompartmentModel;
use crate::prelude::{Real, Time};

/// Closed SEIR model. Newly infected individuals pass through a latent
/// Exposed compartment before becoming infectious.
///
/// ```text
/// dS/dt = -β S I
/// dE/dt =  β S I - σ E
/// dI/dt =  σ E - γ I
/// dR/dt =  γ I
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClosedSeir;

impl CompartmentModel for ClosedSeir {
    model_meta! {
        name: "ClosedSEIR",
        compartments: ["S", "E", "I", "R"],
        params: ["beta", "gamma", "sigma"],
        infected: 2,
    }

    fn derivative_into(&self, y: &[Real], p: &[Real], _t: Time, out: &mut [Real]) {
        let (beta, gamma, sigma) = (p[0], p[1], p[2]);
        let infections = beta * y[0] * y[2];
        let onsets = sigma * y[1];
        let recoveries = gamma * y[2];
        out[0] = -infections;
        out[1] = infections - onsets;
        out[2] = onsets - recoveries;
        out[3] = recoveries;
    }

    fn basic_reproduction_number(&self, p: &[Real]) -> Real {
        p[0] / p[1]
    }
}

/// SEIR model with vital dynamics. R is tracked explicitly with its own death
/// term, which keeps S + E + I + R = 1.
///
/// ```text
/// dS/dt = μ - β S I - μ S
/// dE/dt = β S I - (μ + σ) E
/// dI/dt = σ E - (μ + γ) I
/// dR/dt = γ I - μ R
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemographicSeir {
    mu: Real,
}

impl DemographicSeir {
    pub fn new(mu: Real) -> Self {
        DemographicSeir { mu }
    }

    /// Combined birth/death rate.
    pub fn mu(&self) -> Real {
        self.mu
    }
}

impl CompartmentModel for DemographicSeir {
    model_meta! {
        name: "DemographicSEIR",
        compartments: ["S", "E", "I", "R"],
        params: ["beta", "gamma", "sigma"],
        infected: 2,
    }

    fn derivative_into(&self, y: &[Real], p: &[Real], _t: Time, out: &mut [Real]) {
        let (beta, gamma, sigma, mu) = (p[0], p[1], p[2], self.mu);
        let infections = beta * y[0] * y[2];
        out[0] = mu - infections - mu * y[0];
        out[1] = infections - (mu + sigma) * y[1];
        out[2] = sigma * y[1] - (mu + gamma) * y[2];
        out[3] = gamma * y[2] - mu * y[3];
    }

    fn basic_reproduction_number(&self, p: &[Real]) -> Real {
        let (beta, gamma, sigma, mu) = (p[0], p[1], p[2], self.mu);
        beta * sigma / ((sigma + mu) * (gamma + mu))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn closed_seir_derivative() {
        let dy = ClosedSeir.derivative(&[0.8, 0.1, 0.1, 0.0], &[2.0, 0.5, 0.25], 0.0);
        assert_approx_eq!(dy[0], -0.16);
        assert_approx_eq!(dy[1], 0.16 - 0.025);
        assert_approx_eq!(dy[2], 0.025 - 0.05);
        assert_approx_eq!(dy[3], 0.05);
        assert_approx_eq!(dy.iter().sum::<Real>(), 0.0);
    }

    #[test]
    fn demographic_seir_conserves_total() {
        let model = DemographicSeir::new(0.0000391);
        let y = [0.1, 0.0001, 0.0001, 0.8998];
        let dy = model.derivative(&y, &[1.56, 0.1428, 0.071], 0.0);
        assert_approx_eq!(dy.iter().sum::<Real>(), 0.0);
    }

    #[test]
    fn demographic_seir_reduces_to_closed_without_vital_rate() {
        let y = [0.7, 0.1, 0.05, 0.15];
        let p = [1.5, 0.4, 0.3];
        let open = DemographicSeir::new(0.0).derivative(&y, &p, 0.0);
        let closed = ClosedSeir.derivative(&y, &p, 0.0);
        for (a, b) in open.iter().zip(&closed) {
            assert_approx_eq!(*a, *b);
        }
    }

    #[test]
    fn reproduction_numbers() {
        assert_approx_eq!(ClosedSeir.basic_reproduction_number(&[1.5, 0.5, 0.2]), 3.0);
        let r0 = DemographicSeir::new(0.1).basic_reproduction_number(&[1.2, 0.5, 0.2]);
        assert_approx_eq!(r0, 1.2 * 0.2 / (0.3 * 0.6));
    }
}
