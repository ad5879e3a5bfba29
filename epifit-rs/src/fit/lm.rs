//! Levenberg–Marquardt least squares with a forward-difference Jacobian.

use log::*;
use nalgebra::{DMatrix, DVector};

use super::FitOptions;
use crate::prelude::*;

/// Damping above this value means no step along the gradient can reduce the
/// cost any further.
const LAMBDA_MAX: Real = 1e16;
const LAMBDA_MIN: Real = 1e-15;

/// Finite difference steps are never smaller than this times the step size,
/// so parameters at zero still get a usable perturbation.
const FD_FLOOR: Real = 1e-3;

/// Final state of a least squares run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LmOutcome {
    pub x: Vec<Real>,
    pub cost: Real,
    pub residuals: Vec<Real>,
    pub converged: bool,
    pub iterations: usize,
    pub evaluations: usize,
    pub rejected: usize,
}

/// Counts residual evaluations and unevaluable candidates.
struct Objective<F> {
    f: F,
    evaluations: usize,
    rejected: usize,
}

impl<F> Objective<F>
where
    F: FnMut(&[Real]) -> Option<Vec<Real>>,
{
    fn eval(&mut self, x: &[Real]) -> Option<Vec<Real>> {
        self.evaluations += 1;
        let res = (self.f)(x).filter(|r| r.iter().all(|v| v.is_finite()));
        if res.is_none() {
            self.rejected += 1;
        }
        return res;
    }
}

fn sum_sq(r: &[Real]) -> Real {
    r.iter().map(|v| v * v).sum()
}

fn norm(x: &[Real]) -> Real {
    sum_sq(x).sqrt()
}

/// Solve the damped normal equations `(JᵀJ + λD) d = rhs`. The damped
/// matrix is positive definite unless JᵀJ is badly conditioned, in which case
/// LU is tried instead of Cholesky.
fn damped_step(lhs: DMatrix<Real>, rhs: &DVector<Real>) -> Option<DVector<Real>> {
    let step = match lhs.clone().cholesky() {
        Some(chol) => Some(chol.solve(rhs)),
        None => lhs.lu().solve(rhs),
    };
    step.filter(|d| d.iter().all(|v| v.is_finite()))
}

/// Minimize the sum of squares of `residuals(x)` starting from `x0`.
///
/// The residual function returns `None` for candidates that cannot be
/// evaluated. Those count as rejected steps with infinite cost. If `x0` itself
/// cannot be evaluated the outcome has an infinite cost and is not converged.
///
/// With `non_negative` set, candidates are projected onto `x >= 0` and
/// parameters held at zero by the gradient do not move.
pub(crate) fn levenberg_marquardt<F>(
    residuals: F,
    x0: &[Real],
    opts: &FitOptions,
) -> LmOutcome
where
    F: FnMut(&[Real]) -> Option<Vec<Real>>,
{
    let mut obj = Objective {
        f: residuals,
        evaluations: 0,
        rejected: 0,
    };
    let n = x0.len();
    let mut x = x0.to_vec();

    let mut r = match obj.eval(&x) {
        Some(r) => r,
        None => {
            warn!(target: "fit", "initial guess {:?} cannot be evaluated", x0);
            return LmOutcome {
                x,
                cost: INF,
                residuals: vec![],
                converged: false,
                iterations: 0,
                evaluations: obj.evaluations,
                rejected: obj.rejected,
            };
        }
    };
    let m = r.len();
    let mut cost = sum_sq(&r);
    let mut lambda = opts.lambda0();
    let mut converged = false;
    let mut iterations = 0;

    'iterations: while iterations < opts.max_iter() && !converged {
        iterations += 1;

        // Jacobian of the residuals, one column per parameter
        let mut jac = DMatrix::<Real>::zeros(m, n);
        for j in 0..n {
            let h = opts.fd_step() * x[j].abs().max(FD_FLOOR);
            let mut xp = x.clone();
            xp[j] += h;
            let (rp, h) = match obj.eval(&xp) {
                Some(rp) => (rp, h),
                None => {
                    xp[j] = x[j] - h;
                    match obj.eval(&xp) {
                        Some(rp) => (rp, -h),
                        None => {
                            warn!(target: "fit", "cannot differentiate around {:?}", x);
                            break 'iterations;
                        }
                    }
                }
            };
            for i in 0..m {
                jac[(i, j)] = (rp[i] - r[i]) / h;
            }
        }

        let grad = jac.tr_mul(&DVector::from_column_slice(&r));
        // Parameters at zero that the gradient pushes below it stay put
        let pinned: Vec<bool> = (0..n)
            .map(|k| opts.non_negative() && x[k] <= 0.0 && grad[k] > 0.0)
            .collect();
        let stationary = (0..n).all(|k| pinned[k] || grad[k].abs() <= opts.gtol());
        if stationary {
            debug!(target: "fit", "iter {}: gradient below tolerance", iterations);
            converged = true;
            break;
        }
        let jtj = jac.tr_mul(&jac);
        let mut rhs = -grad;
        for k in (0..n).filter(|&k| pinned[k]) {
            rhs[k] = 0.0;
        }
        let rejected_before = obj.rejected;

        // Increase damping until a step reduces the cost
        loop {
            let mut lhs = jtj.clone();
            for k in 0..n {
                lhs[(k, k)] += lambda * jtj[(k, k)].max(Real::EPSILON);
            }
            for k in (0..n).filter(|&k| pinned[k]) {
                lhs.row_mut(k).fill(0.0);
                lhs.column_mut(k).fill(0.0);
                lhs[(k, k)] = 1.0;
            }

            let accepted = damped_step(lhs, &rhs).and_then(|d| {
                let xn: Vec<Real> = x
                    .iter()
                    .zip(d.iter())
                    .map(|(a, b)| a + b)
                    .map(|v| if opts.non_negative() { v.max(0.0) } else { v })
                    .collect();
                let rn = obj.eval(&xn)?;
                let new_cost = sum_sq(&rn);
                let moved = xn.iter().zip(&x).map(|(a, b)| a - b).collect::<Vec<_>>();
                (new_cost < cost).then(|| (xn, rn, new_cost, norm(&moved)))
            });
            let clean = obj.rejected == rejected_before;

            match accepted {
                Some((xn, rn, new_cost, step_norm)) => {
                    let decrease = (cost - new_cost) / cost;
                    let small_step = step_norm <= opts.xtol() * (norm(&xn) + opts.xtol());
                    debug!(
                        target: "fit",
                        "iter {}: cost {:.6e} -> {:.6e}, lambda = {:.1e}",
                        iterations,
                        cost,
                        new_cost,
                        lambda
                    );
                    x = xn;
                    r = rn;
                    cost = new_cost;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    // Small progress only counts while every candidate evaluates
                    if clean && (decrease < opts.ftol() || small_step) {
                        converged = true;
                    }
                    break;
                }
                None => {
                    lambda *= 10.0;
                    if lambda >= LAMBDA_MAX {
                        debug!(
                            target: "fit",
                            "iter {}: damping exhausted at cost {:.6e} ({} rejected)",
                            iterations,
                            cost,
                            obj.rejected - rejected_before
                        );
                        // Stationary unless unevaluable candidates blocked the way
                        converged = clean;
                        break 'iterations;
                    }
                }
            }
        }
    }

    if !converged {
        warn!(
            target: "fit",
            "no convergence after {} iterations (cost = {:.6e})",
            iterations,
            cost
        );
    }
    LmOutcome {
        x,
        cost,
        residuals: r,
        converged,
        iterations,
        evaluations: obj.evaluations,
        rejected: obj.rejected,
    }
}
