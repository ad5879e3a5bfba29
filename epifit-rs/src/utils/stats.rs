use crate::prelude::*;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};

/// Running statistics over a stream of values. Used to summarize the
/// pointwise residuals of a fit.
pub trait Stats {
    fn add(&mut self, x: Real);
    fn add_many<I>(&mut self, xs: I)
    where
        I: IntoIterator<Item = Real>,
    {
        for x in xs {
            self.add(x);
        }
    }
    fn size(&self) -> usize;
    fn total(&self) -> Real;
    fn sum_sq(&self) -> Real;
    fn min(&self) -> Real;
    fn max(&self) -> Real;
    fn mean(&self) -> Real {
        self.total() / self.size() as Real
    }
    fn var(&self) -> Real {
        let m = self.mean();
        return self.sum_sq() / self.size() as Real - m * m;
    }
    fn std(&self) -> Real {
        self.var().max(0.0).sqrt()
    }
    /// Root mean square of the values.
    fn rms(&self) -> Real {
        (self.sum_sq() / self.size() as Real).sqrt()
    }
    /// Largest absolute value.
    fn max_abs(&self) -> Real {
        self.min().abs().max(self.max().abs())
    }
}

/// Accumulates count, sum, sum of squares and extrema.
#[derive(Debug, Copy, Clone, PartialEq, CopyGetters, Serialize, Deserialize)]
pub struct Summary {
    #[getset(get_copy = "pub")]
    n: usize,
    m1: Real,
    m2: Real,
    min: Real,
    max: Real,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of all values of an iterator.
    pub fn from_values(xs: impl IntoIterator<Item = Real>) -> Self {
        let mut acc = Self::new();
        acc.add_many(xs);
        return acc;
    }
}

impl Default for Summary {
    fn default() -> Self {
        Summary {
            n: 0,
            m1: 0.,
            m2: 0.,
            min: INF,
            max: -INF,
        }
    }
}

impl Stats for Summary {
    fn add(&mut self, x: Real) {
        self.n += 1;
        self.m1 += x;
        self.m2 += x * x;
        self.min = Real::min(x, self.min);
        self.max = Real::max(x, self.max);
    }
    fn size(&self) -> usize {
        self.n
    }
    fn total(&self) -> Real {
        return self.m1;
    }
    fn sum_sq(&self) -> Real {
        return self.m2;
    }
    fn min(&self) -> Real {
        if self.n == 0 {
            return NAN;
        }
        self.min
    }
    fn max(&self) -> Real {
        if self.n == 0 {
            return NAN;
        }
        self.max
    }
}

#[inline]
pub fn sqr(x: Real) -> Real {
    x * x
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn simple_stats() {
        let mut acc = Summary::new();
        acc.add(0.);
        acc.add_many(vec![1., 2., 3., 4.]);
        assert_eq!(acc.size(), 5);
        assert_approx_eq!(acc.mean(), 2.0, 0.001);
        assert_approx_eq!(acc.std(), 1.4142, 0.001);
        assert_approx_eq!(acc.sum_sq(), 30.0);
        assert_approx_eq!(acc.rms(), 6.0_f64.sqrt());
    }

    #[test]
    fn residual_extrema() {
        let acc = Summary::from_values(vec![-0.5, 0.1, 0.2]);
        assert_approx_eq!(acc.min(), -0.5);
        assert_approx_eq!(acc.max(), 0.2);
        assert_approx_eq!(acc.max_abs(), 0.5);
    }

    #[test]
    fn empty_summary() {
        let acc = Summary::new();
        assert_eq!(acc.size(), 0);
        assert!(acc.min().is_nan());
        assert!(acc.mean().is_nan());
    }
}
