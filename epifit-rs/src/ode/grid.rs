use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::{
    error::ConfigError,
    prelude::{Real, Time},
};

/// An ordered, strictly increasing and non-empty sequence of sampling times.
/// The first point is the time of the initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Time>", into = "Vec<Time>")]
pub struct TimeGrid {
    times: Vec<Time>,
}

impl TimeGrid {
    /// Create grid from a vector of times.
    pub fn new(times: Vec<Time>) -> Result<Self, ConfigError> {
        check_times(&times)?;
        Ok(TimeGrid { times })
    }

    /// Times `t0, t0 + step, ...` strictly below `tn`.
    pub fn range(t0: Time, tn: Time, step: Real) -> Result<Self, ConfigError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(ConfigError::InvalidStep(step));
        }
        if !t0.is_finite() || !tn.is_finite() {
            return Err(ConfigError::UnorderedTimes { index: 0, time: t0 });
        }
        let slack = step * 1e-9;
        let times: Vec<Time> = (0u64..)
            .map(|k| t0 + k as Real * step)
            .take_while(|&t| t < tn - slack)
            .collect();
        TimeGrid::new(times)
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false: grids are never empty.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn start(&self) -> Time {
        self.times[0]
    }

    pub fn end(&self) -> Time {
        self.times[self.times.len() - 1]
    }
}

impl TryFrom<Vec<Time>> for TimeGrid {
    type Error = ConfigError;

    fn try_from(times: Vec<Time>) -> Result<Self, Self::Error> {
        TimeGrid::new(times)
    }
}

impl From<TimeGrid> for Vec<Time> {
    fn from(grid: TimeGrid) -> Self {
        grid.times
    }
}

/// Check that times are non-empty, finite and strictly increasing.
pub(crate) fn check_times(times: &[Time]) -> Result<(), ConfigError> {
    if times.is_empty() {
        return Err(ConfigError::EmptyTimeGrid);
    }
    for (index, &time) in times.iter().enumerate() {
        let ordered = index == 0 || time > times[index - 1];
        if !time.is_finite() || !ordered {
            return Err(ConfigError::UnorderedTimes { index, time });
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn range_excludes_end() {
        let grid = TimeGrid::range(0.0, 5.0, 1.0).unwrap();
        assert_eq!(grid.times(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(grid.start(), 0.0);
        assert_eq!(grid.end(), 4.0);

        let grid = TimeGrid::range(0.0, 120.0, 5.0).unwrap();
        assert_eq!(grid.len(), 24);

        let grid = TimeGrid::range(1.0, 2.0, 0.1).unwrap();
        assert_eq!(grid.len(), 10);
    }

    #[test]
    fn invalid_grids() {
        assert_eq!(TimeGrid::new(vec![]), Err(ConfigError::EmptyTimeGrid));
        assert!(matches!(
            TimeGrid::new(vec![0.0, 1.0, 1.0]),
            Err(ConfigError::UnorderedTimes { index: 2, .. })
        ));
        assert!(matches!(
            TimeGrid::new(vec![0.0, Real::NAN]),
            Err(ConfigError::UnorderedTimes { index: 1, .. })
        ));
        assert_eq!(
            TimeGrid::range(0.0, 10.0, 0.0),
            Err(ConfigError::InvalidStep(0.0))
        );
        assert_eq!(
            TimeGrid::range(5.0, 5.0, 1.0),
            Err(ConfigError::EmptyTimeGrid)
        );
    }

    #[test]
    fn single_point_grid_is_valid() {
        let grid = TimeGrid::new(vec![3.0]).unwrap();
        assert_eq!(grid.start(), grid.end());
    }
}
