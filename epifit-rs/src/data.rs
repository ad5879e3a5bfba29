//! Observed case series.
//!
//! Observations are read from CSV files with at least a `day` and a `cases`
//! column and are stored as fractions of the population.

use std::{io, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    ode::{TimeGrid, Trajectory},
    prelude::{Real, Time},
};

/// A single row of a case series file. Extra columns are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub day: Time,
    pub cases: Real,
}

impl CaseRecord {
    pub fn new(day: Time, cases: Real) -> Self {
        CaseRecord { day, cases }
    }
}

/// Infected fractions observed at strictly increasing times.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    grid: TimeGrid,
    infected: Vec<Real>,
}

impl Observations {
    /// Create series from times and infected fractions.
    pub fn new(times: Vec<Time>, infected: Vec<Real>) -> std::result::Result<Self, ConfigError> {
        if times.len() != infected.len() {
            return Err(ConfigError::MismatchedObservations {
                times: times.len(),
                values: infected.len(),
            });
        }
        for (&day, &cases) in times.iter().zip(&infected) {
            if !cases.is_finite() || cases < 0.0 {
                return Err(ConfigError::InvalidCases { day, cases });
            }
        }
        let grid = TimeGrid::new(times)?;
        Ok(Observations { grid, infected })
    }

    /// Normalize raw case counts by the population size.
    pub fn from_records(
        records: &[CaseRecord],
        population: Real,
    ) -> std::result::Result<Self, ConfigError> {
        if !(population > 0.0 && population.is_finite()) {
            return Err(ConfigError::NonPositivePopulation(population));
        }
        for rec in records {
            if !rec.cases.is_finite() || rec.cases < 0.0 {
                return Err(ConfigError::InvalidCases {
                    day: rec.day,
                    cases: rec.cases,
                });
            }
        }
        let times = records.iter().map(|r| r.day).collect();
        let infected = records.iter().map(|r| r.cases / population).collect();
        Observations::new(times, infected)
    }

    /// Read a CSV case series with a header row.
    pub fn from_reader<R: io::Read>(reader: R, population: Real) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut records = vec![];
        for row in rdr.deserialize() {
            let rec: CaseRecord = row?;
            records.push(rec);
        }
        Ok(Observations::from_records(&records, population)?)
    }

    /// Read a CSV case series from a file.
    pub fn from_path<P: AsRef<Path>>(path: P, population: Real) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Observations::from_reader(io::BufReader::new(file), population)
    }

    /// Sample the Infected compartment of a trajectory, optionally perturbing
    /// each value by a uniform multiplicative factor in `[1 - noise, 1 + noise]`.
    pub fn synthetic<R: Rng>(
        trajectory: &Trajectory,
        noise: Real,
        rng: &mut R,
    ) -> std::result::Result<Self, ConfigError> {
        if !(0.0..1.0).contains(&noise) {
            return Err(ConfigError::InvalidOption {
                name: "noise",
                reason: "must be in [0, 1)",
            });
        }
        let infected = trajectory
            .infected()
            .iter()
            .map(|&v| {
                if noise > 0.0 {
                    (v * (1.0 + rng.gen_range(-noise..=noise))).max(0.0)
                } else {
                    v
                }
            })
            .collect();
        Observations::new(trajectory.times().clone(), infected)
    }

    /// Observation times as a time grid.
    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn times(&self) -> &[Time] {
        self.grid.times()
    }

    /// Observed infected fractions.
    pub fn infected(&self) -> &[Real] {
        &self.infected
    }

    pub fn len(&self) -> usize {
        self.infected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infected.is_empty()
    }

    /// First observed infected fraction, the usual seed of a fit.
    pub fn first(&self) -> Real {
        self.infected[0]
    }

    /// Scale back to case counts.
    pub fn to_records(&self, population: Real) -> Vec<CaseRecord> {
        self.times()
            .iter()
            .zip(&self.infected)
            .map(|(&day, &v)| CaseRecord::new(day, v * population))
            .collect()
    }
}
