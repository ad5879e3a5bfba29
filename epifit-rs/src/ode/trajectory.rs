use getset::{CopyGetters, Getters};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::io;

use crate::{
    error::Result,
    prelude::{Real, Time},
};

/// The state of a model sampled at each point of a time grid. Row `k` of
/// `states` is the compartment vector at `times[k]`.
///
/// Trajectories are produced once by the integrator and never mutated.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Trajectory {
    #[getset(get = "pub")]
    times: Vec<Time>,
    #[getset(get = "pub")]
    states: Array2<Real>,
    #[getset(get_copy = "pub")]
    compartments: &'static [&'static str],
    #[getset(get_copy = "pub")]
    infected_index: usize,
    /// Number of internal solver steps taken.
    #[getset(get_copy = "pub")]
    steps: usize,
}

impl Trajectory {
    pub(crate) fn new(
        times: Vec<Time>,
        states: Array2<Real>,
        compartments: &'static [&'static str],
        infected_index: usize,
        steps: usize,
    ) -> Self {
        debug_assert_eq!(times.len(), states.nrows());
        debug_assert_eq!(compartments.len(), states.ncols());
        Trajectory {
            times,
            states,
            compartments,
            infected_index,
            steps,
        }
    }

    /// Number of time points.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time of the k-th sample.
    pub fn time(&self, k: usize) -> Option<Time> {
        self.times.get(k).copied()
    }

    /// Compartment vector of the k-th sample.
    pub fn state(&self, k: usize) -> Option<ArrayView1<'_, Real>> {
        (k < self.len()).then(|| self.states.row(k))
    }

    /// The last sampled state.
    pub fn last_state(&self) -> Option<ArrayView1<'_, Real>> {
        self.len().checked_sub(1).and_then(|k| self.state(k))
    }

    /// Iterate over (time, state) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Time, ArrayView1<'_, Real>)> {
        self.times.iter().copied().zip(self.states.outer_iter())
    }

    /// Time series of the i-th compartment.
    pub fn column(&self, i: usize) -> Option<ArrayView1<'_, Real>> {
        (i < self.states.ncols()).then(|| self.states.column(i))
    }

    /// Time series of the compartment with the given label.
    pub fn compartment(&self, label: &str) -> Option<ArrayView1<'_, Real>> {
        let i = self.compartments.iter().position(|c| *c == label)?;
        self.column(i)
    }

    /// Time series of the Infected compartment.
    pub fn infected(&self) -> ArrayView1<'_, Real> {
        self.states.column(self.infected_index)
    }

    /// Sum of all compartments at each time.
    pub fn totals(&self) -> Array1<Real> {
        self.states.sum_axis(Axis(1))
    }

    /// Time and value of the largest Infected fraction. The earliest time wins
    /// ties.
    pub fn peak(&self) -> Option<(Time, Real)> {
        self.times
            .iter()
            .zip(self.infected())
            .fold(None, |best: Option<(Time, Real)>, (&t, &v)| match best {
                Some((_, top)) if top >= v => best,
                _ => Some((t, v)),
            })
    }

    /// True if all values are finite and no smaller than `-eps`.
    pub fn is_physical(&self, eps: Real) -> bool {
        self.states.iter().all(|&v| v.is_finite() && v >= -eps)
    }

    /// Write the trajectory as CSV with a `t` column followed by one column
    /// per compartment.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["t"];
        header.extend_from_slice(self.compartments);
        wtr.write_record(&header)?;
        for (t, state) in self.iter() {
            let mut record = vec![t.to_string()];
            record.extend(state.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Return a CSV string with the content of the trajectory.
    pub fn render_csv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        return Ok(String::from_utf8_lossy(&buf).into_owned());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    fn sample() -> Trajectory {
        let states = array![[0.9, 0.1, 0.0], [0.7, 0.2, 0.1], [0.6, 0.2, 0.2], [0.55, 0.05, 0.4]];
        Trajectory::new(vec![0.0, 1.0, 2.0, 3.0], states, &["S", "I", "R"], 1, 3)
    }

    #[test]
    fn accessors() {
        let tr = sample();
        assert_eq!(tr.len(), 4);
        assert_eq!(tr.time(2), Some(2.0));
        assert_eq!(tr.time(4), None);
        assert_eq!(tr.state(1).unwrap().to_vec(), vec![0.7, 0.2, 0.1]);
        assert!(tr.state(4).is_none());
        assert_eq!(tr.last_state().unwrap().to_vec(), vec![0.55, 0.05, 0.4]);
        assert_eq!(tr.infected().to_vec(), vec![0.1, 0.2, 0.2, 0.05]);
        assert_eq!(tr.compartment("R").unwrap().to_vec(), vec![0.0, 0.1, 0.2, 0.4]);
        assert!(tr.compartment("E").is_none());
        assert!(tr.column(3).is_none());
        for total in tr.totals().iter() {
            assert_approx_eq!(*total, 1.0);
        }
    }

    #[test]
    fn peak_prefers_earliest_maximum() {
        assert_eq!(sample().peak(), Some((1.0, 0.2)));
    }

    #[test]
    fn physical_check() {
        let tr = sample();
        assert!(tr.is_physical(0.0));
        let bad = Trajectory::new(vec![0.0], array![[1.1, -0.1, 0.0]], &["S", "I", "R"], 1, 0);
        assert!(!bad.is_physical(1e-9));
        assert!(bad.is_physical(0.2));
    }

    #[test]
    fn renders_csv() {
        let csv = sample().render_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("t,S,I,R"));
        assert_eq!(lines.next(), Some("0,0.9,0.1,0"));
        assert_eq!(csv.lines().count(), 5);
    }
}
