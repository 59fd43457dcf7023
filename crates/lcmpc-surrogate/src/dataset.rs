//! Training samples collected from bare OCP solves.

use std::fs;
use std::path::Path;

use lcmpc_core::types::State;
use serde::{Deserialize, Serialize};

use crate::model::TrainError;

/// One `(initial state, optimal cost)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub state: State,
    pub cost: f64,
}

/// Ordered collection of samples. Handed to a trainer by reference and
/// never mutated by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, state: State, cost: f64) {
        self.samples.push(Sample { state, cost });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Mean sample cost, `None` when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_cost(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.cost).sum::<f64>() / self.samples.len() as f64)
    }

    /// `(min, max)` sample cost, `None` when empty.
    pub fn cost_range(&self) -> Option<(f64, f64)> {
        self.samples.iter().map(|s| s.cost).fold(None, |acc, c| {
            Some(acc.map_or((c, c), |(lo, hi): (f64, f64)| (lo.min(c), hi.max(c))))
        })
    }

    /// Index of the first sample whose state or cost is not finite.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.samples
            .iter()
            .position(|s| !s.cost.is_finite() || !s.state.iter().all(|v| v.is_finite()))
    }

    /// Write as pretty JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), TrainError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Read a set written by [`save_json`](Self::save_json).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TrainError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl FromIterator<(State, f64)> for SampleSet {
    fn from_iter<I: IntoIterator<Item = (State, f64)>>(iter: I) -> Self {
        Self {
            samples: iter
                .into_iter()
                .map(|(state, cost)| Sample { state, cost })
                .collect(),
        }
    }
}

impl Extend<(State, f64)> for SampleSet {
    fn extend<I: IntoIterator<Item = (State, f64)>>(&mut self, iter: I) {
        self.samples
            .extend(iter.into_iter().map(|(state, cost)| Sample { state, cost }));
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn set() -> SampleSet {
        [
            (State::new(0.1, 0.2, 0.3, 0.4), 2.0),
            (State::new(-1.0, 0.0, 0.5, 0.0), 6.0),
            (State::zeros(), 1.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn empty_set_has_no_statistics() {
        let empty = SampleSet::new();
        assert!(empty.is_empty());
        assert_eq!(empty.mean_cost(), None);
        assert_eq!(empty.cost_range(), None);
    }

    #[test]
    fn statistics() {
        let s = set();
        assert_eq!(s.len(), 3);
        assert_relative_eq!(s.mean_cost().unwrap(), 3.0);
        assert_eq!(s.cost_range(), Some((1.0, 6.0)));
        assert_eq!(s.first_non_finite(), None);
    }

    #[test]
    fn non_finite_entries_located() {
        let mut s = set();
        s.push(State::new(0.0, f64::NAN, 0.0, 0.0), 1.0);
        assert_eq!(s.first_non_finite(), Some(3));
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        let s = set();
        s.save_json(&path).unwrap();
        assert_eq!(SampleSet::load_json(&path).unwrap(), s);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SampleSet::load_json(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, TrainError::Io(_)));
    }

    #[test]
    fn extend_appends_in_order() {
        let mut s = SampleSet::new();
        s.extend([(State::zeros(), 1.0), (State::zeros(), 2.0)]);
        let costs: Vec<f64> = s.iter().map(|x| x.cost).collect();
        assert_eq!(costs, vec![1.0, 2.0]);
    }
}
