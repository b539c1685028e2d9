//! Append-only record of evaluated candidates.

use serde::Serialize;

use dt_types::{Observation, TuneError, TuneResult};

/// Ordered history of observations for one tuning run.
///
/// Insertion order is evaluation order and is never changed. The best entry
/// only moves on a strict improvement, so ties keep the earliest observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationLedger {
    entries: Vec<Observation>,
    best: Option<usize>,
}

impl ObservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Non-finite values are rejected, since they
    /// could never be compared against later entries.
    pub fn append(&mut self, observation: Observation) -> TuneResult<()> {
        if !observation.value().is_finite() {
            return Err(TuneError::NonFiniteValue {
                index: self.entries.len(),
                value: observation.value(),
            });
        }
        let improves = match self.best {
            None => true,
            Some(idx) => observation.value() < self.entries[idx].value(),
        };
        self.entries.push(observation);
        if improves {
            self.best = Some(self.entries.len() - 1);
        }
        Ok(())
    }

    pub fn all(&self) -> &[Observation] {
        &self.entries
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best(&self) -> TuneResult<&Observation> {
        self.best
            .map(|idx| &self.entries[idx])
            .ok_or(TuneError::NoObservations)
    }

    /// Insertion index of the current best observation.
    pub fn best_index(&self) -> Option<usize> {
        self.best
    }

    /// Best-so-far objective after each observation.
    pub fn convergence(&self) -> Vec<f64> {
        self.entries
            .iter()
            .scan(f64::INFINITY, |best, obs| {
                *best = best.min(obs.value());
                Some(*best)
            })
            .collect()
    }

    /// Whether an identical vector has already been observed.
    pub fn contains(&self, candidate: &[f64]) -> bool {
        self.entries.iter().any(|obs| obs.candidate() == candidate)
    }
}
