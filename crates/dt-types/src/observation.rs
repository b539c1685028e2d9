use serde::{Deserialize, Serialize};

/// A point in the parameter space, positionally aligned with the space's specs.
pub type Candidate = Vec<f64>;

/// An evaluated candidate paired with its objective value (lower is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    candidate: Candidate,
    value: f64,
}

impl Observation {
    pub fn new(candidate: Candidate, value: f64) -> Self {
        Self { candidate, value }
    }

    pub fn candidate(&self) -> &[f64] {
        &self.candidate
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn dimensionality(&self) -> usize {
        self.candidate.len()
    }

    pub fn into_parts(self) -> (Candidate, f64) {
        (self.candidate, self.value)
    }
}
