//! Parameter space definitions and sampling within bounds.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use dt_types::{invalid_space, Candidate, TuneResult};

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    /// Continuous uniform range [lower, upper].
    Continuous,
}

/// A single tunable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    name: String,
    kind: DomainKind,
    lower: f64,
    upper: f64,
}

impl ParameterSpec {
    pub fn continuous(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            kind: DomainKind::Continuous,
            lower,
            upper,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DomainKind {
        self.kind
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// The full search space: an ordered list of parameter specs with unique names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpace {
    specs: Vec<ParameterSpec>,
}

impl ParameterSpace {
    pub fn new(specs: Vec<ParameterSpec>) -> TuneResult<Self> {
        if specs.is_empty() {
            return Err(invalid_space!("a parameter space needs at least one dimension"));
        }

        let mut seen = HashSet::with_capacity(specs.len());
        for spec in &specs {
            if !spec.lower.is_finite() || !spec.upper.is_finite() {
                return Err(invalid_space!(
                    "parameter '{}' has non-finite bounds [{}, {}]",
                    spec.name,
                    spec.lower,
                    spec.upper
                ));
            }
            if spec.lower > spec.upper {
                return Err(invalid_space!(
                    "parameter '{}' has lower bound {} above upper bound {}",
                    spec.name,
                    spec.lower,
                    spec.upper
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(invalid_space!("duplicate parameter name '{}'", spec.name));
            }
        }

        Ok(Self { specs })
    }

    /// The ten mapper delay parameters tuned against static timing.
    pub fn delay_parameters() -> Self {
        const BOUNDS: [(f64, f64); 10] = [
            (0.0, 1.0),
            (0.0, 0.5),
            (0.0, 0.5),
            (0.0, 1.0),
            (0.5, 2.0),
            (0.0, 0.5),
            (0.0, 0.5),
            (0.0, 1.0),
            (0.5, 2.0),
            (0.0, 1.0),
        ];
        Self {
            specs: BOUNDS
                .iter()
                .enumerate()
                .map(|(i, (lower, upper))| {
                    ParameterSpec::continuous(format!("delay_para{i}"), *lower, *upper)
                })
                .collect(),
        }
    }

    pub fn dimensionality(&self) -> usize {
        self.specs.len()
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.name.as_str())
    }

    /// True iff `candidate` has one coordinate per dimension and each lies
    /// within its bounds. Never clamps.
    pub fn validate(&self, candidate: &[f64]) -> bool {
        candidate.len() == self.specs.len()
            && self
                .specs
                .iter()
                .zip(candidate)
                .all(|(spec, value)| spec.contains(*value))
    }

    /// Independent uniform draw in every dimension.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Candidate {
        self.specs
            .iter()
            .map(|spec| {
                if spec.width() == 0.0 {
                    spec.lower
                } else {
                    rng.random_range(spec.lower..=spec.upper)
                }
            })
            .collect()
    }

    /// Latin-hypercube design: each dimension is split into `n` equal strata
    /// and every stratum is hit exactly once.
    pub fn latin_hypercube<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Candidate> {
        let mut design = vec![Vec::with_capacity(self.specs.len()); n];
        if n == 0 {
            return design;
        }

        let mut strata: Vec<usize> = (0..n).collect();
        for spec in &self.specs {
            strata.shuffle(rng);
            for (point, stratum) in design.iter_mut().zip(&strata) {
                let u = (*stratum as f64 + rng.random::<f64>()) / n as f64;
                point.push(spec.lower + u.min(1.0) * spec.width());
            }
        }
        design
    }

    /// Map a candidate onto the unit cube. Degenerate dimensions map to 0.5.
    pub fn to_unit(&self, candidate: &[f64]) -> Vec<f64> {
        self.specs
            .iter()
            .zip(candidate)
            .map(|(spec, value)| {
                let width = spec.width();
                if width == 0.0 {
                    0.5
                } else {
                    (value - spec.lower) / width
                }
            })
            .collect()
    }

    /// Inverse of [`ParameterSpace::to_unit`].
    pub fn from_unit(&self, unit: &[f64]) -> Candidate {
        self.specs
            .iter()
            .zip(unit)
            .map(|(spec, u)| spec.lower + u * spec.width())
            .collect()
    }

    /// Clamp a candidate the optimizer generated itself back into bounds.
    pub(crate) fn clamp(&self, candidate: &mut [f64]) {
        for (value, spec) in candidate.iter_mut().zip(&self.specs) {
            *value = value.clamp(spec.lower, spec.upper);
        }
    }
}

impl<'de> Deserialize<'de> for ParameterSpace {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            specs: Vec<ParameterSpec>,
        }

        let raw = Raw::deserialize(deserializer)?;
        ParameterSpace::new(raw.specs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_types::TuneError;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn unit_square() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::continuous("x", 0.0, 1.0),
            ParameterSpec::continuous("y", 0.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = ParameterSpace::new(vec![ParameterSpec::continuous("x", 1.0, 0.0)]).unwrap_err();
        assert!(matches!(err, TuneError::InvalidSpace { .. }));
    }

    #[test]
    fn rejects_non_finite_bounds() {
        for (lower, upper) in [(f64::NEG_INFINITY, 1.0), (0.0, f64::NAN), (0.0, f64::INFINITY)] {
            let result = ParameterSpace::new(vec![ParameterSpec::continuous("x", lower, upper)]);
            assert!(
                matches!(result, Err(TuneError::InvalidSpace { .. })),
                "bounds [{lower}, {upper}] should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = ParameterSpace::new(vec![
            ParameterSpec::continuous("x", 0.0, 1.0),
            ParameterSpec::continuous("x", 0.0, 2.0),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_empty_space() {
        assert!(ParameterSpace::new(Vec::new()).is_err());
    }

    #[test]
    fn accepts_degenerate_dimension() {
        let space = ParameterSpace::new(vec![ParameterSpec::continuous("fixed", 0.3, 0.3)]).unwrap();
        assert!(space.validate(&[0.3]));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(space.sample_uniform(&mut rng), vec![0.3]);
    }

    #[test]
    fn validate_checks_each_coordinate() {
        let space = unit_square();
        assert!(space.validate(&[0.0, 1.0]));
        assert!(space.validate(&[0.5, 0.5]));
        assert!(!space.validate(&[-0.01, 0.5]));
        assert!(!space.validate(&[0.5, 1.01]));
        assert!(!space.validate(&[0.5]));
        assert!(!space.validate(&[0.5, 0.5, 0.5]));
        assert!(!space.validate(&[f64::NAN, 0.5]));
    }

    #[test]
    fn delay_space_matches_mapper_layout() {
        let space = ParameterSpace::delay_parameters();
        assert_eq!(space.dimensionality(), 10);
        assert_eq!(space.names().next(), Some("delay_para0"));
        assert_eq!(space.specs()[4].lower(), 0.5);
        assert_eq!(space.specs()[4].upper(), 2.0);
        assert_eq!(space.specs()[2].upper(), 0.5);
    }

    #[test]
    fn uniform_samples_respect_bounds() {
        let space = ParameterSpace::delay_parameters();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let candidate = space.sample_uniform(&mut rng);
            assert!(space.validate(&candidate), "out of bounds: {candidate:?}");
        }
    }

    #[test]
    fn latin_hypercube_hits_every_stratum() {
        let space = ParameterSpace::delay_parameters();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 8;
        let design = space.latin_hypercube(n, &mut rng);
        assert_eq!(design.len(), n);

        for (dim, spec) in space.specs().iter().enumerate() {
            let mut hits = vec![0usize; n];
            for point in &design {
                assert!(space.validate(point));
                let u = (point[dim] - spec.lower()) / spec.width();
                let stratum = ((u * n as f64) as usize).min(n - 1);
                hits[stratum] += 1;
            }
            assert!(hits.iter().all(|&h| h == 1), "dimension {dim}: {hits:?}");
        }
    }

    #[test]
    fn unit_mapping_round_trips() {
        let space = ParameterSpace::delay_parameters();
        let candidate = vec![0.5, 0.25, 0.1, 0.5, 1.0, 0.3, 0.1, 0.25, 1.0, 0.5];
        let unit = space.to_unit(&candidate);
        assert!(unit.iter().all(|u| (0.0..=1.0).contains(u)));
        let back = space.from_unit(&unit);
        for (a, b) in candidate.iter().zip(&back) {
            approx::assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn deserialize_validates() {
        let json = serde_json::json!({
            "specs": [
                { "name": "x", "kind": "Continuous", "lower": 0.0, "upper": 1.0 },
                { "name": "x", "kind": "Continuous", "lower": 0.0, "upper": 1.0 }
            ]
        });
        assert!(serde_json::from_value::<ParameterSpace>(json).is_err());
    }
}
