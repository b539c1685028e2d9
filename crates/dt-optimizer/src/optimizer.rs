//! Ask/tell optimizer orchestrating the ledger and a surrogate model.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dt_types::{invalid_request, Candidate, Observation, TuneError, TuneResult};

use crate::ledger::ObservationLedger;
use crate::space::ParameterSpace;
use crate::surrogate::{GaussianProcess, Surrogate};

/// Largest batch `suggest` accepts.
pub const MAX_BATCH_SIZE: usize = 4096;

/// How the first batch is drawn before any observation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitialDesign {
    #[default]
    LatinHypercube,
    Uniform,
}

/// Top-level configuration for an optimizer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Seed for candidate generation; equal seeds and observations give
    /// equal suggestions.
    pub seed: u64,

    pub initial_design: InitialDesign,

    /// Number of candidates scored by the acquisition rule per suggestion.
    pub candidate_pool: usize,

    /// Share of the pool drawn as perturbations of the best observations
    /// rather than uniformly.
    pub local_fraction: f64,

    /// Perturbation half-width as a fraction of each dimension's range.
    pub perturbation_scale: f64,

    /// How many of the best observations seed local perturbations.
    pub elite_count: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            initial_design: InitialDesign::LatinHypercube,
            candidate_pool: 512,
            local_fraction: 0.5,
            perturbation_scale: 0.1,
            elite_count: 3,
        }
    }
}

impl OptimizerConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_initial_design(mut self, design: InitialDesign) -> Self {
        self.initial_design = design;
        self
    }

    pub fn with_candidate_pool(mut self, n: usize) -> Self {
        self.candidate_pool = n;
        self
    }

    pub fn with_local_search(mut self, fraction: f64, scale: f64) -> Self {
        self.local_fraction = fraction.clamp(0.0, 1.0);
        self.perturbation_scale = scale;
        self
    }
}

/// State of one tuning run: the space, the observation history and the
/// surrogate fit on it.
///
/// Observations are only fit lazily: `observe` marks the model stale and the
/// next `suggest` refits once on the whole history.
#[derive(Debug)]
pub struct Optimizer<S = GaussianProcess> {
    space: ParameterSpace,
    config: OptimizerConfig,
    ledger: ObservationLedger,
    surrogate: S,
    rng: ChaCha8Rng,
    stale: bool,
    fit_count: usize,
}

impl Optimizer<GaussianProcess> {
    /// Optimizer backed by the default Gaussian process.
    pub fn with_gaussian_process(space: ParameterSpace, config: OptimizerConfig) -> Self {
        Self::new(space, GaussianProcess::default(), config)
    }
}

impl<S: Surrogate> Optimizer<S> {
    pub fn new(space: ParameterSpace, surrogate: S, config: OptimizerConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            space,
            config,
            ledger: ObservationLedger::new(),
            surrogate,
            rng,
            stale: false,
            fit_count: 0,
        }
    }

    /// Propose `batch_size` candidates to evaluate next.
    pub fn suggest(&mut self, batch_size: usize) -> TuneResult<Vec<Candidate>> {
        if batch_size == 0 {
            return Err(invalid_request!("batch size must be at least 1"));
        }
        if batch_size > MAX_BATCH_SIZE {
            return Err(invalid_request!(
                "batch size {batch_size} exceeds the limit of {MAX_BATCH_SIZE}"
            ));
        }

        if self.ledger.is_empty() {
            debug!(batch_size, "no observations yet, drawing initial design");
            return Ok(self.initial_design(batch_size));
        }

        if self.stale {
            self.surrogate.fit(&self.space, self.ledger.all())?;
            self.stale = false;
            self.fit_count += 1;
            debug!(
                model = self.surrogate.name(),
                observations = self.ledger.count(),
                "refit surrogate"
            );
        }

        let pool = self.candidate_pool(batch_size);
        let scores = self.surrogate.acquire(&pool)?;
        if scores.len() != pool.len() {
            return Err(TuneError::Surrogate(format!(
                "{} returned {} scores for {} candidates",
                self.surrogate.name(),
                scores.len(),
                pool.len()
            )));
        }

        let mut ranked: Vec<usize> = (0..pool.len()).collect();
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut batch: Vec<Candidate> = Vec::with_capacity(batch_size);
        let mut skipped = Vec::new();
        for idx in ranked {
            if batch.len() == batch_size {
                break;
            }
            let candidate = &pool[idx];
            if self.ledger.contains(candidate) || batch.contains(candidate) {
                skipped.push(idx);
                continue;
            }
            batch.push(candidate.clone());
        }
        // Every fresh candidate is exhausted: fall back to repeats.
        for idx in skipped {
            if batch.len() == batch_size {
                break;
            }
            batch.push(pool[idx].clone());
        }

        Ok(batch)
    }

    /// Record evaluated candidates. Validates the whole batch before
    /// appending anything.
    pub fn observe(&mut self, candidates: Vec<Candidate>, values: Vec<f64>) -> TuneResult<()> {
        if candidates.len() != values.len() {
            return Err(TuneError::ShapeMismatch {
                expected: candidates.len(),
                actual: values.len(),
            });
        }

        let dims = self.space.dimensionality();
        for candidate in &candidates {
            if candidate.len() != dims {
                return Err(TuneError::ShapeMismatch {
                    expected: dims,
                    actual: candidate.len(),
                });
            }
        }
        if let Some((index, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(TuneError::NonFiniteValue {
                index,
                value: *value,
            });
        }

        for (candidate, value) in candidates.into_iter().zip(values) {
            if !self.space.validate(&candidate) {
                warn!(?candidate, "observed candidate lies outside the parameter bounds");
            }
            self.ledger.append(Observation::new(candidate, value))?;
            self.stale = true;
        }
        Ok(())
    }

    pub fn best(&self) -> TuneResult<&Observation> {
        self.ledger.best()
    }

    pub fn count(&self) -> usize {
        self.ledger.count()
    }

    pub fn ledger(&self) -> &ObservationLedger {
        &self.ledger
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn surrogate(&self) -> &S {
        &self.surrogate
    }

    /// Number of surrogate fits performed so far.
    pub fn fit_count(&self) -> usize {
        self.fit_count
    }

    fn initial_design(&mut self, n: usize) -> Vec<Candidate> {
        match self.config.initial_design {
            InitialDesign::LatinHypercube => self.space.latin_hypercube(n, &mut self.rng),
            InitialDesign::Uniform => (0..n)
                .map(|_| self.space.sample_uniform(&mut self.rng))
                .collect(),
        }
    }

    /// Uniform samples plus perturbations around the best observations.
    fn candidate_pool(&mut self, batch_size: usize) -> Vec<Candidate> {
        let size = self.config.candidate_pool.max(batch_size.saturating_mul(4));
        let local = (size as f64 * self.config.local_fraction).round() as usize;

        let mut elites: Vec<&Observation> = self.ledger.all().iter().collect();
        elites.sort_by(|a, b| a.value().total_cmp(&b.value()));
        elites.truncate(self.config.elite_count.max(1));
        let elites: Vec<Candidate> = elites.iter().map(|o| o.candidate().to_vec()).collect();

        let mut pool = Vec::with_capacity(size);
        for i in 0..local {
            let base = &elites[i % elites.len()];
            pool.push(self.perturb(base));
        }
        while pool.len() < size {
            pool.push(self.space.sample_uniform(&mut self.rng));
        }
        pool
    }

    fn perturb(&mut self, base: &[f64]) -> Candidate {
        let scale = self.config.perturbation_scale;
        let mut candidate: Candidate = base
            .iter()
            .zip(self.space.specs())
            .map(|(value, spec)| {
                let noise = self.rng.random_range(-1.0..=1.0) * scale * spec.width();
                value + noise
            })
            .collect();
        self.space.clamp(&mut candidate);
        candidate
    }
}
