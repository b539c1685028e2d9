//! Run orchestration: warm start, ask/evaluate/tell rounds and the policy for
//! evaluations that fail.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dt_analysis::BEST_PARAMS_MARKER;
use dt_optimizer::{Optimizer, Surrogate};
use dt_types::{Candidate, EvaluationFailure, Observation, TuneError};

use crate::evaluator::Evaluator;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Tuning engine error: {0}")]
    Engine(#[from] TuneError),

    #[error("Run '{run}' aborted: {failure}")]
    Aborted {
        run: String,
        failure: EvaluationFailure,
    },
}

pub type DriverResult<T> = Result<T, DriverError>;

/// What to do when the evaluator cannot score a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Drop the candidate and carry on.
    #[default]
    Skip,
    /// Try up to `attempts` times in total, then drop it.
    Retry { attempts: u32 },
    /// Stop the run.
    Abort,
}

impl FailurePolicy {
    fn attempts(self) -> u32 {
        match self {
            Self::Retry { attempts } => attempts.max(1),
            Self::Skip | Self::Abort => 1,
        }
    }
}

/// Configuration for one tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    /// Ask/tell rounds after the warm start.
    pub iterations: usize,
    pub batch_size: usize,
    /// Candidates evaluated and observed before the first suggestion.
    pub seeds: Vec<Candidate>,
    pub failure_policy: FailurePolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "delay-tune".to_string(),
            iterations: 30,
            batch_size: 1,
            seeds: Vec::new(),
            failure_policy: FailurePolicy::Skip,
        }
    }
}

impl RunConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<Candidate>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Evaluator calls, retries included.
    pub evaluations: usize,
    pub failures: usize,
    pub best: Observation,
    /// Best value after each observation.
    pub convergence: Vec<f64>,
}

impl RunSummary {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// The best vector as a log line the ingestion parser reads back.
    pub fn best_params_line(&self) -> String {
        let mut line = String::from(BEST_PARAMS_MARKER);
        for (i, value) in self.best.candidate().iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&format!("[{i}]={value:.3},"));
        }
        line
    }
}

#[derive(Debug, Default)]
struct Tally {
    evaluations: usize,
    failures: usize,
}

/// Drives one optimizer against one evaluator.
#[derive(Debug, Clone)]
pub struct TuningDriver {
    config: RunConfig,
}

impl TuningDriver {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Observe the seeds, then run the configured ask/evaluate/tell rounds.
    pub fn run<S, E>(&self, optimizer: &mut Optimizer<S>, evaluator: &mut E) -> DriverResult<RunSummary>
    where
        S: Surrogate,
        E: Evaluator + ?Sized,
    {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tally = Tally::default();
        info!(
            run = %self.config.name,
            %id,
            seeds = self.config.seeds.len(),
            iterations = self.config.iterations,
            "starting tuning run"
        );

        if !self.config.seeds.is_empty() {
            let (candidates, values) =
                self.evaluate_batch(evaluator, self.config.seeds.clone(), &mut tally)?;
            optimizer.observe(candidates, values)?;
        }

        for round in 0..self.config.iterations {
            let suggestions = optimizer.suggest(self.config.batch_size)?;
            let (candidates, values) = self.evaluate_batch(evaluator, suggestions, &mut tally)?;
            if !candidates.is_empty() {
                optimizer.observe(candidates, values)?;
            }
            if let Ok(best) = optimizer.best() {
                debug!(run = %self.config.name, round, best = best.value(), "round complete");
            }
        }

        let best = optimizer.best()?.clone();
        let summary = RunSummary {
            id,
            name: self.config.name.clone(),
            started_at,
            finished_at: Utc::now(),
            evaluations: tally.evaluations,
            failures: tally.failures,
            best,
            convergence: optimizer.ledger().convergence(),
        };
        info!(
            run = %summary.name,
            best = summary.best.value(),
            evaluations = summary.evaluations,
            failures = summary.failures,
            "tuning run finished"
        );
        Ok(summary)
    }

    fn evaluate_batch<E: Evaluator + ?Sized>(
        &self,
        evaluator: &mut E,
        batch: Vec<Candidate>,
        tally: &mut Tally,
    ) -> DriverResult<(Vec<Candidate>, Vec<f64>)> {
        let mut candidates = Vec::with_capacity(batch.len());
        let mut values = Vec::with_capacity(batch.len());
        for candidate in batch {
            if let Some(value) = self.evaluate_one(evaluator, &candidate, tally)? {
                candidates.push(candidate);
                values.push(value);
            }
        }
        Ok((candidates, values))
    }

    fn evaluate_one<E: Evaluator + ?Sized>(
        &self,
        evaluator: &mut E,
        candidate: &[f64],
        tally: &mut Tally,
    ) -> DriverResult<Option<f64>> {
        let policy = self.config.failure_policy;
        let mut last_failure = None;
        for attempt in 1..=policy.attempts() {
            tally.evaluations += 1;
            let failure = match evaluator.evaluate(candidate) {
                Ok(value) if value.is_finite() => return Ok(Some(value)),
                Ok(value) => {
                    EvaluationFailure::malformed_output(format!("non-finite objective {value}"))
                }
                Err(failure) => failure,
            };
            tally.failures += 1;
            warn!(run = %self.config.name, attempt, %failure, "evaluation failed");
            last_failure = Some(failure);
        }

        match (policy, last_failure) {
            (FailurePolicy::Abort, Some(failure)) => Err(DriverError::Aborted {
                run: self.config.name.clone(),
                failure,
            }),
            _ => Ok(None),
        }
    }
}

/// Run independent tuning runs on the rayon pool. Each run gets its own
/// optimizer and evaluator from the factories; results keep the order of
/// `configs`.
pub fn run_parallel<S, E, MO, ME>(
    configs: Vec<RunConfig>,
    make_optimizer: MO,
    make_evaluator: ME,
) -> Vec<DriverResult<RunSummary>>
where
    S: Surrogate,
    E: Evaluator,
    MO: Fn(usize, &RunConfig) -> Optimizer<S> + Sync,
    ME: Fn(usize, &RunConfig) -> E + Sync,
{
    info!(runs = configs.len(), "starting parallel tuning runs");
    configs
        .into_par_iter()
        .enumerate()
        .map(|(index, config)| {
            let mut optimizer = make_optimizer(index, &config);
            let mut evaluator = make_evaluator(index, &config);
            TuningDriver::new(config).run(&mut optimizer, &mut evaluator)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::QuadraticBowl;
    use crate::seeds::expert_seeds;
    use dt_analysis::BestParamsParser;
    use dt_optimizer::{OptimizerConfig, ParameterSpace, ParameterSpec};
    use dt_types::FailureKind;

    fn unit_space(dims: usize) -> ParameterSpace {
        ParameterSpace::new(
            (0..dims)
                .map(|i| ParameterSpec::continuous(format!("x{i}"), 0.0, 1.0))
                .collect(),
        )
        .unwrap()
    }

    fn optimizer(dims: usize) -> Optimizer {
        Optimizer::with_gaussian_process(
            unit_space(dims),
            OptimizerConfig::default().with_candidate_pool(64),
        )
    }

    /// Records every candidate it sees and fails on the listed call numbers.
    struct ScriptedEvaluator {
        seen: Vec<Candidate>,
        fail_on: Vec<usize>,
    }

    impl ScriptedEvaluator {
        fn new(fail_on: Vec<usize>) -> Self {
            Self {
                seen: Vec::new(),
                fail_on,
            }
        }
    }

    impl Evaluator for ScriptedEvaluator {
        fn evaluate(&mut self, candidate: &[f64]) -> Result<f64, EvaluationFailure> {
            self.seen.push(candidate.to_vec());
            if self.fail_on.contains(&self.seen.len()) {
                return Err(EvaluationFailure::tool_crash("sta segfault"));
            }
            Ok(candidate.iter().sum())
        }
    }

    #[test]
    fn seeds_are_observed_before_first_suggestion() {
        let seeds = vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.9, 0.9]];
        let config = RunConfig::default()
            .with_iterations(2)
            .with_seeds(seeds.clone());
        let mut opt = optimizer(2);
        let mut evaluator = ScriptedEvaluator::new(vec![]);

        let summary = TuningDriver::new(config).run(&mut opt, &mut evaluator).unwrap();

        assert_eq!(&evaluator.seen[..3], &seeds[..]);
        let ledger: Vec<&[f64]> = opt.ledger().all().iter().map(|o| o.candidate()).collect();
        assert_eq!(ledger[0], &[0.1, 0.2]);
        assert_eq!(ledger[2], &[0.9, 0.9]);
        assert_eq!(opt.count(), 5);
        assert_eq!(summary.evaluations, 5);
        assert_eq!(summary.convergence.len(), 5);
        assert!(summary.best.value() <= 0.3 + 1e-12);
    }

    #[test]
    fn skip_policy_drops_failed_candidates() {
        let config = RunConfig::default().with_iterations(4);
        let mut opt = optimizer(2);
        let mut evaluator = ScriptedEvaluator::new(vec![2, 3]);

        let summary = TuningDriver::new(config).run(&mut opt, &mut evaluator).unwrap();

        assert_eq!(summary.evaluations, 4);
        assert_eq!(summary.failures, 2);
        assert_eq!(opt.count(), 2);
    }

    #[test]
    fn retry_policy_recovers_transient_failures() {
        let config = RunConfig::default()
            .with_iterations(3)
            .with_failure_policy(FailurePolicy::Retry { attempts: 2 });
        let mut opt = optimizer(2);
        let mut evaluator = ScriptedEvaluator::new(vec![1]);

        let summary = TuningDriver::new(config).run(&mut opt, &mut evaluator).unwrap();

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.evaluations, 4);
        assert_eq!(opt.count(), 3);
        assert_eq!(evaluator.seen[0], evaluator.seen[1]);
    }

    #[test]
    fn abort_policy_stops_the_run() {
        let config = RunConfig::default()
            .with_name("abort-me")
            .with_iterations(5)
            .with_failure_policy(FailurePolicy::Abort);
        let mut opt = optimizer(2);
        let mut evaluator = ScriptedEvaluator::new(vec![2]);

        let err = TuningDriver::new(config).run(&mut opt, &mut evaluator).unwrap_err();

        match err {
            DriverError::Aborted { run, failure } => {
                assert_eq!(run, "abort-me");
                assert_eq!(failure.kind, FailureKind::ToolCrash);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(opt.count(), 1);
    }

    #[test]
    fn run_without_any_success_has_no_best() {
        struct AlwaysNan;
        impl Evaluator for AlwaysNan {
            fn evaluate(&mut self, _: &[f64]) -> Result<f64, EvaluationFailure> {
                Ok(f64::NAN)
            }
        }

        let config = RunConfig::default().with_iterations(3);
        let err = TuningDriver::new(config)
            .run(&mut optimizer(2), &mut AlwaysNan)
            .unwrap_err();
        assert_eq!(err, DriverError::Engine(TuneError::NoObservations));
    }

    #[test]
    fn best_params_line_round_trips_through_ingestion() {
        let config = RunConfig::default()
            .with_iterations(3)
            .with_seeds(expert_seeds());
        let mut opt = Optimizer::with_gaussian_process(
            ParameterSpace::delay_parameters(),
            OptimizerConfig::default().with_candidate_pool(64),
        );
        let summary = TuningDriver::new(config)
            .run(&mut opt, &mut QuadraticBowl::default())
            .unwrap();

        let line = summary.best_params_line();
        assert!(line.starts_with("#### Best para[0]="));

        let parsed = BestParamsParser::default().parse_line(&line).unwrap().unwrap();
        assert_eq!(parsed.len(), 10);
        for (parsed, actual) in parsed.iter().zip(summary.best.candidate()) {
            assert!((parsed - actual).abs() <= 5e-4);
        }
    }

    #[test]
    fn best_params_line_format() {
        let summary = RunSummary {
            id: Uuid::new_v4(),
            name: "fmt".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            evaluations: 1,
            failures: 0,
            best: Observation::new(vec![0.7364, 0.1, 1.25], 0.2),
            convergence: vec![0.2],
        };
        assert_eq!(
            summary.best_params_line(),
            "#### Best para[0]=0.736, [1]=0.100, [2]=1.250,"
        );
    }

    #[test]
    fn parallel_runs_are_independent_and_ordered() {
        let configs: Vec<RunConfig> = (0..3)
            .map(|i| RunConfig::default().with_name(format!("run-{i}")).with_iterations(4))
            .collect();

        let results = run_parallel(
            configs,
            |index, _| {
                Optimizer::with_gaussian_process(
                    unit_space(3),
                    OptimizerConfig::default()
                        .with_seed(index as u64)
                        .with_candidate_pool(64),
                )
            },
            |_, _| QuadraticBowl::default(),
        );

        assert_eq!(results.len(), 3);
        let summaries: Vec<RunSummary> = results.into_iter().map(|r| r.unwrap()).collect();
        for (i, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.name, format!("run-{i}"));
            assert_eq!(summary.evaluations, 4);
        }
        assert_ne!(summaries[0].id, summaries[1].id);
    }

    #[test]
    fn quadratic_smoke_run_improves_on_seeds() {
        let seeds = vec![vec![0.05, 0.95, 0.1], vec![0.9, 0.1, 0.95]];
        let config = RunConfig::default().with_iterations(20).with_seeds(seeds);
        let mut opt = optimizer(3);
        let summary = TuningDriver::new(config)
            .run(&mut opt, &mut QuadraticBowl::default())
            .unwrap();

        let seed_best = summary.convergence[1];
        assert!(summary.best.value() < seed_best);
        assert!(summary.convergence.windows(2).all(|w| w[1] <= w[0]));
    }
}
