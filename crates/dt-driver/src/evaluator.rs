//! The boundary between the tuning loop and whatever produces objective
//! values: the synthesis flow in production, a synthetic bowl in smoke runs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dt_types::EvaluationFailure;

/// Turns a candidate into an objective value, lower being better.
pub trait Evaluator: Send {
    fn evaluate(&mut self, candidate: &[f64]) -> Result<f64, EvaluationFailure>;
}

/// Synthetic objective `sum((x_i - center)^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadraticBowl {
    pub center: f64,
}

impl Default for QuadraticBowl {
    fn default() -> Self {
        Self { center: 0.5 }
    }
}

impl Evaluator for QuadraticBowl {
    fn evaluate(&mut self, candidate: &[f64]) -> Result<f64, EvaluationFailure> {
        Ok(candidate.iter().map(|x| (x - self.center).powi(2)).sum())
    }
}

/// Delay, area and depth reported for one mapping of the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappingOutcome {
    pub delay: f64,
    pub area: f64,
    pub level: u32,
}

/// Scores outcomes relative to the first one seen:
/// `delay / base_delay + area / base_area`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelativeObjective {
    baseline: Option<MappingOutcome>,
}

impl RelativeObjective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baseline(&self) -> Option<&MappingOutcome> {
        self.baseline.as_ref()
    }

    pub fn score(&mut self, outcome: MappingOutcome) -> Result<f64, EvaluationFailure> {
        let base = match self.baseline {
            Some(base) => base,
            None => {
                if outcome.delay <= 0.0 || outcome.area <= 0.0 {
                    return Err(EvaluationFailure::malformed_output(format!(
                        "baseline needs positive delay and area, got delay {} area {}",
                        outcome.delay, outcome.area
                    )));
                }
                debug!(delay = outcome.delay, area = outcome.area, "baseline outcome");
                self.baseline = Some(outcome);
                outcome
            }
        };
        Ok(outcome.delay / base.delay + outcome.area / base.area)
    }
}

/// Adapts a mapping flow, given as a closure, into an [`Evaluator`].
pub struct MappingEvaluator<F> {
    run: F,
    objective: RelativeObjective,
}

impl<F> MappingEvaluator<F>
where
    F: FnMut(&[f64]) -> Result<MappingOutcome, EvaluationFailure> + Send,
{
    pub fn new(run: F) -> Self {
        Self {
            run,
            objective: RelativeObjective::new(),
        }
    }

    pub fn objective(&self) -> &RelativeObjective {
        &self.objective
    }
}

impl<F> Evaluator for MappingEvaluator<F>
where
    F: FnMut(&[f64]) -> Result<MappingOutcome, EvaluationFailure> + Send,
{
    fn evaluate(&mut self, candidate: &[f64]) -> Result<f64, EvaluationFailure> {
        let outcome = (self.run)(candidate)?;
        self.objective.score(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use dt_types::FailureKind;

    fn outcome(delay: f64, area: f64) -> MappingOutcome {
        MappingOutcome {
            delay,
            area,
            level: 20,
        }
    }

    #[test]
    fn bowl_minimum_at_center() {
        let mut bowl = QuadraticBowl::default();
        assert_eq!(bowl.evaluate(&[0.5, 0.5, 0.5]).unwrap(), 0.0);
        assert_abs_diff_eq!(bowl.evaluate(&[0.0, 1.0]).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn relative_objective_uses_first_outcome() {
        let mut objective = RelativeObjective::new();
        assert_abs_diff_eq!(objective.score(outcome(2613.78, 1565.0)).unwrap(), 2.0);
        assert_abs_diff_eq!(
            objective.score(outcome(1306.89, 1565.0)).unwrap(),
            1.5,
            epsilon = 1e-12
        );
        assert_eq!(objective.baseline().unwrap().delay, 2613.78);
    }

    #[test]
    fn zero_baseline_is_malformed() {
        let mut objective = RelativeObjective::new();
        let err = objective.score(outcome(0.0, 10.0)).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedOutput);
        assert!(objective.baseline().is_none());
    }

    #[test]
    fn mapping_evaluator_propagates_failures() {
        let mut calls = 0;
        let mut evaluator = MappingEvaluator::new(move |x: &[f64]| {
            calls += 1;
            if calls == 1 {
                return Err(EvaluationFailure::tool_crash("abc killed"));
            }
            Ok(outcome(100.0 * x[0], 50.0))
        });

        let err = evaluator.evaluate(&[1.0]).unwrap_err();
        assert_eq!(err.kind, FailureKind::ToolCrash);
        // the failed call must not become the baseline
        assert!(evaluator.objective().baseline().is_none());

        assert_abs_diff_eq!(evaluator.evaluate(&[1.0]).unwrap(), 2.0);
        assert_abs_diff_eq!(evaluator.evaluate(&[0.5]).unwrap(), 1.5);
    }
}
