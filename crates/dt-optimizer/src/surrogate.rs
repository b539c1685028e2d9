//! Surrogate models and acquisition rules.
//!
//! The optimizer only depends on the [`Surrogate`] trait: fit on the full
//! observation history, then score candidate points. [`GaussianProcess`] is the
//! default implementation; any regression model (or a test stub) can take its
//! place.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use dt_types::{Candidate, Observation, TuneError, TuneResult};

use crate::space::ParameterSpace;

/// A regression model fit on observations and queried through an acquisition
/// rule.
pub trait Surrogate: Send {
    /// Fit (or refit) on every observation recorded so far.
    fn fit(&mut self, space: &ParameterSpace, observations: &[Observation]) -> TuneResult<()>;

    /// Score candidates; a higher score means more worth evaluating next.
    fn acquire(&self, candidates: &[Candidate]) -> TuneResult<Vec<f64>>;

    /// Human-readable model name.
    fn name(&self) -> &str;
}

/// Rule turning a predictive mean and deviation into an acquisition score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Acquisition {
    /// Negated lower confidence bound `-(mu - kappa * sigma)`.
    LowerConfidenceBound { kappa: f64 },
    /// Expected improvement over the best observed value, with margin `xi`.
    ExpectedImprovement { xi: f64 },
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::LowerConfidenceBound { kappa: 2.0 }
    }
}

impl Acquisition {
    pub fn score(&self, mean: f64, std_dev: f64, best: f64) -> f64 {
        match *self {
            Self::LowerConfidenceBound { kappa } => kappa * std_dev - mean,
            Self::ExpectedImprovement { xi } => {
                let improvement = best - mean - xi;
                if std_dev <= 1e-12 {
                    return improvement.max(0.0);
                }
                let z = improvement / std_dev;
                (improvement * normal_cdf(z) + std_dev * normal_pdf(z)).max(0.0)
            }
        }
    }
}

/// Gaussian process hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianProcessConfig {
    /// Kernel length scale in unit-cube coordinates. `None` uses the median
    /// pairwise distance between training points.
    pub length_scale: Option<f64>,
    pub signal_variance: f64,
    /// Observation noise added to the kernel diagonal (standardized units).
    pub noise: f64,
    pub acquisition: Acquisition,
}

impl Default for GaussianProcessConfig {
    fn default() -> Self {
        Self {
            length_scale: None,
            signal_variance: 1.0,
            noise: 1e-6,
            acquisition: Acquisition::default(),
        }
    }
}

impl GaussianProcessConfig {
    pub fn with_length_scale(mut self, length_scale: f64) -> Self {
        self.length_scale = Some(length_scale);
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_acquisition(mut self, acquisition: Acquisition) -> Self {
        self.acquisition = acquisition;
        self
    }
}

#[derive(Debug, Clone)]
struct FittedModel {
    space: ParameterSpace,
    inputs: Vec<Vec<f64>>,
    chol: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
    y_best: f64,
}

/// Gaussian process regression with a squared-exponential kernel.
#[derive(Debug, Clone, Default)]
pub struct GaussianProcess {
    config: GaussianProcessConfig,
    fitted: Option<FittedModel>,
}

impl GaussianProcess {
    pub fn new(config: GaussianProcessConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &GaussianProcessConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Posterior mean and standard deviation at `candidate`, in objective units.
    pub fn predict(&self, candidate: &[f64]) -> TuneResult<(f64, f64)> {
        let model = self.fitted()?;
        if candidate.len() != model.space.dimensionality() {
            return Err(TuneError::ShapeMismatch {
                expected: model.space.dimensionality(),
                actual: candidate.len(),
            });
        }
        Ok(self.predict_unit(model, &model.space.to_unit(candidate)))
    }

    fn fitted(&self) -> TuneResult<&FittedModel> {
        self.fitted
            .as_ref()
            .ok_or_else(|| TuneError::Surrogate("gaussian process has not been fit".into()))
    }

    fn kernel(&self, a: &[f64], b: &[f64], length_scale: f64) -> f64 {
        let sq_dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
        self.config.signal_variance * (-0.5 * sq_dist / (length_scale * length_scale)).exp()
    }

    fn predict_unit(&self, model: &FittedModel, unit: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = model
            .inputs
            .iter()
            .map(|x| self.kernel(unit, x, model.length_scale))
            .collect();
        let mean = dot(&k_star, &model.alpha);
        let v = forward_substitute(&model.chol, &k_star);
        let variance = (self.config.signal_variance - dot(&v, &v)).max(0.0);
        (
            model.y_mean + model.y_std * mean,
            model.y_std * variance.sqrt(),
        )
    }
}

impl Surrogate for GaussianProcess {
    fn fit(&mut self, space: &ParameterSpace, observations: &[Observation]) -> TuneResult<()> {
        if observations.is_empty() {
            return Err(TuneError::NoObservations);
        }

        let inputs: Vec<Vec<f64>> = observations
            .iter()
            .map(|obs| space.to_unit(obs.candidate()))
            .collect();
        let values: Vec<f64> = observations.iter().map(Observation::value).collect();

        let n = values.len() as f64;
        let y_mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = if variance.sqrt() > 1e-12 {
            variance.sqrt()
        } else {
            1.0
        };
        let targets: Vec<f64> = values.iter().map(|y| (y - y_mean) / y_std).collect();
        let y_best = values.iter().copied().fold(f64::INFINITY, f64::min);

        let length_scale = self
            .config
            .length_scale
            .unwrap_or_else(|| median_distance(&inputs, space.dimensionality()));

        let mut gram: Vec<Vec<f64>> = inputs
            .iter()
            .map(|a| {
                inputs
                    .iter()
                    .map(|b| self.kernel(a, b, length_scale))
                    .collect()
            })
            .collect();

        let mut jitter = self.config.noise.max(1e-10);
        let mut added = 0.0;
        let mut chol = None;
        for _ in 0..8 {
            for (i, row) in gram.iter_mut().enumerate() {
                row[i] += jitter - added;
            }
            added = jitter;
            if let Some(l) = cholesky(&gram) {
                chol = Some(l);
                break;
            }
            tracing::debug!("cholesky failed with jitter {jitter:e}, retrying");
            jitter *= 10.0;
        }
        let chol = chol.ok_or_else(|| {
            TuneError::Surrogate(format!(
                "kernel matrix of {} points is not positive definite",
                inputs.len()
            ))
        })?;

        let z = forward_substitute(&chol, &targets);
        let alpha = backward_substitute(&chol, &z);

        self.fitted = Some(FittedModel {
            space: space.clone(),
            inputs,
            chol,
            alpha,
            length_scale,
            y_mean,
            y_std,
            y_best,
        });
        Ok(())
    }

    fn acquire(&self, candidates: &[Candidate]) -> TuneResult<Vec<f64>> {
        let model = self.fitted()?;
        candidates
            .iter()
            .map(|candidate| {
                if candidate.len() != model.space.dimensionality() {
                    return Err(TuneError::ShapeMismatch {
                        expected: model.space.dimensionality(),
                        actual: candidate.len(),
                    });
                }
                let (mean, std_dev) = self.predict_unit(model, &model.space.to_unit(candidate));
                Ok(self.config.acquisition.score(mean, std_dev, model.y_best))
            })
            .collect()
    }

    fn name(&self) -> &str {
        "gp"
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Median pairwise distance, falling back to half the cube diagonal.
fn median_distance(points: &[Vec<f64>], dims: usize) -> f64 {
    let mut distances: Vec<f64> = Vec::new();
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let d = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt();
            if d > 0.0 {
                distances.push(d);
            }
        }
    }
    if distances.is_empty() {
        return 0.5 * (dims as f64).sqrt();
    }
    distances.sort_by(|a, b| a.total_cmp(b));
    distances[distances.len() / 2]
}

/// Lower-triangular factor `L` with `L * L^T = matrix`, or `None` if the
/// matrix is not positive definite.
fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][i] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solve `L x = b`.
fn forward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; b.len()];
    for i in 0..b.len() {
        let sum: f64 = (0..i).map(|k| l[i][k] * x[k]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}

/// Solve `L^T x = b`.
fn backward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}
