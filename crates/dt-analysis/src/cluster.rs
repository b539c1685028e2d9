//! Cross-run clustering of best-found parameter vectors.
//!
//! [`KMeans`] runs Lloyd's algorithm from a deterministic maximin
//! initialization, so equal inputs and seeds always give equal centres and
//! labels.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dt_types::{invalid_request, TuneError, TuneResult};

/// Clustering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Seed choosing the first centre.
    pub seed: u64,
    /// Upper bound on assignment/update rounds.
    pub max_iterations: usize,
    /// Decimal places used when centres are reported.
    pub report_precision: u32,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_iterations: 300,
            report_precision: 2,
        }
    }
}

impl KMeansConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_report_precision(mut self, decimals: u32) -> Self {
        self.report_precision = decimals;
        self
    }
}

/// Outcome of one clustering pass. Centres are kept at full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub centers: Vec<Vec<f64>>,
    /// Cluster index for each input vector, in input order.
    pub labels: Vec<usize>,
    pub iterations: usize,
    /// False if the iteration cap stopped the loop before assignments settled.
    pub converged: bool,
    /// Sum of squared distances from each vector to its centre.
    pub inertia: f64,
    pub report_precision: u32,
}

impl ClusterResult {
    pub fn k(&self) -> usize {
        self.centers.len()
    }

    /// Number of vectors assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centers.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Centres rounded for human consumption.
    pub fn rounded_centers(&self, decimals: u32) -> Vec<Vec<f64>> {
        let factor = 10f64.powi(decimals as i32);
        self.centers
            .iter()
            .map(|c| c.iter().map(|v| (v * factor).round() / factor).collect())
            .collect()
    }

    /// Centres rounded to the configured report precision.
    pub fn report_centers(&self) -> Vec<Vec<f64>> {
        self.rounded_centers(self.report_precision)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    pub fn cluster(&self, vectors: &[Vec<f64>], k: usize) -> TuneResult<ClusterResult> {
        if k == 0 {
            return Err(invalid_request!("number of clusters must be at least 1"));
        }
        if vectors.len() < k {
            return Err(TuneError::InsufficientData {
                points: vectors.len(),
                clusters: k,
            });
        }
        let dims = vectors[0].len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(TuneError::ShapeMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }

        let mut centers = self.initial_centers(vectors, k);
        let mut labels = assign(vectors, &centers);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            centers = update_centers(vectors, &labels, &centers);
            let next = assign(vectors, &centers);
            if next == labels {
                converged = true;
                break;
            }
            labels = next;
        }

        let inertia: f64 = vectors
            .iter()
            .zip(&labels)
            .map(|(v, &label)| squared_distance(v, &centers[label]))
            .sum();

        debug!(k, iterations, converged, inertia, "k-means finished");

        Ok(ClusterResult {
            centers,
            labels,
            iterations,
            converged,
            inertia,
            report_precision: self.config.report_precision,
        })
    }

    /// First centre drawn by the seeded RNG, each next one the point farthest
    /// from every centre chosen so far (ties to the lowest index).
    fn initial_centers(&self, vectors: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let first = rng.random_range(0..vectors.len());
        let mut chosen = vec![first];
        let mut nearest: Vec<f64> = vectors
            .iter()
            .map(|v| squared_distance(v, &vectors[first]))
            .collect();

        while chosen.len() < k {
            let mut pick = 0;
            for (i, &d) in nearest.iter().enumerate() {
                if d > nearest[pick] {
                    pick = i;
                }
            }
            // Only duplicates remain: take the first point not yet used.
            if nearest[pick] == 0.0 {
                pick = (0..vectors.len())
                    .find(|i| !chosen.contains(i))
                    .unwrap_or(pick);
            }
            chosen.push(pick);
            for (d, v) in nearest.iter_mut().zip(vectors) {
                *d = d.min(squared_distance(v, &vectors[pick]));
            }
        }

        chosen.into_iter().map(|i| vectors[i].clone()).collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest_center(vector: &[f64], centers: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = squared_distance(vector, center);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

fn assign(vectors: &[Vec<f64>], centers: &[Vec<f64>]) -> Vec<usize> {
    vectors.iter().map(|v| nearest_center(v, centers)).collect()
}

/// Mean of each cluster's members. An empty cluster takes the vector that is
/// currently farthest from its own centre.
fn update_centers(vectors: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = previous[0].len();
    let mut sums = vec![vec![0.0; dims]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (v, &label) in vectors.iter().zip(labels) {
        counts[label] += 1;
        for (s, x) in sums[label].iter_mut().zip(v) {
            *s += x;
        }
    }

    let mut taken: Vec<usize> = Vec::new();
    sums.into_iter()
        .zip(&counts)
        .enumerate()
        .map(|(cluster, (sum, &count))| -> Vec<f64> {
            if count > 0 {
                return sum.into_iter().map(|s| s / count as f64).collect();
            }
            let far = vectors
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken.contains(i))
                .map(|(i, v)| (i, squared_distance(v, &previous[labels[i]])))
                .fold(None, |acc: Option<(usize, f64)>, (i, d)| match acc {
                    Some((_, best)) if best >= d => acc,
                    _ => Some((i, d)),
                });
            match far {
                Some((i, _)) => {
                    taken.push(i);
                    vectors[i].clone()
                }
                None => previous[cluster].clone(),
            }
        })
        .collect()
}
