//! Analysis of finished tuning runs.
//!
//! Provides:
//! - Extraction of best-found parameter vectors from run logs
//! - Deterministic k-means clustering of those vectors across runs
//! - Plain-text and JSON-ready report tables

pub mod cluster;
pub mod ingest;
pub mod report;

pub use cluster::{ClusterResult, KMeans, KMeansConfig};
pub use ingest::{BestParamsParser, BestVector, IngestReport, LineFailure, LineFailureReason, BEST_PARAMS_MARKER};
pub use report::{
    ClusterRow, ClusterTable, ComparisonTable, DelayComparison, StageMetrics, StageMetricsBuilder, StageTable,
};
