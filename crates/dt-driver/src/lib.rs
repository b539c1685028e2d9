//! Reference tuning driver for the delay parameters.
//!
//! Owns the policy the optimizer leaves open: which seeds to start from, how
//! many rounds to run, and what to do when the synthesis flow fails.

pub mod driver;
pub mod evaluator;
pub mod logs;
pub mod seeds;

pub use driver::{run_parallel, DriverError, DriverResult, FailurePolicy, RunConfig, RunSummary, TuningDriver};
pub use evaluator::{Evaluator, MappingEvaluator, MappingOutcome, QuadraticBowl, RelativeObjective};
pub use logs::cluster_report;
pub use seeds::{expert_design, expert_seeds, EXPERT_DESIGN};
