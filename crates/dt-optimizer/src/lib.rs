//! # dt-optimizer
//!
//! Black-box tuning engine for the mapper's delay parameters.
//!
//! Provides the bounded parameter space, the append-only observation ledger,
//! the pluggable surrogate contract with a Gaussian-process default, and the
//! ask/tell optimizer that ties them together.

mod ledger;
mod optimizer;
mod space;
mod surrogate;

pub use ledger::ObservationLedger;
pub use optimizer::{InitialDesign, Optimizer, OptimizerConfig, MAX_BATCH_SIZE};
pub use space::{DomainKind, ParameterSpace, ParameterSpec};
pub use surrogate::{Acquisition, GaussianProcess, GaussianProcessConfig, Surrogate};
