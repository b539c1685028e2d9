use thiserror::Error;

/// Main error type for the tuning engine.
///
/// Every variant except [`TuneError::Surrogate`] signals a caller bug and is
/// never retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuneError {
    #[error("Invalid parameter space: {message}")]
    InvalidSpace { message: String },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("No observations recorded")]
    NoObservations,

    #[error("Insufficient data: {points} points for {clusters} clusters")]
    InsufficientData { points: usize, clusters: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Non-finite objective value {value} at position {index}")]
    NonFiniteValue { index: usize, value: f64 },

    #[error("Surrogate model error: {0}")]
    Surrogate(String),
}

/// Result type alias for engine operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Broad category of an evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The external synthesis or timing tool exited abnormally.
    ToolCrash,
    /// The tool ran but its log could not be turned into a value.
    MalformedOutput,
    Other,
}

/// An external evaluator could not produce an objective value.
///
/// Opaque to the engine: the tuning driver decides whether to retry, skip or
/// abort.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Evaluation failed ({kind:?}): {message}")]
pub struct EvaluationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl EvaluationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn tool_crash(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ToolCrash, message)
    }

    pub fn malformed_output(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedOutput, message)
    }
}

/// Macro for creating parameter space errors
#[macro_export]
macro_rules! invalid_space {
    ($($arg:tt)*) => {
        $crate::TuneError::InvalidSpace { message: format!($($arg)*) }
    };
}

/// Macro for creating invalid request errors
#[macro_export]
macro_rules! invalid_request {
    ($($arg:tt)*) => {
        $crate::TuneError::InvalidRequest(format!($($arg)*))
    };
}
