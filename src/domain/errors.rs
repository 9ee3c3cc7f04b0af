use thiserror::Error;

/// Errors raised while backtesting a single candidate.
///
/// `DataUnavailable` and `InsufficientHistory` are recovered inside the
/// evaluator (they become neutral zero-metric results); only genuine
/// failures reach the batch layer, where they are logged and the candidate
/// is dropped without aborting its siblings.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("no price data available for {symbol}")]
    DataUnavailable { symbol: String },

    #[error("insufficient history: {bars} bars, need at least {required}")]
    InsufficientHistory { bars: usize, required: usize },

    #[error("invalid candidate parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("backtest failed for candidate {candidate_id}: {reason}")]
    ExecutionFailed {
        candidate_id: String,
        reason: String,
    },
}

/// Errors internal to the state store. Callers treat a load failure as a
/// cold start and a save failure as a logged, non-fatal event.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state document {path}: {reason}")]
    Corrupt { path: String, reason: String },
}
