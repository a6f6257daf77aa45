/// error.rs — Core error taxonomy
///
/// Every fallible core operation returns `Result<T, CoreError>`. Execution
/// pre-condition failures (enter/exit rejected by the portfolio) are routine
/// control flow and are reported through `ExecutionFailed` but never abort
/// the backtest loop; only `InvalidArgument`, `InsufficientData`,
/// `StrategyInvalid`, and `Internal` abort the current run.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("strategy invalid: {0}")]
    StrategyInvalid(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
