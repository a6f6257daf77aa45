pub mod backtest;
pub mod bar;
pub mod code_data;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod metrics;
pub mod portfolio;
pub mod ports;
pub mod position;
pub mod rule;
pub mod strategy;
pub mod universe;

pub use backtest::{run_backtest, BacktestConfig, BacktestResult, MultiBacktestResult};
pub use bar::Bar;
pub use code_data::{build_date_index, build_timeline, compute_indicators, load_code_data, CodeData};
pub use error::{CoreError, CoreResult};
pub use metrics::{CodeMetrics, Metrics};
pub use portfolio::Portfolio;
pub use ports::{ConfigPort, DataPort, ReportPort};
pub use position::{ClosedTrade, EquityPoint, Position};
pub use rule::{evaluate, CompareOp, Operand, Rule};
pub use strategy::Strategy;
pub use universe::{parse_universe, validate_universe, SkipReason, SkippedCode, Universe, ValidatedUniverse};
