/// ports.rs — Core-facing port contracts
///
/// The core consumes these traits; concrete adapters (Postgres, INI config,
/// a text report writer) live outside this crate. Failure surfaces as
/// `Err`/empty results, never a panic.
use std::path::Path;

use crate::bar::Bar;
use crate::backtest::{BacktestResult, MultiBacktestResult};
use crate::error::CoreResult;
use crate::strategy::Strategy;

pub trait DataPort {
    /// Bars ascending by date, dates in [start, end] inclusive. Empty (not
    /// an error) means "no data" to the universe loader.
    fn fetch_ohlcv(&self, code: &str, exchange: &str, start: i64, end: i64) -> CoreResult<Vec<Bar>>;
    fn list_symbols(&self, exchange: &str) -> CoreResult<Vec<String>>;
}

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str, default: &str) -> String;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_float(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}

pub trait ReportPort {
    fn write(&self, result: &BacktestResult, strategy: &Strategy, path: &Path) -> CoreResult<()>;
    fn write_multi(&self, result: &MultiBacktestResult, strategy: &Strategy, path: &Path) -> CoreResult<()> {
        let _ = (result, strategy, path);
        Ok(())
    }
}
