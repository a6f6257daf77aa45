/// universe.rs — Universe parsing and validation
///
/// `parse_universe` is a pure text operation. `validate_universe` is the
/// operation that actually touches the data port: it classifies each code
/// as loaded or dropped-with-reason, enforcing the minimum-bar requirement
/// uniformly without treating a single thin instrument as a hard abort.
use crate::bar::Bar;
use crate::error::{CoreError, CoreResult};
use crate::ports::DataPort;

pub const MIN_OHLCV_BARS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub codes: Vec<String>,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
    FetchFailed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct ValidatedUniverse {
    pub universe: Universe,
    pub bars_by_code: Vec<(String, Vec<Bar>)>,
    pub skipped: Vec<SkippedCode>,
}

/// Split a comma-separated code list, trimming whitespace and rejecting
/// empty entries.
pub fn parse_universe(text: &str, exchange: &str) -> CoreResult<Universe> {
    let codes: Vec<String> = text
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if codes.is_empty() {
        return Err(CoreError::InvalidArgument("universe code list is empty".into()));
    }
    Ok(Universe { codes, exchange: exchange.to_string() })
}

/// Fetch bars for every code, classify loadability, and return only the
/// codes that cleared the minimum-bar bar. Aborts only if every code fails.
pub fn validate_universe(
    port: &dyn DataPort,
    codes: Vec<String>,
    exchange: &str,
    start: i64,
    end: i64,
) -> CoreResult<ValidatedUniverse> {
    let mut bars_by_code = Vec::new();
    let mut skipped = Vec::new();

    for code in &codes {
        match port.fetch_ohlcv(code, exchange, start, end) {
            Ok(bars) if bars.is_empty() => {
                skipped.push(SkippedCode { code: code.clone(), reason: SkipReason::NoData });
            }
            Ok(bars) if bars.len() < MIN_OHLCV_BARS => {
                let n = bars.len();
                skipped.push(SkippedCode { code: code.clone(), reason: SkipReason::InsufficientBars { bars: n } });
            }
            Ok(bars) => bars_by_code.push((code.clone(), bars)),
            Err(e) => {
                skipped.push(SkippedCode { code: code.clone(), reason: SkipReason::FetchFailed { message: e.to_string() } });
            }
        }
    }

    if bars_by_code.is_empty() {
        return Err(CoreError::InsufficientData("no instrument in the universe has enough bars to backtest".into()));
    }

    let loaded_codes: Vec<String> = bars_by_code.iter().map(|(c, _)| c.clone()).collect();
    Ok(ValidatedUniverse {
        universe: Universe { codes: loaded_codes, exchange: exchange.to_string() },
        bars_by_code,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockPort {
        bars: HashMap<String, Vec<Bar>>,
        errors: HashMap<String, String>,
    }

    impl DataPort for MockPort {
        fn fetch_ohlcv(&self, code: &str, _exchange: &str, _start: i64, _end: i64) -> CoreResult<Vec<Bar>> {
            if let Some(msg) = self.errors.get(code) {
                return Err(CoreError::InsufficientData(msg.clone()));
            }
            Ok(self.bars.get(code).cloned().unwrap_or_default())
        }

        fn list_symbols(&self, _exchange: &str) -> CoreResult<Vec<String>> {
            Ok(self.bars.keys().cloned().collect())
        }
    }

    fn gen_bars(code: &str, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar { code: code.into(), exchange: "ASX".into(), date: i as i64 * 86400, open: 100.0, high: 101.0, low: 99.0, close: 100.0, volume: 1000 })
            .collect()
    }

    #[test]
    fn parse_universe_splits_and_trims() {
        let u = parse_universe(" BHP, CBA ,RIO", "ASX").unwrap();
        assert_eq!(u.codes, vec!["BHP", "CBA", "RIO"]);
    }

    #[test]
    fn parse_universe_rejects_empty() {
        assert!(parse_universe("", "ASX").is_err());
        assert!(parse_universe(" , ", "ASX").is_err());
    }

    #[test]
    fn validate_universe_drops_insufficient_bars() {
        let port = MockPort {
            bars: HashMap::from([("GOOD".to_string(), gen_bars("GOOD", 50)), ("FEW".to_string(), gen_bars("FEW", 10))]),
            errors: HashMap::new(),
        };
        let result = validate_universe(&port, vec!["GOOD".into(), "FEW".into()], "ASX", 0, 1).unwrap();
        assert_eq!(result.universe.codes, vec!["GOOD"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].code, "FEW");
        assert!(matches!(result.skipped[0].reason, SkipReason::InsufficientBars { bars: 10 }));
    }

    #[test]
    fn validate_universe_drops_missing_code() {
        let port = MockPort { bars: HashMap::from([("GOOD".to_string(), gen_bars("GOOD", 50))]), errors: HashMap::new() };
        let result = validate_universe(&port, vec!["GOOD".into(), "MISSING".into()], "ASX", 0, 1).unwrap();
        assert_eq!(result.skipped[0].code, "MISSING");
        assert!(matches!(result.skipped[0].reason, SkipReason::NoData));
    }

    #[test]
    fn validate_universe_fails_only_when_everything_fails() {
        let port = MockPort { bars: HashMap::new(), errors: HashMap::new() };
        let result = validate_universe(&port, vec!["A".into(), "B".into()], "ASX", 0, 1);
        assert!(result.is_err());
    }

    #[test]
    fn validate_universe_exact_minimum_is_valid() {
        let port = MockPort { bars: HashMap::from([("EXACT".to_string(), gen_bars("EXACT", MIN_OHLCV_BARS))]), errors: HashMap::new() };
        let result = validate_universe(&port, vec!["EXACT".into()], "ASX", 0, 1).unwrap();
        assert!(result.skipped.is_empty());
        assert_eq!(result.universe.codes, vec!["EXACT"]);
    }
}
