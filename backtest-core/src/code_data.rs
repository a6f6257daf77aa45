/// code_data.rs — Per-instrument data, indicator pre-computation, and the unified timeline
use std::collections::HashMap;

use ahash::AHashMap;

use crate::bar::Bar;
use crate::error::CoreResult;
use crate::indicators::{self, indicator_key, IndicatorSeries};
use crate::strategy::Strategy;

/// One instrument's bars plus every indicator series its strategy's rules
/// reference, built once at backtest start and read-only thereafter.
#[derive(Debug, Clone)]
pub struct CodeData {
    pub code: String,
    pub exchange: String,
    pub bars: Vec<Bar>,
    pub indicators: HashMap<String, IndicatorSeries>,
    /// date (seconds since epoch) -> index into `bars`. Looked up once per
    /// bar per instrument in the backtest's hot loop, so this uses the
    /// faster non-cryptographic hasher rather than the default SipHash.
    pub date_index: AHashMap<i64, usize>,
}

impl CodeData {
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }
}

/// Wrap fetched bars in a `CodeData` with an empty indicator map and a
/// populated date index.
pub fn load_code_data(code: &str, exchange: &str, bars: Vec<Bar>) -> CodeData {
    let date_index = build_date_index(&bars);
    CodeData { code: code.to_string(), exchange: exchange.to_string(), bars, indicators: HashMap::new(), date_index }
}

/// Walk every rule the strategy references, collect the distinct indicator
/// keys, and compute each exactly once.
pub fn compute_indicators(code_data: &mut CodeData, strategy: &Strategy) -> CoreResult<()> {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for rule in strategy.rules() {
        collect_indicator_refs(rule, &mut seen);
    }
    for key_and_spec in seen {
        let (kind, params) = decode_key(&key_and_spec);
        let series = indicators::compute(kind, &code_data.bars, params)?;
        code_data.indicators.insert(indicator_key(kind, &params), series);
    }
    Ok(())
}

/// Collect `"kind|period|period2|period3|param"` encodings for every
/// indicator operand reachable from `rule`, used as an intermediate set key
/// before dispatching `indicators::compute` (the encoding is decoded right
/// back into `(IndicatorKind, IndicatorParams)`; the canonical string key
/// used for storage/lookup is `indicator_key`, not this encoding).
fn collect_indicator_refs(rule: &crate::rule::Rule, seen: &mut std::collections::HashSet<String>) {
    use crate::rule::{Operand, Rule};

    fn visit_operand(op: &Operand, seen: &mut std::collections::HashSet<String>) {
        if let Operand::Indicator { kind, params, .. } = op {
            seen.insert(encode_key(*kind, params));
        }
    }

    match rule {
        Rule::Compare { left, right, .. } => {
            visit_operand(left, seen);
            visit_operand(right, seen);
        }
        Rule::Between { left, lower, upper } => {
            visit_operand(left, seen);
            visit_operand(lower, seen);
            visit_operand(upper, seen);
        }
        Rule::And(children) | Rule::Or(children) => {
            for c in children {
                collect_indicator_refs(c, seen);
            }
        }
        Rule::Not(child) | Rule::Consecutive { child, .. } | Rule::AnyOf { child, .. } => {
            collect_indicator_refs(child, seen);
        }
    }
}

fn encode_key(kind: indicators::IndicatorKind, params: &indicators::IndicatorParams) -> String {
    format!("{:?}|{}|{}|{}|{}", kind, params.period, params.period2, params.period3, params.param)
}

fn decode_key(encoded: &str) -> (indicators::IndicatorKind, indicators::IndicatorParams) {
    use indicators::IndicatorKind::*;
    let mut parts = encoded.split('|');
    let kind_str = parts.next().unwrap();
    let period: usize = parts.next().unwrap().parse().unwrap();
    let period2: usize = parts.next().unwrap().parse().unwrap();
    let period3: usize = parts.next().unwrap().parse().unwrap();
    let param: f64 = parts.next().unwrap().parse().unwrap();
    let kind = match kind_str {
        "Sma" => Sma,
        "Ema" => Ema,
        "Wma" => Wma,
        "Rsi" => Rsi,
        "Atr" => Atr,
        "Roc" => Roc,
        "Stddev" => Stddev,
        "Obv" => Obv,
        "Vwap" => Vwap,
        "Macd" => Macd,
        "Bollinger" => Bollinger,
        "Stochastic" => Stochastic,
        "Pivot" => Pivot,
        other => unreachable!("unknown indicator kind encoding: {other}"),
    };
    (kind, indicators::IndicatorParams { period, period2, period3, param })
}

/// Union of all per-instrument bar dates, sorted ascending, deduplicated.
pub fn build_timeline(code_data_list: &[CodeData]) -> Vec<i64> {
    let mut dates: Vec<i64> = code_data_list.iter().flat_map(|cd| cd.bars.iter().map(|b| b.date)).collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// date -> bar index for one instrument's bar series.
pub fn build_date_index(bars: &[Bar]) -> AHashMap<i64, usize> {
    bars.iter().enumerate().map(|(i, b)| (b.date, i)).collect()
}
