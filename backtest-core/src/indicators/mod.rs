/// indicators/mod.rs — Indicator engine
///
/// Every indicator function is a pure mapping `(bars, params) -> IndicatorSeries`
/// with length equal to `bars.len()`. Positions before the indicator's
/// warm-up horizon carry `valid = false` and a zero payload.
pub mod bollinger;
pub mod macd;
pub mod pivot;
pub mod scalar;
pub mod stochastic;

use crate::bar::Bar;
use crate::error::{CoreError, CoreResult};

/// Declared indicator family. Drives both dispatch and the canonical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Wma,
    Rsi,
    Atr,
    Roc,
    Stddev,
    Obv,
    Vwap,
    Macd,
    Bollinger,
    Stochastic,
    Pivot,
}

/// Parameters shared by every indicator variant. Unused fields are left at
/// their default (0) for indicators that don't need them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorParams {
    pub period: usize,
    pub period2: usize,
    pub period3: usize,
    pub param: f64,
}

impl IndicatorParams {
    pub fn period(n: usize) -> Self {
        Self { period: n, period2: 0, period3: 0, param: 0.0 }
    }

    pub fn macd(fast: usize, slow: usize, signal: usize) -> Self {
        Self { period: fast, period2: slow, period3: signal, param: 0.0 }
    }

    pub fn bollinger(n: usize, mult: f64) -> Self {
        Self { period: n, period2: 0, period3: 0, param: mult }
    }

    pub fn stochastic(k: usize, d: usize) -> Self {
        Self { period: k, period2: d, period3: 0, param: 0.0 }
    }
}

/// One bar's worth of indicator output. The active variant must match the
/// series' declared `IndicatorKind`; constructors reject mismatches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Scalar { valid: bool, value: f64 },
    Macd { valid: bool, line: f64, signal: f64, histogram: f64 },
    Bollinger { valid: bool, upper: f64, middle: f64, lower: f64 },
    Stochastic { valid: bool, k: f64, d: f64 },
    Pivot { valid: bool, pivot: f64, r1: f64, r2: f64, r3: f64, s1: f64, s2: f64, s3: f64 },
}

impl IndicatorValue {
    pub fn is_valid(&self) -> bool {
        match *self {
            IndicatorValue::Scalar { valid, .. }
            | IndicatorValue::Macd { valid, .. }
            | IndicatorValue::Bollinger { valid, .. }
            | IndicatorValue::Stochastic { valid, .. }
            | IndicatorValue::Pivot { valid, .. } => valid,
        }
    }

    fn invalid_scalar() -> Self {
        IndicatorValue::Scalar { valid: false, value: 0.0 }
    }

    fn invalid_macd() -> Self {
        IndicatorValue::Macd { valid: false, line: 0.0, signal: 0.0, histogram: 0.0 }
    }

    fn invalid_bollinger() -> Self {
        IndicatorValue::Bollinger { valid: false, upper: 0.0, middle: 0.0, lower: 0.0 }
    }

    fn invalid_stochastic() -> Self {
        IndicatorValue::Stochastic { valid: false, k: 0.0, d: 0.0 }
    }

    fn invalid_pivot() -> Self {
        IndicatorValue::Pivot {
            valid: false,
            pivot: 0.0,
            r1: 0.0,
            r2: 0.0,
            r3: 0.0,
            s1: 0.0,
            s2: 0.0,
            s3: 0.0,
        }
    }
}

/// Dense, index-aligned output of one indicator computation.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub kind: IndicatorKind,
    pub params: IndicatorParams,
    values: Vec<IndicatorValue>,
}

impl IndicatorSeries {
    /// Build a series pre-filled with the invalid sentinel for `kind`, sized
    /// to `len`. Callers write valid values in place as they compute them.
    fn new_invalid(kind: IndicatorKind, params: IndicatorParams, len: usize) -> Self {
        let sentinel = match kind {
            IndicatorKind::Macd => IndicatorValue::invalid_macd(),
            IndicatorKind::Bollinger => IndicatorValue::invalid_bollinger(),
            IndicatorKind::Stochastic => IndicatorValue::invalid_stochastic(),
            IndicatorKind::Pivot => IndicatorValue::invalid_pivot(),
            _ => IndicatorValue::invalid_scalar(),
        };
        Self { kind, params, values: vec![sentinel; len] }
    }

    /// Append-time write that rejects a variant mismatch with the series'
    /// declared kind.
    fn set(&mut self, index: usize, value: IndicatorValue) -> CoreResult<()> {
        if std::mem::discriminant(&self.values[0]) != std::mem::discriminant(&value) {
            return Err(CoreError::Internal(format!(
                "indicator variant mismatch: series is {:?}",
                self.kind
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IndicatorValue> {
        self.values.get(index)
    }
}

/// Canonical de-duplication key for an indicator reference. Bollinger and
/// Pivot sub-field selectors do not vary the key — the whole tuple is
/// computed and stored once.
pub fn indicator_key(kind: IndicatorKind, params: &IndicatorParams) -> String {
    match kind {
        IndicatorKind::Sma => format!("SMA_{}", params.period),
        IndicatorKind::Ema => format!("EMA_{}", params.period),
        IndicatorKind::Wma => format!("WMA_{}", params.period),
        IndicatorKind::Rsi => format!("RSI_{}", params.period),
        IndicatorKind::Atr => format!("ATR_{}", params.period),
        IndicatorKind::Roc => format!("ROC_{}", params.period),
        IndicatorKind::Stddev => format!("STDDEV_{}", params.period),
        IndicatorKind::Obv => "OBV".to_string(),
        IndicatorKind::Vwap => "VWAP".to_string(),
        IndicatorKind::Macd => format!("MACD_{}_{}_{}", params.period, params.period2, params.period3),
        IndicatorKind::Stochastic => format!("STOCHASTIC_{}_{}", params.period, params.period2),
        IndicatorKind::Bollinger => {
            format!("BOLLINGER_{}_{}", params.period, (params.param * 100.0).round() as i64)
        }
        IndicatorKind::Pivot => "PIVOT".to_string(),
    }
}

fn require_nonempty(bars: &[Bar]) -> CoreResult<()> {
    if bars.is_empty() {
        return Err(CoreError::InvalidArgument("bar series is empty".into()));
    }
    Ok(())
}

fn require_positive_period(period: usize) -> CoreResult<()> {
    if period == 0 {
        return Err(CoreError::InvalidArgument("period must be > 0".into()));
    }
    Ok(())
}

/// Compute an indicator series by declared kind and canonical params. This
/// is the single dispatch point the code-data loader calls once per unique
/// key discovered in a strategy's rules.
pub fn compute(kind: IndicatorKind, bars: &[Bar], params: IndicatorParams) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    match kind {
        IndicatorKind::Sma => scalar::sma(bars, params.period),
        IndicatorKind::Ema => scalar::ema(bars, params.period),
        IndicatorKind::Wma => scalar::wma(bars, params.period),
        IndicatorKind::Rsi => scalar::rsi(bars, params.period),
        IndicatorKind::Atr => scalar::atr(bars, params.period),
        IndicatorKind::Roc => scalar::roc(bars, params.period),
        IndicatorKind::Stddev => scalar::stddev(bars, params.period),
        IndicatorKind::Obv => scalar::obv(bars),
        IndicatorKind::Vwap => scalar::vwap(bars),
        IndicatorKind::Macd => macd::macd(bars, params.period, params.period2, params.period3),
        IndicatorKind::Bollinger => bollinger::bollinger(bars, params.period, params.param),
        IndicatorKind::Stochastic => stochastic::stochastic(bars, params.period, params.period2),
        IndicatorKind::Pivot => pivot::pivot(bars),
    }
}
