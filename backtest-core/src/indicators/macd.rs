/// indicators/macd.rs — MACD (fast EMA - slow EMA, signal, histogram)
use super::{IndicatorKind, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::bar::Bar;
use crate::error::{CoreError, CoreResult};

fn valid(line: f64, signal: f64) -> IndicatorValue {
    IndicatorValue::Macd { valid: true, line, signal, histogram: line - signal }
}

/// MACD line = fast EMA - slow EMA of close, from index slow-1. Signal =
/// EMA(signal) of the MACD line, seeded as the running mean of the first
/// `signal` MACD values exactly as EMA seeding works. Histogram = line -
/// signal.
pub fn macd(bars: &[Bar], fast: usize, slow: usize, signal: usize) -> CoreResult<IndicatorSeries> {
    super::require_nonempty(bars)?;
    if fast == 0 || slow == 0 || signal == 0 {
        return Err(CoreError::InvalidArgument("MACD periods must be > 0".into()));
    }
    if fast >= slow {
        return Err(CoreError::InvalidArgument("MACD fast period must be < slow period".into()));
    }
    let n = bars.len();
    let mut series = IndicatorSeries::new_invalid(
        IndicatorKind::Macd,
        IndicatorParams::macd(fast, slow, signal),
        n,
    );
    if n < slow {
        return Ok(series);
    }

    let fast_ema = super::scalar::ema(bars, fast)?;
    let slow_ema = super::scalar::ema(bars, slow)?;

    let mut macd_line = vec![0.0f64; n];
    for i in (slow - 1)..n {
        let f = match fast_ema.get(i).unwrap() {
            IndicatorValue::Scalar { value, .. } => *value,
            _ => unreachable!(),
        };
        let s = match slow_ema.get(i).unwrap() {
            IndicatorValue::Scalar { value, .. } => *value,
            _ => unreachable!(),
        };
        macd_line[i] = f - s;
    }

    // Signal: seed at index (slow-1)+(signal-1) with the running mean of
    // the first `signal` MACD-line values, then EMA-smooth thereafter.
    let seed_idx = slow - 1 + signal - 1;
    if seed_idx >= n {
        return Ok(series);
    }
    let k = 2.0 / (signal as f64 + 1.0);
    let seed: f64 = macd_line[(slow - 1)..=seed_idx].iter().sum::<f64>() / signal as f64;
    series.set(seed_idx, valid(macd_line[seed_idx], seed))?;
    let mut prev_signal = seed;
    for i in (seed_idx + 1)..n {
        let sig = macd_line[i] * k + prev_signal * (1.0 - k);
        series.set(i, valid(macd_line[i], sig))?;
        prev_signal = sig;
    }
    Ok(series)
}
