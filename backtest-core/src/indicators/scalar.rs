/// indicators/scalar.rs — single-value indicator family
///
/// SMA, EMA, WMA, RSI, ATR, ROC, STDDEV, OBV, VWAP. Each function is a pure
/// `(bars, period) -> IndicatorSeries` mapping with its own warm-up horizon.
use super::{require_nonempty, require_positive_period, IndicatorKind, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::bar::Bar;
use crate::error::CoreResult;

fn scalar_series(kind: IndicatorKind, period: usize, len: usize) -> IndicatorSeries {
    IndicatorSeries::new_invalid(kind, IndicatorParams::period(period), len)
}

fn valid(v: f64) -> IndicatorValue {
    IndicatorValue::Scalar { valid: true, value: v }
}

pub fn sma(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Sma, period, n);
    if period > n {
        return Ok(series);
    }
    let mut sum = 0.0;
    for i in 0..n {
        sum += bars[i].close;
        if i >= period {
            sum -= bars[i - period].close;
        }
        if i >= period - 1 {
            series.set(i, valid(sum / period as f64))?;
        }
    }
    Ok(series)
}

pub fn ema(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Ema, period, n);
    if period > n {
        return Ok(series);
    }
    let k = 2.0 / (period as f64 + 1.0);
    // Seed at index period-1 with SMA(period).
    let seed: f64 = bars[0..period].iter().map(|b| b.close).sum::<f64>() / period as f64;
    series.set(period - 1, valid(seed))?;
    let mut prev = seed;
    for i in period..n {
        let e = bars[i].close * k + prev * (1.0 - k);
        series.set(i, valid(e))?;
        prev = e;
    }
    Ok(series)
}

pub fn wma(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Wma, period, n);
    if period > n {
        return Ok(series);
    }
    let denom = (period * (period + 1) / 2) as f64;
    for i in (period - 1)..n {
        let mut weighted = 0.0;
        for (offset, weight) in (1..=period).enumerate() {
            // weight=1 is oldest, weight=period is newest
            let idx = i - period + 1 + offset;
            weighted += bars[idx].close * weight as f64;
        }
        series.set(i, valid(weighted / denom))?;
    }
    Ok(series)
}

/// Wilder's RSI. Boundary rules: avg_loss=0 -> 100, avg_gain=0 -> 0,
/// both zero -> 50.
pub fn rsi(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Rsi, period, n);
    if n <= period {
        return Ok(series);
    }

    let mut sum_gain = 0.0;
    let mut sum_loss = 0.0;
    for i in 1..=period {
        let change = bars[i].close - bars[i - 1].close;
        if change > 0.0 {
            sum_gain += change;
        } else {
            sum_loss += -change;
        }
    }
    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    series.set(period, valid(rsi_from_avgs(avg_gain, avg_loss)))?;

    for i in (period + 1)..n {
        let change = bars[i].close - bars[i - 1].close;
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        series.set(i, valid(rsi_from_avgs(avg_gain, avg_loss)))?;
    }
    Ok(series)
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Wilder-smoothed average true range.
pub fn atr(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Atr, period, n);
    if n < period {
        return Ok(series);
    }

    let tr: Vec<f64> = (0..n)
        .map(|i| {
            let prev_close = if i == 0 { None } else { Some(bars[i - 1].close) };
            bars[i].true_range(prev_close)
        })
        .collect();

    let seed: f64 = tr[0..period].iter().sum::<f64>() / period as f64;
    series.set(period - 1, valid(seed))?;
    let mut prev = seed;
    for i in period..n {
        let a = (prev * (period - 1) as f64 + tr[i]) / period as f64;
        series.set(i, valid(a))?;
        prev = a;
    }
    Ok(series)
}

/// Rate of change: 100 * (close_i - close_{i-n}) / close_{i-n}. Valid from
/// index n.
pub fn roc(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Roc, period, n);
    for i in period..n {
        let base = bars[i - period].close;
        if base != 0.0 {
            series.set(i, valid(100.0 * (bars[i].close - base) / base))?;
        }
    }
    Ok(series)
}

/// Population standard deviation of the last `period` closes. Valid from
/// index period-1.
pub fn stddev(bars: &[Bar], period: usize) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    require_positive_period(period)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Stddev, period, n);
    for i in (period.saturating_sub(1))..n {
        if i + 1 < period {
            continue;
        }
        let window = &bars[i + 1 - period..=i];
        series.set(i, valid(population_stddev(window)))?;
    }
    Ok(series)
}

fn population_stddev(window: &[Bar]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().map(|b| b.close).sum::<f64>() / n;
    let var = window.iter().map(|b| (b.close - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// On-balance volume: running sum, +volume on an up close, -volume on a
/// down close, unchanged on a tie. Valid from index 0.
pub fn obv(bars: &[Bar]) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Obv, 1, n);
    let mut acc = 0.0;
    series.set(0, valid(acc))?;
    for i in 1..n {
        if bars[i].close > bars[i - 1].close {
            acc += bars[i].volume as f64;
        } else if bars[i].close < bars[i - 1].close {
            acc -= bars[i].volume as f64;
        }
        series.set(i, valid(acc))?;
    }
    Ok(series)
}

/// Cumulative volume-weighted average price from the start of the series.
/// Valid from index 0.
pub fn vwap(bars: &[Bar]) -> CoreResult<IndicatorSeries> {
    require_nonempty(bars)?;
    let n = bars.len();
    let mut series = scalar_series(IndicatorKind::Vwap, 1, n);
    let mut pv_sum = 0.0;
    let mut v_sum = 0.0;
    for i in 0..n {
        pv_sum += bars[i].typical() * bars[i].volume as f64;
        v_sum += bars[i].volume as f64;
        let v = if v_sum > 0.0 { pv_sum / v_sum } else { bars[i].typical() };
        series.set(i, valid(v))?;
    }
    Ok(series)
}
