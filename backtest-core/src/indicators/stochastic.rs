/// indicators/stochastic.rs — %K / %D stochastic oscillator
use super::{IndicatorKind, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::bar::Bar;
use crate::error::CoreResult;

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> CoreResult<IndicatorSeries> {
    super::require_nonempty(bars)?;
    super::require_positive_period(k_period)?;
    super::require_positive_period(d_period)?;
    let n = bars.len();
    let mut series = IndicatorSeries::new_invalid(IndicatorKind::Stochastic, IndicatorParams::stochastic(k_period, d_period), n);
    if k_period > n {
        return Ok(series);
    }

    let mut k_values = vec![0.0f64; n];
    let mut k_valid = vec![false; n];
    for i in (k_period - 1)..n {
        let window = &bars[i + 1 - k_period..=i];
        let hh = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let ll = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let k = if (hh - ll).abs() < f64::EPSILON {
            50.0
        } else {
            100.0 * (bars[i].close - ll) / (hh - ll)
        };
        k_values[i] = k;
        k_valid[i] = true;
    }

    let d_start = k_period - 1 + d_period - 1;
    for i in (k_period - 1)..n {
        if i < d_start {
            series.set(i, IndicatorValue::Stochastic { valid: false, k: 0.0, d: 0.0 })?;
            continue;
        }
        let window = &k_values[i + 1 - d_period..=i];
        let d = window.iter().sum::<f64>() / d_period as f64;
        series.set(i, IndicatorValue::Stochastic { valid: true, k: k_values[i], d })?;
    }
    Ok(series)
}
