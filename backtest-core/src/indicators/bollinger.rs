/// indicators/bollinger.rs — Bollinger bands (middle = SMA(n), upper/lower = middle +/- m*sigma)
use super::{IndicatorKind, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::bar::Bar;
use crate::error::CoreResult;

pub fn bollinger(bars: &[Bar], period: usize, mult: f64) -> CoreResult<IndicatorSeries> {
    super::require_nonempty(bars)?;
    super::require_positive_period(period)?;
    let n = bars.len();
    let mut series = IndicatorSeries::new_invalid(IndicatorKind::Bollinger, IndicatorParams::bollinger(period, mult), n);
    if period > n {
        return Ok(series);
    }

    for i in (period - 1)..n {
        let window = &bars[i + 1 - period..=i];
        let mean = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
        let var = window.iter().map(|b| (b.close - mean).powi(2)).sum::<f64>() / period as f64;
        let sigma = var.sqrt();
        series.set(
            i,
            IndicatorValue::Bollinger {
                valid: true,
                upper: mean + mult * sigma,
                middle: mean,
                lower: mean - mult * sigma,
            },
        )?;
    }
    Ok(series)
}
