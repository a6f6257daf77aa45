/// indicators/pivot.rs — classic 7-point pivot (P, R1-R3, S1-S3) from the prior bar's HLC
use super::{IndicatorKind, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::bar::Bar;
use crate::error::CoreResult;

/// Index 0 is invalid (no prior bar); index i uses bar i-1's HLC.
pub fn pivot(bars: &[Bar]) -> CoreResult<IndicatorSeries> {
    super::require_nonempty(bars)?;
    let n = bars.len();
    let mut series = IndicatorSeries::new_invalid(IndicatorKind::Pivot, IndicatorParams::period(1), n);
    for i in 1..n {
        let prev = &bars[i - 1];
        let p = (prev.high + prev.low + prev.close) / 3.0;
        let r1 = 2.0 * p - prev.low;
        let r2 = p + (prev.high - prev.low);
        let r3 = prev.high + 2.0 * (p - prev.low);
        let s1 = 2.0 * p - prev.high;
        let s2 = p - (prev.high - prev.low);
        let s3 = prev.low - 2.0 * (prev.high - p);
        series.set(i, IndicatorValue::Pivot { valid: true, pivot: p, r1, r2, r3, s1, s2, s3 })?;
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_holds_for_valid_bars() {
        let bars = vec![
            Bar { code: "T".into(), exchange: "X".into(), date: 0, open: 100.0, high: 110.0, low: 90.0, close: 105.0, volume: 1000 },
            Bar { code: "T".into(), exchange: "X".into(), date: 1, open: 105.0, high: 108.0, low: 95.0, close: 100.0, volume: 1000 },
        ];
        let s = pivot(&bars).unwrap();
        assert!(!s.get(0).unwrap().is_valid());
        if let IndicatorValue::Pivot { valid, pivot, r1, r2, r3, s1, s2, s3 } = s.get(1).unwrap() {
            assert!(*valid);
            assert!(s3 < s2 && s2 < s1 && s1 < pivot && pivot < r1 && r1 < r2 && r2 < r3);
        } else {
            panic!("expected pivot value");
        }
    }
}
