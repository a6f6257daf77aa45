/// bar.rs — OHLCV bar primitive
///
/// Immutable per-bar record. `date` is a UTC day boundary expressed as
/// integer seconds since epoch, matching the data port's wire format.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub code: String,
    pub exchange: String,
    pub date: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Typical price: (high + low + close) / 3.
    pub fn typical(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// True range against the previous bar's close.
    /// `prev_close = None` on the first bar of a series: TR = high - low.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            None => self.high - self.low,
            Some(pc) => {
                let a = self.high - self.low;
                let b = (self.high - pc).abs();
                let c = (pc - self.low).abs();
                a.max(b).max(c)
            }
        }
    }

    pub fn date_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.date, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn date_naive(&self) -> NaiveDate {
        self.date_utc().date_naive()
    }
}

/// Price field selector used by rule operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub fn resolve(self, bar: &Bar) -> f64 {
        match self {
            PriceField::Open => bar.open,
            PriceField::High => bar.high,
            PriceField::Low => bar.low,
            PriceField::Close => bar.close,
            PriceField::Volume => bar.volume as f64,
        }
    }
}
