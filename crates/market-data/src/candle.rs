use serde::{Deserialize, Serialize};

/// One OHLC price sample for a fixed time bucket of one instrument.
///
/// The field names are the wire format the chart client consumes, so
/// they are serialized as-is. `time` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// All prices are finite and non-negative, and the high/low bracket
    /// holds. Series with a sample violating this are rejected at load.
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0) && self.high >= self.low
    }
}
