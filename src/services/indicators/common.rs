// src/services/indicators/common.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw OHLCV candle as stored by the candle collector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open:      f64,
    pub high:      f64,
    pub low:       f64,
    pub close:     f64,
    #[serde(default)]
    pub volume:    f64,
}

/// Anything that looks like a candle. Lets the smoothing transforms run on
/// raw candles and on their own output alike.
pub trait Ohlc {
    fn open_time(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
}

impl Ohlc for Candle {
    fn open_time(&self) -> DateTime<Utc> { self.open_time }
    fn open(&self) -> f64 { self.open }
    fn high(&self) -> f64 { self.high }
    fn low(&self) -> f64 { self.low }
    fn close(&self) -> f64 { self.close }
}

/// Lowest low and highest high of a window, `None` when empty.
pub fn price_range(candles: &[Candle]) -> Option<(f64, f64)> {
    if candles.is_empty() {
        return None;
    }
    let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    Some((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn range_of_window() {
        let t = Utc.timestamp_millis_opt(0).unwrap();
        let mk = |l, h| Candle { open_time: t, open: 0.0, high: h, low: l, close: 0.0, volume: 0.0 };
        assert_eq!(price_range(&[]), None);
        assert_eq!(price_range(&[mk(5.0, 9.0), mk(3.0, 7.0), mk(4.0, 11.0)]), Some((3.0, 11.0)));
    }
}
