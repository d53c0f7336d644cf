//! Trend analyzers: Heikin-Ashi smoothing and a Kagi-style reversal trend.
//!
//! Both are pure functions over any [`Ohlc`] sequence so they can be chained
//! (Kagi over Heikin-Ashi over Heikin-Ashi).

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::{Data as StatsData, Distribution};

use super::common::Ohlc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeikinAshiCandle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Ohlc for HeikinAshiCandle {
    fn open_time(&self) -> DateTime<Utc> { self.open_time }
    fn open(&self) -> f64 { self.open }
    fn high(&self) -> f64 { self.high }
    fn low(&self) -> f64 { self.low }
    fn close(&self) -> f64 { self.close }
}

/// Left-to-right scan producing one smoothed candle per input candle.
///
/// Each smoothed open depends on the previously *smoothed* candle, so the
/// sequence cannot be computed element-wise. Clone the iterator (or call
/// [`heikin_ashi`] again) to restart it.
#[derive(Debug, Clone)]
pub struct HeikinAshi<'a, C> {
    src: std::slice::Iter<'a, C>,
    prev: Option<HeikinAshiCandle>,
}

impl<'a, C: Ohlc> Iterator for HeikinAshi<'a, C> {
    type Item = HeikinAshiCandle;

    fn next(&mut self) -> Option<Self::Item> {
        let c = self.src.next()?;
        let open = match self.prev {
            None => (c.open() + c.close()) / 2.0,
            Some(p) => (p.open + p.close) / 2.0,
        };
        let ha = HeikinAshiCandle {
            open_time: c.open_time(),
            open,
            high: c.high(),
            low: c.low(),
            close: (c.open() + c.high() + c.low() + c.close()) / 4.0,
        };
        self.prev = Some(ha);
        Some(ha)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.src.size_hint()
    }
}

impl<'a, C: Ohlc> ExactSizeIterator for HeikinAshi<'a, C> {}

pub fn heikin_ashi<C: Ohlc>(candles: &[C]) -> HeikinAshi<'_, C> {
    HeikinAshi { src: candles.iter(), prev: None }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

impl TrendDirection {
    pub fn sign(self) -> f64 {
        match self {
            TrendDirection::Up => 1.0,
            TrendDirection::Down => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KagiReading {
    pub direction: TrendDirection,
    pub atr: f64,
    /// reversals seen while walking the window
    pub flips: usize,
}

impl KagiReading {
    /// Signed ATR: positive in an up-trend, negative in a down-trend.
    pub fn value(&self) -> f64 {
        self.direction.sign() * self.atr
    }
}

/// Walk the trailing `period` candles and report the Kagi trend.
///
/// Returns `None` when fewer than two candles are available; the trend is
/// seeded from the first two closes.
pub fn kagi_reading<C: Ohlc>(candles: &[C], period: usize) -> Option<KagiReading> {
    let window = &candles[candles.len().saturating_sub(period)..];
    if window.len() < 2 {
        return None;
    }

    let true_ranges: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let prev_close = if i == 0 { c.close() } else { window[i - 1].close() };
            (c.high() - c.low())
                .max(c.high() - prev_close)
                .max(prev_close - c.low())
        })
        .collect();
    let atr = StatsData::new(true_ranges).mean()?;

    let (first, second) = (window[0].close(), window[1].close());
    let mut direction = if second > first { TrendDirection::Up } else { TrendDirection::Down };
    let mut highest = if direction == TrendDirection::Up { second } else { first };
    let mut lowest = if direction == TrendDirection::Down { second } else { first };
    let mut flips = 0;

    for c in &window[1..] {
        let close = c.close();

        if direction == TrendDirection::Up {
            highest = highest.max(close);
            if close < highest - atr {
                direction = TrendDirection::Down;
                flips += 1;
            }
        }

        // not `else`: a fresh down-flip immediately tracks its low
        if direction == TrendDirection::Down {
            lowest = lowest.min(close);
            if close > lowest + atr {
                direction = TrendDirection::Up;
                flips += 1;
            }
        }
    }

    Some(KagiReading { direction, atr, flips })
}

/// `trend_sign * ATR` over the trailing `period` candles.
pub fn kagi_trend<C: Ohlc>(candles: &[C], period: usize) -> Option<f64> {
    kagi_reading(candles, period).map(|r| r.value())
}
