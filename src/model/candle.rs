use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One closed OHLCV bar. `time` is the bar open in unix seconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn close_time(&self, bar_seconds: u64) -> i64 {
        self.time.saturating_add(bar_seconds as i64)
    }

    /// True once the bar's close time is at or before `now`.
    pub fn is_closed_at(&self, bar_seconds: u64, now: i64) -> bool {
        self.close_time(bar_seconds) <= now
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}

/// Candles ordered by strictly increasing `time`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort and deduplicate. When several candles share a timestamp the one
    /// appearing last in `candles` is kept.
    pub fn from_unsorted(candles: Vec<Candle>) -> Self {
        let mut by_time = BTreeMap::new();
        for c in candles {
            by_time.insert(c.time, c);
        }
        Self {
            candles: by_time.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn into_vec(self) -> Vec<Candle> {
        self.candles
    }

    /// Drop bars that are still forming at `now`. Returns how many were removed.
    pub fn retain_closed(&mut self, bar_seconds: u64, now: i64) -> usize {
        let before = self.candles.len();
        self.candles.retain(|c| c.is_closed_at(bar_seconds, now));
        before - self.candles.len()
    }

    pub fn is_strictly_ascending(&self) -> bool {
        self.candles.windows(2).all(|w| w[0].time < w[1].time)
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
