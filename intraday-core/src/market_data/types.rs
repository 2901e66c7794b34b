//! Market data types

use chrono::{DateTime, DurationRound, FixedOffset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading symbol
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn validate(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw tick as delivered by a tick source. Consumed immediately by the
/// aggregator and never stored beyond its minute bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(timestamp: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self { timestamp, price, volume }
    }

    /// A tick is usable when its price is strictly positive and its volume
    /// non-negative; anything else is dropped at the ingestion boundary.
    pub fn is_valid(&self) -> bool {
        self.price > 0.0 && self.price.is_finite() && self.volume >= 0.0 && self.volume.is_finite()
    }
}

/// Finalized one-minute OHLCV bar. Immutable once created; timestamps are
/// minute-floored exchange-local time, strictly increasing per symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bar augmented with computed indicator values. A field stays `None` until
/// its lookback window is satisfied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndicatorBar {
    pub bar: Bar,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub rsi: Option<f64>,
    pub bb_hband: Option<f64>,
    pub bb_lband: Option<f64>,
    pub bb_mavg: Option<f64>,
    pub vwap: Option<f64>,
    pub atr: Option<f64>,
}

impl IndicatorBar {
    pub fn close(&self) -> f64 {
        self.bar.close
    }

    pub fn ts(&self) -> DateTime<FixedOffset> {
        self.bar.ts
    }
}

/// Floor a timestamp to its minute, preserving the offset.
pub fn floor_to_minute(ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    // TimeDelta::minutes(1) cannot make duration_trunc fail
    ts.duration_trunc(TimeDelta::minutes(1)).expect("minute floor")
}

/// Convert a UTC tick timestamp into exchange-local time.
pub fn to_exchange_local(ts: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    ts.with_timezone(&offset)
}
