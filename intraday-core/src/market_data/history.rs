//! Historical bar source contract
//!
//! Vendors only have to honor the output shape: an ascending,
//! timestamp-unique bar sequence. Gaps are tolerated and warned about by the
//! aggregator when the bars are seeded; they are never repaired.

use super::types::{Bar, Symbol};
use chrono::{DateTime, FixedOffset, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("historical source unavailable: {0}")]
    Unavailable(String),
    #[error("historical series for {symbol} is not strictly ascending at {ts}")]
    OutOfOrder { symbol: Symbol, ts: DateTime<FixedOffset> },
}

/// Source of pre-session minute bars.
pub trait HistoricalBarSource: Send + Sync {
    /// Fetch up to `lookback_minutes` of one-minute bars ending at `until`.
    fn fetch(
        &self,
        symbol: &Symbol,
        until: DateTime<FixedOffset>,
        lookback_minutes: u32,
    ) -> Result<Vec<Bar>, HistoryError>;
}

/// Reject a series that violates the ordering contract; warn on gaps.
pub fn validate_series(symbol: &Symbol, bars: &[Bar]) -> Result<(), HistoryError> {
    for pair in bars.windows(2) {
        if pair[1].ts <= pair[0].ts {
            return Err(HistoryError::OutOfOrder { symbol: symbol.clone(), ts: pair[1].ts });
        }
        if pair[1].ts - pair[0].ts > TimeDelta::minutes(1) {
            warn!(%symbol, prev = %pair[0].ts, current = %pair[1].ts,
                  "gap in historical bar series");
        }
    }
    Ok(())
}

/// Deterministic random-walk bar generator for simulated sessions. Each
/// symbol walks from its own seed so repeated runs replay the same history.
pub struct SyntheticBarSource {
    base_price: f64,
    seed: u64,
}

impl SyntheticBarSource {
    pub fn new(base_price: f64, seed: u64) -> Self {
        Self { base_price, seed }
    }

    fn symbol_seed(&self, symbol: &Symbol) -> u64 {
        // Stable per-symbol stream without hashing machinery.
        symbol
            .as_str()
            .bytes()
            .fold(self.seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }
}

impl HistoricalBarSource for SyntheticBarSource {
    fn fetch(
        &self,
        symbol: &Symbol,
        until: DateTime<FixedOffset>,
        lookback_minutes: u32,
    ) -> Result<Vec<Bar>, HistoryError> {
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let start = until - TimeDelta::minutes(lookback_minutes as i64);

        let mut price = self.base_price;
        let mut bars = Vec::with_capacity(lookback_minutes as usize);
        for i in 0..lookback_minutes {
            let open = price;
            let drift: f64 = rng.gen_range(-0.003..0.003);
            let close = (open * (1.0 + drift)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.001));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.001));
            let volume = rng.gen_range(100.0..1000.0_f64).floor();
            bars.push(Bar {
                ts: start + TimeDelta::minutes(i as i64 + 1),
                open,
                high,
                low,
                close,
                volume,
            });
            price = close;
        }

        validate_series(symbol, &bars)?;
        Ok(bars)
    }
}
