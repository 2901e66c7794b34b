//! Per-symbol tick buffering and one-minute bar finalization
//!
//! The aggregation algorithm is identical whether ticks arrive from a live
//! push callback or a simulated feed; concurrency handling lives at the
//! ingestion boundary, not here.

use super::indicators::{self, IndicatorParams};
use super::types::{floor_to_minute, to_exchange_local, Bar, IndicatorBar, Symbol, Tick};
use chrono::{DateTime, FixedOffset, TimeDelta};
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Relative close-to-close move that triggers an outlier warning.
const OUTLIER_MOVE_PCT: f64 = 0.10;

/// Retention window multiplier over the longest indicator lookback.
const RETENTION_MULTIPLIER: i64 = 3;

#[derive(Default)]
struct SymbolSeries {
    /// Open minute buckets, keyed by minute-floored timestamp. Ticks are kept
    /// in arrival order so open/close survive out-of-order prices.
    buckets: BTreeMap<DateTime<FixedOffset>, Vec<Tick>>,
    /// Every minute at or before this marker is finalized; ticks for those
    /// minutes are dropped.
    last_committed: Option<DateTime<FixedOffset>>,
    bars: Vec<Bar>,
    indicator_bars: Vec<IndicatorBar>,
}

/// Stateful per-symbol bar aggregator. Buffers ticks by minute, finalizes
/// bars when time advances, and keeps the indicator series recomputed over
/// the retained window.
pub struct BarAggregator {
    series: DashMap<Symbol, SymbolSeries>,
    offset: FixedOffset,
    params: IndicatorParams,
    retention: TimeDelta,
}

impl BarAggregator {
    pub fn new(offset: FixedOffset, params: IndicatorParams) -> Self {
        let retention = TimeDelta::minutes(RETENTION_MULTIPLIER * params.warmup_bars() as i64);
        Self {
            series: DashMap::new(),
            offset,
            params,
            retention,
        }
    }

    /// Ingest one tick. Returns the bars finalized by this tick (empty for
    /// in-minute ticks), so the caller can trigger decision work per new bar.
    pub fn ingest(&self, symbol: &Symbol, tick: Tick) -> Vec<Bar> {
        if !tick.is_valid() {
            warn!(%symbol, price = tick.price, volume = tick.volume, "dropping malformed tick");
            return Vec::new();
        }

        let local = to_exchange_local(tick.timestamp, self.offset);
        let minute = floor_to_minute(local);

        let mut entry = self.series.entry(symbol.clone()).or_default();

        if let Some(committed) = entry.last_committed {
            if minute <= committed {
                warn!(%symbol, tick_minute = %minute, committed = %committed,
                      "dropping late tick for finalized minute");
                return Vec::new();
            }
        }

        entry.buckets.entry(minute).or_default().push(tick);

        // Time has moved to `minute`: every buffered minute before it is
        // complete, even when bursts left more than one bucket open.
        let ready: Vec<DateTime<FixedOffset>> = entry
            .buckets
            .range(..minute)
            .map(|(ts, _)| *ts)
            .collect();

        let mut finalized = Vec::new();
        for bucket_ts in ready {
            if let Some(bar) = self.finalize(symbol, &mut entry, bucket_ts) {
                finalized.push(bar);
            }
        }

        if !finalized.is_empty() {
            entry.last_committed = Some(minute - TimeDelta::minutes(1));
            self.prune_and_recompute(symbol, &mut entry);
        }

        finalized
    }

    /// Build a bar from one minute bucket and append it to the series.
    fn finalize(
        &self,
        symbol: &Symbol,
        entry: &mut SymbolSeries,
        minute: DateTime<FixedOffset>,
    ) -> Option<Bar> {
        let ticks = entry.buckets.remove(&minute)?;
        if ticks.is_empty() {
            debug!(%symbol, %minute, "skipping empty minute bucket");
            return None;
        }

        let open = ticks.first().expect("non-empty bucket").price;
        let close = ticks.last().expect("non-empty bucket").price;
        let high = ticks.iter().map(|t| t.price).fold(f64::MIN, f64::max);
        let low = ticks.iter().map(|t| t.price).fold(f64::MAX, f64::min);
        let volume = ticks.iter().map(|t| t.volume).sum();

        let bar = Bar { ts: minute, open, high, low, close, volume };

        if let Some(prev) = entry.bars.last() {
            let gap = minute - prev.ts;
            if gap > TimeDelta::minutes(1) {
                warn!(%symbol, prev = %prev.ts, current = %minute,
                      gap_minutes = gap.num_minutes(), "gap between consecutive bars");
            }
            if prev.close > 0.0 {
                let move_pct = (close - prev.close).abs() / prev.close;
                if move_pct > OUTLIER_MOVE_PCT {
                    warn!(%symbol, prev_close = prev.close, close,
                          move_pct = move_pct * 100.0, "outlier close-to-close move");
                }
            }
        }

        debug!(%symbol, %minute, close, volume, "finalized minute bar");
        entry.bars.push(bar.clone());
        Some(bar)
    }

    /// Drop bars older than the retention window and recompute the whole
    /// indicator series for what remains.
    fn prune_and_recompute(&self, symbol: &Symbol, entry: &mut SymbolSeries) {
        if let Some(latest) = entry.bars.last().map(|b| b.ts) {
            let cutoff = latest - self.retention;
            let before = entry.bars.len();
            entry.bars.retain(|b| b.ts > cutoff);
            let dropped = before - entry.bars.len();
            if dropped > 0 {
                debug!(%symbol, dropped, retained = entry.bars.len(), "pruned bar series");
            }
        }
        entry.indicator_bars = indicators::compute_series(&entry.bars, &self.params);
    }

    /// Seed a symbol's series from a historical bar source before the session
    /// starts. The source contract guarantees ascending, timestamp-unique
    /// bars; gaps are warned about and left alone.
    pub fn seed_history(&self, symbol: &Symbol, bars: Vec<Bar>) {
        let mut entry = self.series.entry(symbol.clone()).or_default();
        for bar in bars {
            if let Some(prev) = entry.bars.last() {
                if bar.ts <= prev.ts {
                    warn!(%symbol, ts = %bar.ts, "skipping out-of-order historical bar");
                    continue;
                }
                if bar.ts - prev.ts > TimeDelta::minutes(1) {
                    warn!(%symbol, prev = %prev.ts, current = %bar.ts,
                          "gap in historical bar series");
                }
            }
            entry.bars.push(bar);
        }
        entry.last_committed = entry.bars.last().map(|b| b.ts);
        self.prune_and_recompute(symbol, &mut entry);
    }

    /// Snapshot of the indicator series for a symbol.
    pub fn indicator_series(&self, symbol: &Symbol) -> Vec<IndicatorBar> {
        self.series
            .get(symbol)
            .map(|e| e.indicator_bars.clone())
            .unwrap_or_default()
    }

    /// Close of the most recent finalized bar.
    pub fn last_close(&self, symbol: &Symbol) -> Option<f64> {
        self.series.get(symbol).and_then(|e| e.bars.last().map(|b| b.close))
    }

    /// Number of retained bars for a symbol.
    pub fn bar_count(&self, symbol: &Symbol) -> usize {
        self.series.get(symbol).map(|e| e.bars.len()).unwrap_or(0)
    }
}
