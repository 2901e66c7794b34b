//! Indicator engine
//!
//! Pure transformations over an ordered bar sequence. Every function returns a
//! series parallel to its input where a position is `None` until the
//! indicator's lookback window is satisfied.

use super::types::{Bar, IndicatorBar};

/// Indicator window configuration, taken from the immutable settings at
/// construction.
#[derive(Clone, Copy, Debug)]
pub struct IndicatorParams {
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,
}

impl IndicatorParams {
    /// Bars required before the signal engine may act: the longest of the
    /// close-based windows.
    pub fn warmup_bars(&self) -> usize {
        self.ema_long_period.max(self.rsi_period).max(self.bb_period)
    }
}

/// Exponential moving average with smoothing `2/(w+1)`, seeded by the simple
/// average of the first `w` values.
pub fn ema(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let alpha = 2.0 / (window as f64 + 1.0);
    let seed: f64 = values[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = Some(seed);

    let mut prev = seed;
    for i in window..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

/// Wilder's RSI over close-to-close changes. Defined as 100 when the average
/// loss is zero; always within [0, 100].
pub fn rsi(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 || closes.len() <= window {
        return out;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain: f64 = gains[..window].iter().sum::<f64>() / window as f64;
    let mut avg_loss: f64 = losses[..window].iter().sum::<f64>() / window as f64;
    out[window] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in window..gains.len() {
        avg_gain = (avg_gain * (window as f64 - 1.0) + gains[i]) / window as f64;
        avg_loss = (avg_loss * (window as f64 - 1.0) + losses[i]) / window as f64;
        out[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Bollinger bands: simple moving average of close over `window`, bands at
/// `k` population standard deviations. `hband >= mavg >= lband` holds for
/// every computed position.
pub fn bollinger(closes: &[f64], window: usize, k: f64) -> Vec<Option<(f64, f64, f64)>> {
    let mut out = vec![None; closes.len()];
    if window == 0 || closes.len() < window {
        return out;
    }

    for i in (window - 1)..closes.len() {
        let slice = &closes[i + 1 - window..=i];
        let mavg = slice.iter().sum::<f64>() / window as f64;
        let variance = slice.iter().map(|c| (c - mavg).powi(2)).sum::<f64>() / window as f64;
        let stddev = variance.sqrt();
        out[i] = Some((mavg + k * stddev, mavg - k * stddev, mavg));
    }
    out
}

/// Cumulative volume-weighted average price from the start of the series.
/// Resets only when the series itself is pruned and recomputed.
pub fn vwap(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(bars.len());
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for bar in bars {
        cum_pv += bar.close * bar.volume;
        cum_vol += bar.volume;
        out.push(if cum_vol > 0.0 { Some(cum_pv / cum_vol) } else { None });
    }
    out
}

/// Average true range: EMA over the true-range series,
/// `TR = max(high - low, |high - prev_close|, |low - prev_close|)`.
pub fn atr(bars: &[Bar], window: usize) -> Vec<Option<f64>> {
    if bars.is_empty() {
        return Vec::new();
    }

    let mut tr = Vec::with_capacity(bars.len());
    tr.push(bars[0].high - bars[0].low);
    for pair in bars.windows(2) {
        let prev_close = pair[0].close;
        let bar = &pair[1];
        let range = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        tr.push(range);
    }

    ema(&tr, window)
}

/// Recompute the full indicator series for a retained bar window.
pub fn compute_series(bars: &[Bar], params: &IndicatorParams) -> Vec<IndicatorBar> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let ema_short = ema(&closes, params.ema_short_period);
    let ema_long = ema(&closes, params.ema_long_period);
    let rsi_series = rsi(&closes, params.rsi_period);
    let bb = bollinger(&closes, params.bb_period, params.bb_std_dev);
    let vwap_series = vwap(bars);
    let atr_series = atr(bars, params.atr_period);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorBar {
            bar: bar.clone(),
            ema_short: ema_short[i],
            ema_long: ema_long[i],
            rsi: rsi_series[i],
            bb_hband: bb[i].map(|(h, _, _)| h),
            bb_lband: bb[i].map(|(_, l, _)| l),
            bb_mavg: bb[i].map(|(_, _, m)| m),
            vwap: vwap_series[i],
            atr: atr_series[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{FixedOffset, TimeZone};

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                ts: offset.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
                    + chrono::TimeDelta::minutes(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
            })
            .collect()
    }

    fn default_params() -> IndicatorParams {
        IndicatorParams {
            ema_short_period: 3,
            ema_long_period: 5,
            rsi_period: 5,
            bb_period: 5,
            bb_std_dev: 2.0,
            atr_period: 5,
        }
    }

    #[test]
    fn test_ema_seeded_by_simple_average() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let series = ema(&values, 3);
        assert_eq!(series[0], None);
        assert_eq!(series[1], None);
        assert_relative_eq!(series[2].unwrap(), 2.0);
        // alpha = 0.5: 0.5*4 + 0.5*2 = 3, then 0.5*5 + 0.5*3 = 4
        assert_relative_eq!(series[3].unwrap(), 3.0);
        assert_relative_eq!(series[4].unwrap(), 4.0);
    }

    #[test]
    fn test_ema_short_input_undefined() {
        let series = ema(&[1.0, 2.0], 5);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn test_rsi_bounds() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0).collect();
        let series = rsi(&closes, 14);
        for value in series.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value), "RSI {} out of range", value);
        }
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let series = rsi(&closes, 5);
        assert_relative_eq!(series[5].unwrap(), 100.0);
        assert_relative_eq!(series[9].unwrap(), 100.0);
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        let series = rsi(&closes, 5);
        assert_relative_eq!(series[9].unwrap(), 0.0);
    }

    #[test]
    fn test_rsi_warmup() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let series = rsi(&closes, 5);
        for value in series.iter().take(5) {
            assert!(value.is_none());
        }
        assert!(series[5].is_some());
    }

    #[test]
    fn test_bollinger_band_ordering() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + ((i * 13) % 7) as f64).collect();
        let series = bollinger(&closes, 5, 2.0);
        for (hband, lband, mavg) in series.into_iter().flatten() {
            assert!(hband >= mavg, "hband {} < mavg {}", hband, mavg);
            assert!(mavg >= lband, "mavg {} < lband {}", mavg, lband);
        }
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let closes = [50.0; 10];
        let series = bollinger(&closes, 5, 2.0);
        let (hband, lband, mavg) = series[9].unwrap();
        assert_relative_eq!(hband, 50.0);
        assert_relative_eq!(lband, 50.0);
        assert_relative_eq!(mavg, 50.0);
    }

    #[test]
    fn test_vwap_constant_price() {
        let bars = make_bars(&[42.0, 42.0, 42.0]);
        let series = vwap(&bars);
        for value in series.into_iter().flatten() {
            assert_relative_eq!(value, 42.0);
        }
    }

    #[test]
    fn test_vwap_cumulative() {
        let mut bars = make_bars(&[10.0, 20.0]);
        bars[0].volume = 100.0;
        bars[1].volume = 300.0;
        let series = vwap(&bars);
        assert_relative_eq!(series[0].unwrap(), 10.0);
        // (10*100 + 20*300) / 400 = 17.5
        assert_relative_eq!(series[1].unwrap(), 17.5);
    }

    #[test]
    fn test_atr_uses_true_range() {
        let bars = make_bars(&[100.0, 105.0, 95.0]);
        let series = atr(&bars, 3);
        // TRs: 2, max(2, |106-100|, |104-100|) = 6, max(2, |96-105|, |94-105|) = 11
        // seed = (2 + 6 + 11) / 3
        assert_relative_eq!(series[2].unwrap(), 19.0 / 3.0);
    }

    #[test]
    fn test_compute_series_alignment() {
        let bars = make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
        let series = compute_series(&bars, &default_params());
        assert_eq!(series.len(), bars.len());
        // Before warmup every close-window indicator is undefined.
        assert!(series[0].ema_long.is_none());
        assert!(series[0].rsi.is_none());
        assert!(series[0].bb_mavg.is_none());
        // VWAP is defined from the first bar with volume.
        assert!(series[0].vwap.is_some());
        // After warmup everything is populated.
        let last = &series[6];
        assert!(last.ema_short.is_some());
        assert!(last.ema_long.is_some());
        assert!(last.rsi.is_some());
        assert!(last.bb_hband.is_some());
        assert!(last.atr.is_some());
    }
}
