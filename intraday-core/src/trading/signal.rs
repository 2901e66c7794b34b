//! Signal engine
//!
//! Combines indicator triggers on the latest bar, the open-position state,
//! and an external prediction score into a single trade decision. Stateless
//! per invocation; all durable state lives in the risk manager.

use super::hooks::HookRegistry;
use super::risk_manager::RiskManager;
use crate::config::Settings;
use crate::market_data::{IndicatorBar, Symbol};
use crate::scorer::{FeatureWindow, Scorer};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Trade decision, exhaustively matched by the order coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Buy { price: f64, quantity: u32 },
    Sell { price: f64 },
    SellStopLoss { price: f64 },
    SellTakeProfit { price: f64 },
    Hold,
}

impl Decision {
    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold)
    }
}

/// Trigger weights and decision thresholds.
const WEIGHT_EMA_CROSS: f64 = 1.0;
const WEIGHT_RSI: f64 = 0.5;
const WEIGHT_BB_BREAK: f64 = 0.7;
const WEIGHT_VWAP_BREAK: f64 = 0.5;
const WEIGHT_AI: f64 = 1.0;
const SCORE_THRESHOLD: f64 = 1.5;
const AI_RETURN_THRESHOLD: f64 = 0.005;

/// Boolean indicator triggers computed on the latest vs previous bar. A
/// trigger is false whenever one of its inputs is still undefined.
#[derive(Clone, Copy, Debug, Default)]
struct Triggers {
    ema_cross_up: bool,
    ema_cross_down: bool,
    rsi_oversold: bool,
    rsi_overbought: bool,
    bb_break_up: bool,
    bb_break_down: bool,
    vwap_break_up: bool,
    vwap_break_down: bool,
}

impl Triggers {
    fn compute(prev: &IndicatorBar, latest: &IndicatorBar, oversold: f64, overbought: f64) -> Self {
        let mut t = Triggers::default();

        if let (Some(ps), Some(pl), Some(ls), Some(ll)) =
            (prev.ema_short, prev.ema_long, latest.ema_short, latest.ema_long)
        {
            t.ema_cross_up = ps < pl && ls > ll;
            t.ema_cross_down = ps > pl && ls < ll;
        }

        if let Some(rsi) = latest.rsi {
            t.rsi_oversold = rsi < oversold;
            t.rsi_overbought = rsi > overbought;
        }

        if let (Some(ph), Some(lh)) = (prev.bb_hband, latest.bb_hband) {
            t.bb_break_up = prev.close() <= ph && latest.close() > lh;
        }
        if let (Some(pl), Some(ll)) = (prev.bb_lband, latest.bb_lband) {
            t.bb_break_down = prev.close() >= pl && latest.close() < ll;
        }

        if let (Some(pv), Some(lv)) = (prev.vwap, latest.vwap) {
            t.vwap_break_up = prev.close() <= pv && latest.close() > lv;
            t.vwap_break_down = prev.close() >= pv && latest.close() < lv;
        }

        t
    }

    fn buy_score(&self, ai_buy: bool) -> f64 {
        let mut score = 0.0;
        if self.ema_cross_up {
            score += WEIGHT_EMA_CROSS;
        }
        if self.rsi_oversold {
            score += WEIGHT_RSI;
        }
        if self.bb_break_up {
            score += WEIGHT_BB_BREAK;
        }
        if self.vwap_break_up {
            score += WEIGHT_VWAP_BREAK;
        }
        if ai_buy {
            score += WEIGHT_AI;
        }
        score
    }

    fn sell_score(&self, ai_sell: bool) -> f64 {
        let mut score = 0.0;
        if self.ema_cross_down {
            score += WEIGHT_EMA_CROSS;
        }
        if self.rsi_overbought {
            score += WEIGHT_RSI;
        }
        if self.bb_break_down {
            score += WEIGHT_BB_BREAK;
        }
        if self.vwap_break_down {
            score += WEIGHT_VWAP_BREAK;
        }
        if ai_sell {
            score += WEIGHT_AI;
        }
        score
    }
}

/// Decision generator over a symbol's indicator series.
pub struct SignalEngine {
    risk: Arc<RiskManager>,
    scorer: Arc<dyn Scorer>,
    hooks: RwLock<HookRegistry>,
    warmup_bars: usize,
    feature_window_len: usize,
    rsi_oversold: f64,
    rsi_overbought: f64,
}

impl SignalEngine {
    pub fn new(settings: &Settings, risk: Arc<RiskManager>, scorer: Arc<dyn Scorer>) -> Self {
        Self {
            risk,
            scorer,
            hooks: RwLock::new(HookRegistry::new()),
            warmup_bars: settings.indicator_params().warmup_bars(),
            feature_window_len: settings.ema_long_period * 2,
            rsi_oversold: settings.rsi_oversold,
            rsi_overbought: settings.rsi_overbought,
        }
    }

    pub fn register_before_signal<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn(&Symbol, &[IndicatorBar]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.write().register_before_signal(name, hook);
    }

    pub fn register_after_signal<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn(&Symbol, &Decision) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.write().register_after_signal(name, hook);
    }

    /// Produce a decision for the latest bar of `series`.
    pub async fn generate(&self, symbol: &Symbol, series: &[IndicatorBar]) -> Decision {
        self.hooks.read().run_before_signal(symbol, series);

        let decision = self.evaluate(symbol, series).await;

        self.hooks.read().run_after_signal(symbol, &decision);
        decision
    }

    async fn evaluate(&self, symbol: &Symbol, series: &[IndicatorBar]) -> Decision {
        // Insufficient history is a Hold, not an error.
        if series.len() < self.warmup_bars.max(2) {
            return Decision::Hold;
        }

        let latest = &series[series.len() - 1];
        let prev = &series[series.len() - 2];
        let price = latest.close();

        let triggers = Triggers::compute(prev, latest, self.rsi_oversold, self.rsi_overbought);

        let features = FeatureWindow::from_bars(series, self.feature_window_len);
        let predicted_return = self.scorer.predict(symbol, &features).await;
        let ai_buy = predicted_return > AI_RETURN_THRESHOLD;
        let ai_sell = predicted_return < -AI_RETURN_THRESHOLD;

        let buy_score = triggers.buy_score(ai_buy);
        let sell_score = triggers.sell_score(ai_sell);
        debug!(%symbol, buy_score, sell_score, predicted_return, "evaluated triggers");

        // Protective exits take priority over everything else.
        if let Some(position) = self.risk.open_position(symbol) {
            if position.breaches_stop_loss(price) {
                return Decision::SellStopLoss { price };
            }
            if position.breaches_take_profit(price) {
                return Decision::SellTakeProfit { price };
            }
            if sell_score >= SCORE_THRESHOLD {
                return Decision::Sell { price };
            }
            return Decision::Hold;
        }

        if buy_score >= SCORE_THRESHOLD && self.risk.can_open(symbol, price, latest.atr) {
            if let Some(sizing) = self.risk.size_position(symbol, price, latest.atr) {
                return Decision::Buy { price, quantity: sizing.quantity };
            }
        }

        Decision::Hold
    }
}
