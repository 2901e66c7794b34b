//! Immutable settings surface
//!
//! Loaded once from JSON, validated at construction, then passed by value
//! into each component. Nothing in the core reads ambient configuration.

use crate::market_data::{IndicatorParams, MarketSession, Symbol};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Whether broker submissions actually fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Simulated,
}

/// External prediction-service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScorerSettings {
    pub endpoint_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_scorer_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_scorer_timeout_secs")]
    pub timeout_secs: f64,
}

/// Exchange session window, exchange-local.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Offset of exchange-local time from UTC, in hours (NYSE winter: -5).
    pub utc_offset_hours: i32,
    #[serde(default = "default_session_open")]
    pub open: String,
    #[serde(default = "default_session_close")]
    pub close: String,
}

fn default_scorer_attempts() -> u32 {
    3
}

fn default_scorer_timeout_secs() -> f64 {
    5.0
}

fn default_session_open() -> String {
    "09:30".to_string()
}

fn default_session_close() -> String {
    "16:00".to_string()
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_loop_interval_secs() -> f64 {
    5.0
}

fn default_order_rate_limit_ms() -> u64 {
    200
}

fn default_order_retry_attempts() -> u32 {
    3
}

fn default_order_retry_interval_secs() -> f64 {
    1.0
}

fn default_tick_queue_capacity() -> usize {
    1024
}

fn default_historical_lookback_minutes() -> u32 {
    120
}

/// Immutable settings object consumed read-only by the core. All percentage
/// fields are fractions: 0.02 means two percent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub symbols: Vec<Symbol>,
    pub mode: TradingMode,

    // Risk management
    pub initial_capital: f64,
    pub max_position_pct: f64,
    pub target_daily_return_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub daily_max_loss_pct: f64,
    pub atr_stop_multiplier: f64,
    pub atr_take_multiplier: f64,

    // Indicator windows
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub rsi_period: usize,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,

    // Loop and execution pacing
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: f64,
    #[serde(default = "default_order_rate_limit_ms")]
    pub order_rate_limit_ms: u64,
    #[serde(default = "default_order_retry_attempts")]
    pub order_retry_attempts: u32,
    #[serde(default = "default_order_retry_interval_secs")]
    pub order_retry_interval_secs: f64,
    #[serde(default = "default_tick_queue_capacity")]
    pub tick_queue_capacity: usize,
    #[serde(default = "default_historical_lookback_minutes")]
    pub historical_lookback_minutes: u32,

    #[serde(default)]
    pub scorer: Option<ScorerSettings>,
    pub session: SessionSettings,
}

impl Settings {
    /// Load and validate a settings file; the core never starts on failure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbol list is empty".into()));
        }
        for symbol in &self.symbols {
            if !symbol.validate() {
                return Err(ConfigError::Invalid(format!("invalid symbol {:?}", symbol.as_str())));
            }
        }
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::Invalid("initial_capital must be positive".into()));
        }
        for (name, value) in [
            ("max_position_pct", self.max_position_pct),
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("daily_max_loss_pct", self.daily_max_loss_pct),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!("{name} must be in (0, 1]")));
            }
        }
        if self.target_daily_return_pct < 0.0 {
            return Err(ConfigError::Invalid("target_daily_return_pct must be >= 0".into()));
        }
        if self.atr_stop_multiplier <= 0.0 || self.atr_take_multiplier <= 0.0 {
            return Err(ConfigError::Invalid("ATR multipliers must be positive".into()));
        }
        if self.ema_short_period < 2 || self.ema_long_period < 2 {
            return Err(ConfigError::Invalid("EMA periods must be at least 2".into()));
        }
        if self.ema_short_period >= self.ema_long_period {
            return Err(ConfigError::Invalid(
                "ema_short_period must be shorter than ema_long_period".into(),
            ));
        }
        if self.rsi_period < 2 || self.bb_period < 2 || self.atr_period < 2 {
            return Err(ConfigError::Invalid("indicator windows must be at least 2".into()));
        }
        if self.bb_std_dev <= 0.0 {
            return Err(ConfigError::Invalid("bb_std_dev must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(ConfigError::Invalid("RSI thresholds must satisfy 0 <= oversold < overbought <= 100".into()));
        }
        if self.loop_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid("loop_interval_secs must be positive".into()));
        }
        if self.order_retry_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid("order_retry_interval_secs must be positive".into()));
        }
        if self.tick_queue_capacity == 0 {
            return Err(ConfigError::Invalid("tick_queue_capacity must be positive".into()));
        }
        if let Some(scorer) = &self.scorer {
            url::Url::parse(&scorer.endpoint_url).map_err(|e| {
                ConfigError::Invalid(format!("scorer endpoint_url is not a valid URL: {e}"))
            })?;
            if scorer.max_attempts == 0 {
                return Err(ConfigError::Invalid("scorer max_attempts must be positive".into()));
            }
            if scorer.timeout_secs <= 0.0 {
                return Err(ConfigError::Invalid("scorer timeout_secs must be positive".into()));
            }
        }
        self.market_session()?;
        Ok(())
    }

    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            ema_short_period: self.ema_short_period,
            ema_long_period: self.ema_long_period,
            rsi_period: self.rsi_period,
            bb_period: self.bb_period,
            bb_std_dev: self.bb_std_dev,
            atr_period: self.atr_period,
        }
    }

    pub fn market_session(&self) -> Result<MarketSession, ConfigError> {
        let offset = FixedOffset::east_opt(self.session.utc_offset_hours * 3600)
            .ok_or_else(|| ConfigError::Invalid("session utc_offset_hours out of range".into()))?;
        let open = parse_session_time(&self.session.open)?;
        let close = parse_session_time(&self.session.close)?;
        if open >= close {
            return Err(ConfigError::Invalid("session open must precede close".into()));
        }
        Ok(MarketSession::new(offset, open, close))
    }
}

fn parse_session_time(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|e| ConfigError::Invalid(format!("invalid session time {raw:?}: {e}")))
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        symbols: vec![Symbol::new("AAPL")],
        mode: TradingMode::Simulated,
        initial_capital: 1000.0,
        max_position_pct: 0.5,
        target_daily_return_pct: 0.02,
        stop_loss_pct: 0.02,
        take_profit_pct: 0.04,
        daily_max_loss_pct: 0.05,
        atr_stop_multiplier: 1.0,
        atr_take_multiplier: 2.0,
        ema_short_period: 3,
        ema_long_period: 5,
        rsi_period: 5,
        rsi_oversold: 30.0,
        rsi_overbought: 70.0,
        bb_period: 5,
        bb_std_dev: 2.0,
        atr_period: 5,
        loop_interval_secs: 0.05,
        order_rate_limit_ms: 1,
        order_retry_attempts: 3,
        order_retry_interval_secs: 0.001,
        tick_queue_capacity: 64,
        historical_lookback_minutes: 30,
        scorer: None,
        session: SessionSettings {
            utc_offset_hours: -5,
            open: "09:30".into(),
            close: "16:00".into(),
        },
    }
}
