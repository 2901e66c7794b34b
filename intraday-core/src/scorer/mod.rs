//! External prediction-service contract
//!
//! The signal engine only ever sees a float: scorer implementations absorb
//! transport failures, retry what is retryable, and degrade to a neutral
//! 0.0 instead of raising.

use crate::config::ScorerSettings;
use crate::market_data::{IndicatorBar, Symbol};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Neutral prediction used whenever the service cannot be reached.
pub const NEUTRAL_SCORE: f64 = 0.0;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("retryable status {0}")]
    Retryable(u16),
    #[error("rejected with status {0}")]
    Rejected(u16),
}

/// Feature window sent to the prediction service: column-oriented values of
/// the most recent indicator bars.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FeatureWindow {
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub ema_short: Vec<Option<f64>>,
    pub ema_long: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub vwap: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
}

impl FeatureWindow {
    /// Build from the tail of an indicator series.
    pub fn from_bars(bars: &[IndicatorBar], max_len: usize) -> Self {
        let tail = &bars[bars.len().saturating_sub(max_len)..];
        Self {
            close: tail.iter().map(|b| b.bar.close).collect(),
            volume: tail.iter().map(|b| b.bar.volume).collect(),
            ema_short: tail.iter().map(|b| b.ema_short).collect(),
            ema_long: tail.iter().map(|b| b.ema_long).collect(),
            rsi: tail.iter().map(|b| b.rsi).collect(),
            vwap: tail.iter().map(|b| b.vwap).collect(),
            atr: tail.iter().map(|b| b.atr).collect(),
        }
    }
}

/// Predicted-return source consulted by the signal engine.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Predicted return for the next interval. Never errors; implementations
    /// return [`NEUTRAL_SCORE`] when no prediction is available.
    async fn predict(&self, symbol: &Symbol, features: &FeatureWindow) -> f64;
}

/// Scorer used when no prediction service is configured.
pub struct NeutralScorer;

#[async_trait]
impl Scorer for NeutralScorer {
    async fn predict(&self, _symbol: &Symbol, _features: &FeatureWindow) -> f64 {
        NEUTRAL_SCORE
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    symbol: &'a str,
    features: &'a FeatureWindow,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predicted_return: f64,
}

/// HTTP client for the prediction endpoint. Retries 429/5xx and transport
/// errors with exponentially doubling backoff; exhausting the attempts
/// yields the neutral score.
pub struct HttpScorer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl HttpScorer {
    pub fn new(settings: &ScorerSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: settings.endpoint_url.clone(),
            api_key: settings.api_key.clone(),
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    async fn attempt(&self, symbol: &Symbol, features: &FeatureWindow) -> Result<f64, ScorerError> {
        let request = PredictRequest { symbol: symbol.as_str(), features };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScorerError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: PredictResponse = response
                .json()
                .await
                .map_err(|e| ScorerError::Transport(e.to_string()))?;
            return Ok(body.predicted_return);
        }

        let code = status.as_u16();
        if code == 429 || status.is_server_error() {
            Err(ScorerError::Retryable(code))
        } else {
            Err(ScorerError::Rejected(code))
        }
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn predict(&self, symbol: &Symbol, features: &FeatureWindow) -> f64 {
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_attempts {
            match self.attempt(symbol, features).await {
                Ok(score) => {
                    debug!(%symbol, score, "prediction received");
                    return score;
                }
                Err(ScorerError::Rejected(code)) => {
                    warn!(%symbol, code, "prediction rejected, not retrying");
                    return NEUTRAL_SCORE;
                }
                Err(e) => {
                    warn!(%symbol, attempt, error = %e, backoff_secs = backoff.as_secs_f64(),
                          "prediction attempt failed");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        warn!(%symbol, "all prediction attempts failed, using neutral score");
        NEUTRAL_SCORE
    }
}
