//! Intraday Trader Application
//!
//! Loads the immutable settings file, wires the broker and scorer into the
//! core engine, seeds pre-session history, and runs the trading session to
//! completion. Interrupts route through the engine's end-of-session sweep.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use intraday_core::{
    HttpScorer, NeutralScorer, PacedPaperBroker, Scorer, Settings, SyntheticBarSource,
    TradingEngine,
};

const DEFAULT_SETTINGS_PATH: &str = "settings.json";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = Settings::from_file(&path)
        .with_context(|| format!("loading settings from {path}"))?;

    info!("🚀 Starting intraday trader ({:?} mode)", settings.mode);

    let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(
        settings.order_rate_limit_ms,
    )));
    let scorer: Arc<dyn Scorer> = match &settings.scorer {
        Some(scorer_settings) => {
            info!("📡 Prediction service: {}", scorer_settings.endpoint_url);
            Arc::new(HttpScorer::new(scorer_settings))
        }
        None => {
            info!("📡 No prediction service configured, using neutral score");
            Arc::new(NeutralScorer)
        }
    };

    let mut engine = TradingEngine::new(settings, broker, scorer)?;

    // Pre-session history so indicators are warm at the open.
    let history = SyntheticBarSource::new(100.0, 7);
    engine.seed_from(&history)?;
    info!("✅ Historical bars seeded");

    engine.run().await?;

    let account = engine.risk_manager().account();
    info!(
        capital = account.capital,
        trades = engine.risk_manager().trade_history().len(),
        "✅ Session complete"
    );
    Ok(())
}
