//! Trading engine
//!
//! Wires the tick path (source → aggregator → finalized bars) to the
//! decision path (signal engine → coordinator → ledger) for both ingestion
//! modes. Live ticks arrive through a non-blocking push handle; simulated
//! sessions run a feed producer task plus a polling decision loop. Every
//! termination path runs the end-of-session sweep before returning.

use super::coordinator::OrderCoordinator;
use super::risk_manager::{RiskLimits, RiskManager};
use super::signal::SignalEngine;
use crate::broker::Broker;
use crate::config::{Settings, TradingMode};
use crate::market_data::{
    floor_to_minute, BarAggregator, HistoricalBarSource, MarketSession, SimulatedTickFeed, Symbol,
    Tick, TickSource,
};
use crate::scorer::Scorer;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Cadence of the simulated tick producer.
const SIMULATED_TICK_CADENCE: Duration = Duration::from_millis(250);
const SIMULATED_FEED_SEED: u64 = 17;
const SIMULATED_BASE_PRICE: f64 = 100.0;

/// Non-blocking tick entry point, safe to call from a live push callback.
/// Finalized-bar events are handed to the decision worker over a bounded
/// queue; a full queue drops the event with a warning instead of stalling
/// the callback.
#[derive(Clone)]
pub struct TickIngestHandle {
    aggregator: Arc<BarAggregator>,
    bar_events: mpsc::Sender<Symbol>,
}

impl TickIngestHandle {
    pub fn on_tick(&self, symbol: &Symbol, tick: Tick) {
        let finalized = self.aggregator.ingest(symbol, tick);
        for _bar in finalized {
            if self.bar_events.try_send(symbol.clone()).is_err() {
                warn!(%symbol, "decision queue full, dropping bar event");
            }
        }
    }
}

/// Decision path shared by the bar-event worker and the polling loop.
struct DecisionDriver {
    aggregator: Arc<BarAggregator>,
    signal: Arc<SignalEngine>,
    coordinator: Arc<OrderCoordinator>,
}

impl DecisionDriver {
    async fn drive(&self, symbol: &Symbol) {
        let series = self.aggregator.indicator_series(symbol);
        if series.is_empty() {
            return;
        }
        let atr = series.last().and_then(|bar| bar.atr);
        let decision = self.signal.generate(symbol, &series).await;
        if !decision.is_hold() {
            self.coordinator.execute(symbol, &decision, atr).await;
        }
    }
}

/// Orchestrates one trading session.
pub struct TradingEngine {
    settings: Settings,
    session: MarketSession,
    aggregator: Arc<BarAggregator>,
    risk: Arc<RiskManager>,
    signal: Arc<SignalEngine>,
    coordinator: Arc<OrderCoordinator>,
    driver: Arc<DecisionDriver>,
    bar_events: mpsc::Sender<Symbol>,
    bar_events_rx: Option<mpsc::Receiver<Symbol>>,
}

impl TradingEngine {
    pub fn new(
        settings: Settings,
        broker: Arc<dyn Broker>,
        scorer: Arc<dyn Scorer>,
    ) -> Result<Self> {
        settings.validate()?;
        let session = settings.market_session()?;

        let aggregator = Arc::new(BarAggregator::new(
            session.offset(),
            settings.indicator_params(),
        ));
        let risk = Arc::new(RiskManager::new(
            RiskLimits::from(&settings),
            settings.initial_capital,
        ));
        let signal = Arc::new(SignalEngine::new(&settings, risk.clone(), scorer));
        let coordinator = Arc::new(OrderCoordinator::new(
            settings.mode,
            broker,
            risk.clone(),
            settings.order_retry_attempts.max(1),
            Duration::from_secs_f64(settings.order_retry_interval_secs),
        ));
        let driver = Arc::new(DecisionDriver {
            aggregator: aggregator.clone(),
            signal: signal.clone(),
            coordinator: coordinator.clone(),
        });

        let (bar_events, bar_events_rx) = mpsc::channel(settings.tick_queue_capacity);

        Ok(Self {
            settings,
            session,
            aggregator,
            risk,
            signal,
            coordinator,
            driver,
            bar_events,
            bar_events_rx: Some(bar_events_rx),
        })
    }

    pub fn ingest_handle(&self) -> TickIngestHandle {
        TickIngestHandle {
            aggregator: self.aggregator.clone(),
            bar_events: self.bar_events.clone(),
        }
    }

    pub fn risk_manager(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn signal_engine(&self) -> &Arc<SignalEngine> {
        &self.signal
    }

    pub fn aggregator(&self) -> &Arc<BarAggregator> {
        &self.aggregator
    }

    /// Seed every symbol's bar series from a historical source before the
    /// session starts.
    pub fn seed_from(&self, source: &dyn HistoricalBarSource) -> Result<()> {
        let until = floor_to_minute(Utc::now().with_timezone(&self.session.offset()));
        for symbol in &self.settings.symbols {
            let bars = source.fetch(symbol, until, self.settings.historical_lookback_minutes)?;
            info!(%symbol, bars = bars.len(), "seeded historical bars");
            self.aggregator.seed_history(symbol, bars);
        }
        Ok(())
    }

    /// Run the session to completion: until market close, the daily targets
    /// signal stop-trading, or an interrupt. Always sweeps before returning.
    pub async fn run(&mut self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.spawn_decision_worker(shutdown_rx.clone());

        let feed_task = match self.settings.mode {
            TradingMode::Simulated => {
                let feed = SimulatedTickFeed::new(
                    self.settings.symbols.clone(),
                    self.aggregator
                        .last_close(&self.settings.symbols[0])
                        .unwrap_or(SIMULATED_BASE_PRICE),
                    SIMULATED_TICK_CADENCE,
                    SIMULATED_FEED_SEED,
                );
                Some(self.spawn_feed_producer(Box::new(feed), shutdown_rx.clone()))
            }
            TradingMode::Live => None,
        };

        info!(mode = ?self.settings.mode, symbols = self.settings.symbols.len(),
              "trading session started");
        self.supervise().await;

        // Stop producers before sweeping so no decision races the forced
        // liquidation.
        let _ = shutdown_tx.send(true);
        if let Some(task) = feed_task {
            let _ = task.await;
        }

        info!("session ended, running end-of-session sweep");
        let aggregator = self.aggregator.clone();
        self.coordinator
            .liquidate_all(|symbol| aggregator.last_close(symbol))
            .await;
        info!(capital = self.risk.account().capital, "sweep complete");
        Ok(())
    }

    /// Bar-event worker: reacts to every finalized bar, in both modes.
    fn spawn_decision_worker(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut receiver = self
            .bar_events_rx
            .take()
            .expect("decision worker already spawned");
        let driver = self.driver.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    event = receiver.recv() => match event {
                        Some(symbol) => driver.drive(&symbol).await,
                        None => break,
                    },
                }
            }
        });
    }

    /// Simulated feed producer, pushing through the same ingestion handle a
    /// live callback would use.
    fn spawn_feed_producer(
        &self,
        mut feed: Box<dyn TickSource + Send>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let handle = self.ingest_handle();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    batch = feed.next_ticks() => match batch {
                        Some(ticks) => {
                            for (symbol, tick) in ticks {
                                handle.on_tick(&symbol, tick);
                            }
                        }
                        None => break,
                    },
                }
            }
        })
    }

    /// Supervision loop: watches the stop conditions and, in simulated mode,
    /// polls the decision path on the configured interval.
    async fn supervise(&self) {
        let poll = Duration::from_secs_f64(self.settings.loop_interval_secs);
        loop {
            if !self.risk.check_daily_targets() {
                info!("daily targets reached, stopping session");
                break;
            }
            if self.session.is_closed_for_day(Utc::now()) {
                info!("market closed, stopping session");
                break;
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, stopping session");
                    break;
                }
                _ = tokio::time::sleep(poll) => {}
            }

            if self.settings.mode == TradingMode::Simulated {
                for symbol in &self.settings.symbols {
                    self.driver.drive(symbol).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PacedPaperBroker;
    use crate::config::test_settings;
    use crate::market_data::SyntheticBarSource;
    use crate::scorer::NeutralScorer;
    use chrono::TimeZone;

    fn engine(settings: Settings) -> (TradingEngine, Arc<PacedPaperBroker>) {
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        let engine =
            TradingEngine::new(settings, broker.clone(), Arc::new(NeutralScorer)).unwrap();
        (engine, broker)
    }

    #[tokio::test]
    async fn test_invalid_settings_fail_fast() {
        let mut settings = test_settings();
        settings.symbols.clear();
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        assert!(TradingEngine::new(settings, broker, Arc::new(NeutralScorer)).is_err());
    }

    #[tokio::test]
    async fn test_ingest_handle_feeds_decision_queue() {
        let (mut engine, _) = engine(test_settings());
        let handle = engine.ingest_handle();
        let symbol = Symbol::new("AAPL");

        let base = chrono::Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 10).unwrap();
        handle.on_tick(&symbol, Tick::new(base, 100.0, 5.0));
        handle.on_tick(&symbol, Tick::new(base + chrono::TimeDelta::minutes(1), 101.0, 5.0));

        assert_eq!(engine.aggregator().bar_count(&symbol), 1);
        let mut rx = engine.bar_events_rx.take().unwrap();
        assert_eq!(rx.try_recv().unwrap(), symbol);
    }

    #[tokio::test]
    async fn test_seed_from_history() {
        let (engine, _) = engine(test_settings());
        let source = SyntheticBarSource::new(100.0, 7);
        engine.seed_from(&source).unwrap();
        assert!(engine.aggregator().bar_count(&Symbol::new("AAPL")) > 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_daily_target_and_sweeps() {
        let mut settings = test_settings();
        // Zero target: stop-trading is signaled on the first supervision pass.
        settings.target_daily_return_pct = 0.0;
        let (mut engine, _) = engine(settings);

        let symbol = Symbol::new("AAPL");
        engine.risk_manager().open(&symbol, 100.0, None).unwrap();
        engine.run().await.unwrap();

        // The sweep force-closed the position before returning.
        assert!(engine.risk_manager().open_positions().is_empty());
        assert_eq!(engine.risk_manager().trade_history().len(), 1);
    }
}
