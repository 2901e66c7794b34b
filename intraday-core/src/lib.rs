//! Intraday Trading Core
//!
//! Real-time bar-aggregation, indicator, and risk-managed signal engine:
//! streaming ticks become finalized one-minute bars, bars grow technical
//! indicators, indicators combine with an external prediction score into
//! BUY/SELL/HOLD decisions, and every order passes position-sizing and
//! capital-protection rules first. Can be driven by a live push feed or a
//! simulated session.

pub mod broker;
pub mod config;
pub mod market_data;
pub mod scorer;
pub mod trading;

// Re-export main types for easy access
pub use broker::{Broker, BrokerError, OrderAck, OrderRequest, OrderSide, PacedPaperBroker};
pub use config::{ConfigError, ScorerSettings, SessionSettings, Settings, TradingMode};
pub use market_data::{
    Bar, BarAggregator, HistoricalBarSource, IndicatorBar, MarketSession, SimulatedTickFeed,
    Symbol, SyntheticBarSource, Tick, TickSource,
};
pub use scorer::{FeatureWindow, HttpScorer, NeutralScorer, Scorer};
pub use trading::{
    Decision, OrderCoordinator, Position, RiskManager, SignalEngine, TickIngestHandle,
    TradeRecord, TradingEngine,
};
