//! Tick ingestion, bar aggregation, and indicator computation

pub mod aggregator;
pub mod feed;
pub mod history;
pub mod indicators;
pub mod session;
pub mod types;

pub use aggregator::BarAggregator;
pub use feed::{SimulatedTickFeed, TickSource};
pub use history::{HistoricalBarSource, HistoryError, SyntheticBarSource};
pub use indicators::IndicatorParams;
pub use session::MarketSession;
pub use types::{floor_to_minute, to_exchange_local, Bar, IndicatorBar, Symbol, Tick};
