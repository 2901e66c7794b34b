//! Decision pipeline: risk ledger, signal generation, order coordination

pub mod coordinator;
pub mod engine;
pub mod hooks;
pub mod risk_manager;
pub mod signal;

pub use coordinator::OrderCoordinator;
pub use engine::{TickIngestHandle, TradingEngine};
pub use hooks::HookRegistry;
pub use risk_manager::{
    AccountState, EquityPoint, Position, RiskLimits, RiskManager, Sizing, TradeRecord,
};
pub use signal::{Decision, SignalEngine};
