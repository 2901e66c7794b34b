//! Broker order-submission contract
//!
//! Implementations own transport and pacing. The mandatory minimum
//! inter-call spacing lives here, on the submission path, so waiting on the
//! gate can never stall tick ingestion.

pub mod paper;

pub use paper::PacedPaperBroker;

use crate::market_data::Symbol;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid order request: {0}")]
    InvalidRequest(String),
    #[error("submission failed for {symbol}: {reason}")]
    Submission { symbol: Symbol, reason: String },
    #[error("unknown order id {0}")]
    UnknownOrder(String),
}

/// Order direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order pricing style
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

/// Order submitted to a broker.
#[derive(Clone, Debug)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub symbol: Symbol,
    pub quantity: u32,
    pub price: f64,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn limit_buy(symbol: Symbol, quantity: u32, price: f64) -> Self {
        Self { side: OrderSide::Buy, symbol, quantity, price, order_type: OrderType::Limit }
    }

    pub fn limit_sell(symbol: Symbol, quantity: u32, price: f64) -> Self {
        Self { side: OrderSide::Sell, symbol, quantity, price, order_type: OrderType::Limit }
    }

    pub fn validate(&self) -> Result<(), BrokerError> {
        if !self.symbol.validate() {
            return Err(BrokerError::InvalidRequest(format!("invalid symbol {:?}", self.symbol.as_str())));
        }
        if self.quantity == 0 {
            return Err(BrokerError::InvalidRequest("quantity must be positive".into()));
        }
        if self.price <= 0.0 || !self.price.is_finite() {
            return Err(BrokerError::InvalidRequest("price must be positive".into()));
        }
        Ok(())
    }
}

/// Broker acknowledgement of an accepted order.
#[derive(Clone, Debug)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: f64,
}

/// Broker interface. Submission errors propagate to the caller; they are
/// never swallowed here.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderAck, BrokerError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;
}

/// Enforces the minimum spacing between consecutive broker calls. Callers
/// queue on the internal lock, so spacing holds across tasks.
pub struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_call: Mutex::new(None) }
    }

    /// Wait until the minimum interval since the previous call has elapsed,
    /// then claim the slot.
    pub async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
