//! Paced in-process broker
//!
//! Accepts every valid order, mints an id, and remembers the submission.
//! Useful as the live-mode stand-in during paper sessions and as the test
//! double for the coordinator.

use super::{Broker, BrokerError, OrderAck, OrderRequest, RateGate};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
enum OrderState {
    Submitted,
    Cancelled,
}

/// Broker implementation with the mandatory inter-call pacing and an
/// in-memory order book of submissions.
pub struct PacedPaperBroker {
    gate: RateGate,
    orders: DashMap<String, (OrderRequest, OrderState)>,
}

impl PacedPaperBroker {
    pub fn new(min_interval: Duration) -> Self {
        Self { gate: RateGate::new(min_interval), orders: DashMap::new() }
    }

    fn next_order_id() -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("ORD_{}_{}", now, nanoid::nanoid!(8))
    }

    /// Number of orders submitted so far.
    pub fn submission_count(&self) -> usize {
        self.orders.len()
    }

    /// Snapshot of every submitted request.
    pub fn submissions(&self) -> Vec<OrderRequest> {
        self.orders.iter().map(|e| e.value().0.clone()).collect()
    }
}

#[async_trait]
impl Broker for PacedPaperBroker {
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderAck, BrokerError> {
        request.validate()?;
        self.gate.pace().await;

        let order_id = Self::next_order_id();
        let ack = OrderAck {
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price: request.price,
        };
        info!(order_id = order_id.as_str(), symbol = %request.symbol,
              side = ?request.side, quantity = request.quantity, price = request.price,
              "order submitted");
        self.orders.insert(order_id, (request, OrderState::Submitted));
        Ok(ack)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.gate.pace().await;
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(order_id.to_string()))?;
        entry.value_mut().1 = OrderState::Cancelled;
        info!(order_id, "order cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Symbol;

    #[tokio::test]
    async fn test_submit_and_cancel() {
        let broker = PacedPaperBroker::new(Duration::from_millis(1));
        let ack = broker
            .submit_order(OrderRequest::limit_buy(Symbol::new("AAPL"), 5, 100.0))
            .await
            .unwrap();
        assert_eq!(broker.submission_count(), 1);
        assert!(broker.cancel_order(&ack.order_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_order_rejected_before_pacing() {
        let broker = PacedPaperBroker::new(Duration::from_secs(10));
        let start = std::time::Instant::now();
        let result = broker
            .submit_order(OrderRequest::limit_buy(Symbol::new("AAPL"), 0, 100.0))
            .await;
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancel_unknown_order_errors() {
        let broker = PacedPaperBroker::new(Duration::from_millis(1));
        assert!(matches!(
            broker.cancel_order("ORD_missing").await,
            Err(BrokerError::UnknownOrder(_))
        ));
    }
}
