//! Order lifecycle coordination
//!
//! Translates a decision into broker calls and ledger mutations. Live and
//! simulated modes run the same ledger path; only the broker call itself is
//! gated. A failed submission leaves the ledger untouched so the next
//! decision cycle can re-evaluate.

use super::risk_manager::RiskManager;
use super::signal::Decision;
use crate::broker::{Broker, BrokerError, OrderAck, OrderRequest};
use crate::config::TradingMode;
use crate::market_data::Symbol;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct OrderCoordinator {
    mode: TradingMode,
    broker: Arc<dyn Broker>,
    risk: Arc<RiskManager>,
    sweep_retry_attempts: u32,
    sweep_retry_interval: Duration,
}

impl OrderCoordinator {
    pub fn new(
        mode: TradingMode,
        broker: Arc<dyn Broker>,
        risk: Arc<RiskManager>,
        sweep_retry_attempts: u32,
        sweep_retry_interval: Duration,
    ) -> Self {
        Self { mode, broker, risk, sweep_retry_attempts, sweep_retry_interval }
    }

    /// Submit through the broker in live mode; simulated mode skips the call
    /// and reports success so the ledger path stays identical.
    async fn submit(&self, request: OrderRequest) -> Result<Option<OrderAck>, BrokerError> {
        match self.mode {
            TradingMode::Live => self.broker.submit_order(request).await.map(Some),
            TradingMode::Simulated => Ok(None),
        }
    }

    /// Apply one decision. `atr` is the latest ATR at decision time, fed back
    /// into sizing when the buy is booked.
    pub async fn execute(&self, symbol: &Symbol, decision: &Decision, atr: Option<f64>) {
        match decision {
            Decision::Hold => {}
            Decision::Buy { price, quantity } => {
                let request = OrderRequest::limit_buy(symbol.clone(), *quantity, *price);
                match self.submit(request).await {
                    Ok(_) => {
                        if self.risk.open(symbol, *price, atr).is_none() {
                            warn!(%symbol, price, "buy acknowledged but sizing became infeasible");
                        }
                    }
                    Err(e) => {
                        error!(%symbol, price, error = %e,
                               "buy submission failed, ledger unchanged");
                    }
                }
            }
            Decision::Sell { price }
            | Decision::SellStopLoss { price }
            | Decision::SellTakeProfit { price } => {
                let Some(position) = self.risk.open_position(symbol) else {
                    warn!(%symbol, "sell decision without an open position");
                    return;
                };
                let request = OrderRequest::limit_sell(symbol.clone(), position.quantity, *price);
                match self.submit(request).await {
                    Ok(_) => {
                        self.risk.close(symbol, *price);
                    }
                    Err(e) => {
                        error!(%symbol, price, error = %e,
                               "sell submission failed, ledger unchanged");
                    }
                }
            }
        }
    }

    /// End-of-session sweep: force-sell every open position at its last
    /// known close. Each liquidation is retried up to the configured attempt
    /// count; the sweep itself always runs to completion.
    pub async fn liquidate_all<F>(&self, last_close: F)
    where
        F: Fn(&Symbol) -> Option<f64>,
    {
        let open = self.risk.open_positions();
        if open.is_empty() {
            return;
        }
        info!(positions = open.len(), "liquidating open positions");

        for position in open {
            let symbol = position.symbol.clone();
            let price = last_close(&symbol).unwrap_or(position.entry_price);

            let mut attempt = 0;
            loop {
                attempt += 1;
                let request = OrderRequest::limit_sell(symbol.clone(), position.quantity, price);
                match self.submit(request).await {
                    Ok(_) => {
                        self.risk.close(&symbol, price);
                        info!(%symbol, price, "position liquidated");
                        break;
                    }
                    Err(e) if attempt < self.sweep_retry_attempts => {
                        warn!(%symbol, attempt, error = %e, "liquidation failed, retrying");
                        tokio::time::sleep(self.sweep_retry_interval).await;
                    }
                    Err(e) => {
                        error!(%symbol, attempt, error = %e,
                               "liquidation failed after final attempt");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PacedPaperBroker;
    use crate::trading::risk_manager::RiskLimits;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limits() -> RiskLimits {
        RiskLimits {
            max_position_pct: 0.5,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            daily_max_loss_pct: 0.05,
            target_daily_return_pct: 0.02,
            atr_stop_multiplier: 1.0,
            atr_take_multiplier: 2.0,
        }
    }

    fn symbol() -> Symbol {
        Symbol::new("AAPL")
    }

    /// Broker that fails the first `failures` submissions, then acks.
    struct FlakyBroker {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyBroker {
        fn new(failures: u32) -> Self {
            Self { failures, calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl Broker for FlakyBroker {
        async fn submit_order(&self, request: OrderRequest) -> Result<OrderAck, BrokerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(BrokerError::Submission {
                    symbol: request.symbol,
                    reason: "transient".into(),
                });
            }
            Ok(OrderAck {
                order_id: format!("ORD_{call}"),
                symbol: request.symbol,
                side: request.side,
                quantity: request.quantity,
                price: request.price,
            })
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn coordinator(mode: TradingMode, broker: Arc<dyn Broker>) -> (OrderCoordinator, Arc<RiskManager>) {
        let risk = Arc::new(RiskManager::new(limits(), 1000.0));
        let coordinator =
            OrderCoordinator::new(mode, broker, risk.clone(), 3, Duration::from_millis(1));
        (coordinator, risk)
    }

    #[tokio::test]
    async fn test_live_buy_then_sell_round_trip() {
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker.clone());

        coordinator
            .execute(&symbol(), &Decision::Buy { price: 100.0, quantity: 5 }, None)
            .await;
        assert!(risk.has_open_position(&symbol()));
        assert_eq!(broker.submission_count(), 1);

        coordinator.execute(&symbol(), &Decision::Sell { price: 102.0 }, None).await;
        assert!(!risk.has_open_position(&symbol()));
        assert_eq!(broker.submission_count(), 2);
        assert_eq!(risk.account().capital, 1010.0);
    }

    #[tokio::test]
    async fn test_simulated_mode_skips_broker() {
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        let (coordinator, risk) = coordinator(TradingMode::Simulated, broker.clone());

        coordinator
            .execute(&symbol(), &Decision::Buy { price: 100.0, quantity: 5 }, None)
            .await;
        assert!(risk.has_open_position(&symbol()));
        assert_eq!(broker.submission_count(), 0);

        coordinator
            .execute(&symbol(), &Decision::SellTakeProfit { price: 104.0 }, None)
            .await;
        assert!(!risk.has_open_position(&symbol()));
        assert_eq!(risk.account().capital, 1020.0);
    }

    #[tokio::test]
    async fn test_failed_buy_leaves_ledger_untouched() {
        let broker = Arc::new(FlakyBroker::new(u32::MAX));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker);

        coordinator
            .execute(&symbol(), &Decision::Buy { price: 100.0, quantity: 5 }, None)
            .await;
        assert!(!risk.has_open_position(&symbol()));
        assert_eq!(risk.account().available_cash, 1000.0);
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_position_open() {
        let broker = Arc::new(FlakyBroker::new(u32::MAX));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker);

        risk.open(&symbol(), 100.0, None).unwrap();
        coordinator.execute(&symbol(), &Decision::Sell { price: 102.0 }, None).await;
        assert!(risk.has_open_position(&symbol()));
    }

    #[tokio::test]
    async fn test_sell_without_position_is_noop() {
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker.clone());

        coordinator.execute(&symbol(), &Decision::Sell { price: 100.0 }, None).await;
        assert_eq!(broker.submission_count(), 0);
        assert_eq!(risk.account().capital, 1000.0);
    }

    #[tokio::test]
    async fn test_sweep_liquidates_every_position() {
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker);

        risk.open(&Symbol::new("AAPL"), 100.0, None).unwrap();
        risk.open(&Symbol::new("MSFT"), 50.0, None).unwrap();

        coordinator.liquidate_all(|_| Some(101.0)).await;
        assert!(risk.open_positions().is_empty());
        assert_eq!(risk.trade_history().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_retries_transient_failures() {
        let broker = Arc::new(FlakyBroker::new(2));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker);

        risk.open(&symbol(), 100.0, None).unwrap();
        coordinator.liquidate_all(|_| Some(100.0)).await;
        // Third attempt succeeds within the three-attempt budget.
        assert!(risk.open_positions().is_empty());
    }

    #[tokio::test]
    async fn test_hold_is_inert() {
        let broker = Arc::new(PacedPaperBroker::new(Duration::from_millis(1)));
        let (coordinator, risk) = coordinator(TradingMode::Live, broker.clone());
        coordinator.execute(&symbol(), &Decision::Hold, None).await;
        assert_eq!(broker.submission_count(), 0);
        assert_eq!(risk.account().capital, 1000.0);
    }
}
