//! Risk management: capital ledger, sizing, and capital-protection rules

use crate::config::Settings;
use crate::market_data::Symbol;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};

/// Risk limits configuration, copied out of the immutable settings at
/// construction. Percentage fields are fractions.
#[derive(Clone, Debug)]
pub struct RiskLimits {
    pub max_position_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub daily_max_loss_pct: f64,
    pub target_daily_return_pct: f64,
    pub atr_stop_multiplier: f64,
    pub atr_take_multiplier: f64,
}

impl From<&Settings> for RiskLimits {
    fn from(settings: &Settings) -> Self {
        Self {
            max_position_pct: settings.max_position_pct,
            stop_loss_pct: settings.stop_loss_pct,
            take_profit_pct: settings.take_profit_pct,
            daily_max_loss_pct: settings.daily_max_loss_pct,
            target_daily_return_pct: settings.target_daily_return_pct,
            atr_stop_multiplier: settings.atr_stop_multiplier,
            atr_take_multiplier: settings.atr_take_multiplier,
        }
    }
}

/// Open lot for one symbol. At most one exists per symbol at any time.
#[derive(Clone, Debug)]
pub struct Position {
    pub symbol: Symbol,
    pub entry_price: f64,
    pub quantity: u32,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub open: bool,
}

impl Position {
    pub fn breaches_stop_loss(&self, current_price: f64) -> bool {
        current_price <= self.stop_loss_price
    }

    pub fn breaches_take_profit(&self, current_price: f64) -> bool {
        current_price >= self.take_profit_price
    }
}

/// Immutable snapshot created when a position closes. The ordered list of
/// records forms the equity curve.
#[derive(Clone, Debug)]
pub struct TradeRecord {
    pub symbol: Symbol,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u32,
    pub pnl: f64,
    pub equity_after: f64,
}

/// Account ledger. `capital` moves only on close; `available_cash` is
/// debited on open and credited on close.
#[derive(Clone, Debug)]
pub struct AccountState {
    pub capital: f64,
    pub available_cash: f64,
    pub daily_starting_capital: f64,
}

/// Position size with its protective levels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sizing {
    pub quantity: u32,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// One point of the realized equity curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub equity: f64,
}

/// Owns the account state, the open-position map, and the trade history.
pub struct RiskManager {
    limits: RiskLimits,
    account: RwLock<AccountState>,
    positions: RwLock<HashMap<Symbol, Position>>,
    trades: RwLock<Vec<TradeRecord>>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits, initial_capital: f64) -> Self {
        Self {
            limits,
            account: RwLock::new(AccountState {
                capital: initial_capital,
                available_cash: initial_capital,
                daily_starting_capital: initial_capital,
            }),
            positions: RwLock::new(HashMap::new()),
            trades: RwLock::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn account(&self) -> AccountState {
        self.account.read().clone()
    }

    /// Sizing formula alone, before the cash-feasibility gate. ATR-based when
    /// a recent positive ATR is supplied, percent-based otherwise.
    pub fn compute_sizing(&self, price: f64, atr: Option<f64>) -> Sizing {
        let capital = self.account.read().capital;
        match atr.filter(|a| *a > 0.0 && a.is_finite()) {
            Some(atr) => {
                let risk_per_share = atr * self.limits.atr_stop_multiplier;
                let max_risk_budget = capital * self.limits.max_position_pct;
                Sizing {
                    quantity: (max_risk_budget / risk_per_share).floor() as u32,
                    stop_loss: price - atr * self.limits.atr_stop_multiplier,
                    take_profit: price + atr * self.limits.atr_take_multiplier,
                }
            }
            None => {
                let max_value = capital * self.limits.max_position_pct;
                Sizing {
                    quantity: (max_value / price).floor() as u32,
                    stop_loss: price * (1.0 - self.limits.stop_loss_pct),
                    take_profit: price * (1.0 + self.limits.take_profit_pct),
                }
            }
        }
    }

    /// Size a prospective position. `None` iff the quantity rounds below one
    /// share or the cost exceeds available cash.
    pub fn size_position(&self, symbol: &Symbol, price: f64, atr: Option<f64>) -> Option<Sizing> {
        let sizing = self.compute_sizing(price, atr);
        if sizing.quantity < 1 {
            warn!(%symbol, price, "sizing infeasible: quantity below one share");
            return None;
        }
        let cost = price * sizing.quantity as f64;
        let available = self.account.read().available_cash;
        if cost > available {
            warn!(%symbol, cost, available, "sizing infeasible: insufficient cash");
            return None;
        }
        Some(sizing)
    }

    /// Entry gate: feasible sizing, drawdown under the daily loss limit, and
    /// no open position for the symbol.
    pub fn can_open(&self, symbol: &Symbol, price: f64, atr: Option<f64>) -> bool {
        if self.has_open_position(symbol) {
            return false;
        }
        if self.current_drawdown() >= self.limits.daily_max_loss_pct {
            warn!(%symbol, "entry blocked: daily loss limit reached");
            return false;
        }
        self.size_position(symbol, price, atr).is_some()
    }

    /// Open a position: size, debit cash, insert. No-op when sizing is
    /// infeasible or a position is already open for the symbol.
    pub fn open(&self, symbol: &Symbol, price: f64, atr: Option<f64>) -> Option<Position> {
        if self.has_open_position(symbol) {
            warn!(%symbol, "refusing to open: position already open");
            return None;
        }
        let sizing = self.size_position(symbol, price, atr)?;

        let position = Position {
            symbol: symbol.clone(),
            entry_price: price,
            quantity: sizing.quantity,
            stop_loss_price: sizing.stop_loss,
            take_profit_price: sizing.take_profit,
            entry_time: Utc::now(),
            open: true,
        };

        {
            let mut account = self.account.write();
            account.available_cash -= price * sizing.quantity as f64;
        }
        self.positions.write().insert(symbol.clone(), position.clone());

        info!(%symbol, price, quantity = sizing.quantity,
              stop_loss = sizing.stop_loss, take_profit = sizing.take_profit,
              "opened position");
        Some(position)
    }

    /// Close the symbol's open position at `exit_price`, realizing P&L into
    /// capital and appending a trade record. No-op without an open position.
    pub fn close(&self, symbol: &Symbol, exit_price: f64) -> Option<TradeRecord> {
        let mut positions = self.positions.write();
        let position = match positions.get_mut(symbol) {
            Some(p) if p.open => p,
            _ => return None,
        };
        position.open = false;
        let position = position.clone();
        positions.remove(symbol);
        drop(positions);

        let pnl = (exit_price - position.entry_price) * position.quantity as f64;
        let equity_after = {
            let mut account = self.account.write();
            account.available_cash += exit_price * position.quantity as f64;
            account.capital += pnl;
            account.capital
        };

        let record = TradeRecord {
            symbol: symbol.clone(),
            entry_time: position.entry_time,
            exit_time: Utc::now(),
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            pnl,
            equity_after,
        };
        self.trades.write().push(record.clone());

        info!(%symbol, exit_price, pnl, capital = equity_after, "closed position");
        Some(record)
    }

    pub fn has_open_position(&self, symbol: &Symbol) -> bool {
        self.positions.read().get(symbol).map(|p| p.open).unwrap_or(false)
    }

    pub fn open_position(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.read().get(symbol).filter(|p| p.open).cloned()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.read().values().filter(|p| p.open).cloned().collect()
    }

    pub fn trade_history(&self) -> Vec<TradeRecord> {
        self.trades.read().clone()
    }

    /// Realized equity curve: the daily starting capital (timestamped at the
    /// first trade's entry, or now when no trades exist) followed by the
    /// equity after each close, in close order.
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        let trades = self.trades.read();
        let start_ts = trades.first().map(|t| t.entry_time).unwrap_or_else(Utc::now);
        let start = self.account.read().daily_starting_capital;

        let mut curve = Vec::with_capacity(trades.len() + 1);
        curve.push(EquityPoint { ts: start_ts, equity: start });
        curve.extend(trades.iter().map(|t| EquityPoint { ts: t.exit_time, equity: t.equity_after }));
        curve
    }

    /// Maximum peak-to-trough decline over the equity curve, as a fraction of
    /// the running peak. Zero for a single-point curve.
    pub fn current_drawdown(&self) -> f64 {
        let curve = self.equity_curve();
        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0_f64;
        for point in curve {
            peak = peak.max(point.equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - point.equity) / peak);
            }
        }
        max_drawdown
    }

    /// False (stop trading) once the daily return target is met or the daily
    /// loss limit is breached; true otherwise.
    pub fn check_daily_targets(&self) -> bool {
        let account = self.account.read();
        let start = account.daily_starting_capital;
        let current_return = (account.capital - start) / start;
        drop(account);

        if current_return >= self.limits.target_daily_return_pct {
            info!(return_pct = current_return * 100.0, "daily return target reached, stopping");
            return false;
        }
        if self.current_drawdown() >= self.limits.daily_max_loss_pct {
            info!("daily loss limit reached, stopping");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_scenario_a_percent_mode_lifecycle() {
        // capital=1000, maxPositionPct=0.5, price=100 -> qty 5
        let risk = RiskManager::new(limits(), 1000.0);
        let sizing = risk.size_position(&symbol(), 100.0, None).unwrap();
        assert_eq!(sizing.quantity, 5);

        risk.open(&symbol(), 100.0, None).unwrap();
        let account = risk.account();
        assert_eq!(account.available_cash, 500.0);
        assert_eq!(account.capital, 1000.0);

        let record = risk.close(&symbol(), 102.0).unwrap();
        assert_eq!(record.pnl, 10.0);
        let account = risk.account();
        assert_eq!(account.capital, 1010.0);
        // cash: 500 remaining + 102 * 5 credited
        assert_eq!(account.available_cash, 1010.0);
    }

    #[test]
    fn test_scenario_b_atr_sizing_formula() {
        // ATR=2, stop mult 1, take mult 2, maxPositionPct=0.1, capital=1000
        let mut l = limits();
        l.max_position_pct = 0.1;
        let risk = RiskManager::new(l, 1000.0);
        let sizing = risk.compute_sizing(100.0, Some(2.0));
        assert_eq!(sizing.quantity, 50);
        assert_eq!(sizing.stop_loss, 98.0);
        assert_eq!(sizing.take_profit, 104.0);

        // The full gate still rejects it: 50 shares cost more than the cash.
        assert!(risk.size_position(&symbol(), 100.0, Some(2.0)).is_none());
    }

    #[test]
    fn test_scenario_d_daily_target_stops_trading() {
        let risk = RiskManager::new(limits(), 1000.0);
        risk.open(&symbol(), 100.0, None).unwrap();
        risk.close(&symbol(), 104.0).unwrap(); // pnl 20 -> capital 1020
        assert_eq!(risk.account().capital, 1020.0);
        assert!(!risk.check_daily_targets());
    }

    #[test]
    fn test_sizing_infeasible_cases() {
        let risk = RiskManager::new(limits(), 1000.0);
        // quantity floors to zero
        assert!(risk.size_position(&symbol(), 600.0, None).is_none());
        // negative quantity can never happen: u32 floor of a non-negative ratio
        let sizing = risk.compute_sizing(1.0, None);
        assert!(sizing.quantity >= 1);
    }

    #[test]
    fn test_sizing_infeasible_after_cash_drained() {
        let risk = RiskManager::new(limits(), 1000.0);
        risk.open(&symbol(), 100.0, None).unwrap(); // cash 500
        let other = Symbol::new("MSFT");
        // 5 shares would cost 500 == cash, feasible; drain a bit more first.
        risk.open(&other, 100.0, None).unwrap(); // cash 0
        assert!(risk.size_position(&Symbol::new("GOOG"), 100.0, None).is_none());
    }

    #[test]
    fn test_one_open_position_per_symbol() {
        let risk = RiskManager::new(limits(), 1000.0);
        assert!(risk.open(&symbol(), 100.0, None).is_some());
        assert!(risk.open(&symbol(), 100.0, None).is_none());
        assert!(!risk.can_open(&symbol(), 100.0, None));
    }

    #[test]
    fn test_close_without_position_is_noop() {
        let risk = RiskManager::new(limits(), 1000.0);
        assert!(risk.close(&symbol(), 100.0).is_none());
        assert_eq!(risk.account().capital, 1000.0);
    }

    #[test]
    fn test_drawdown_zero_at_new_peak() {
        let risk = RiskManager::new(limits(), 1000.0);
        assert_eq!(risk.current_drawdown(), 0.0);

        risk.open(&symbol(), 100.0, None).unwrap();
        risk.close(&symbol(), 101.0).unwrap(); // new peak
        assert_eq!(risk.current_drawdown(), 0.0);
    }

    #[test]
    fn test_drawdown_tracks_running_peak() {
        let mut l = limits();
        l.daily_max_loss_pct = 0.5; // keep entries allowed for the test
        let risk = RiskManager::new(l, 1000.0);

        risk.open(&symbol(), 100.0, None).unwrap();
        risk.close(&symbol(), 110.0).unwrap(); // capital 1050, peak
        risk.open(&symbol(), 100.0, None).unwrap();
        risk.close(&symbol(), 90.0).unwrap(); // capital 1000

        let drawdown = risk.current_drawdown();
        assert!(drawdown > 0.0);
        assert!((drawdown - 50.0 / 1050.0).abs() < 1e-12);
    }

    #[test]
    fn test_daily_loss_limit_blocks_entry() {
        let mut l = limits();
        l.daily_max_loss_pct = 0.04;
        let risk = RiskManager::new(l, 1000.0);

        risk.open(&symbol(), 100.0, None).unwrap();
        risk.close(&symbol(), 90.0).unwrap(); // capital 950, drawdown 5%
        assert!(!risk.check_daily_targets());
        assert!(!risk.can_open(&symbol(), 50.0, None));
    }

    #[test]
    fn test_equity_curve_shape() {
        let risk = RiskManager::new(limits(), 1000.0);
        let curve = risk.equity_curve();
        assert_eq!(curve.len(), 1);
        assert_eq!(curve[0].equity, 1000.0);

        risk.open(&symbol(), 100.0, None).unwrap();
        risk.close(&symbol(), 102.0).unwrap();
        let curve = risk.equity_curve();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].equity, 1000.0);
        assert_eq!(curve[1].equity, 1010.0);
    }

    #[test]
    fn test_position_breach_checks() {
        let risk = RiskManager::new(limits(), 1000.0);
        let position = risk.open(&symbol(), 100.0, None).unwrap();
        assert!(position.breaches_stop_loss(98.0));
        assert!(!position.breaches_stop_loss(99.0));
        assert!(position.breaches_take_profit(104.0));
        assert!(!position.breaches_take_profit(103.9));
    }
}
