//! Tick source abstraction
//!
//! The aggregator never learns where ticks come from. A live adapter pushes
//! into the engine's ingestion handle from its own callback; a pull source is
//! drained by a feed task on its own cadence. Both end up on the same
//! ingestion path.

use super::types::{Symbol, Tick};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Pull-style tick source driven by the engine's feed task.
#[async_trait]
pub trait TickSource: Send {
    /// Next batch of ticks. `None` ends the feed.
    async fn next_ticks(&mut self) -> Option<Vec<(Symbol, Tick)>>;
}

/// Random-walk tick generator for simulated sessions, one tick per symbol
/// per cadence interval.
pub struct SimulatedTickFeed {
    symbols: Vec<Symbol>,
    cadence: Duration,
    prices: Vec<f64>,
    rng: StdRng,
}

impl SimulatedTickFeed {
    pub fn new(symbols: Vec<Symbol>, base_price: f64, cadence: Duration, seed: u64) -> Self {
        let prices = vec![base_price; symbols.len()];
        Self {
            symbols,
            cadence,
            prices,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

#[async_trait]
impl TickSource for SimulatedTickFeed {
    async fn next_ticks(&mut self) -> Option<Vec<(Symbol, Tick)>> {
        tokio::time::sleep(self.cadence).await;

        let now = Utc::now();
        let mut batch = Vec::with_capacity(self.symbols.len());
        for (i, symbol) in self.symbols.iter().enumerate() {
            let drift: f64 = self.rng.gen_range(-0.001..0.001);
            self.prices[i] = (self.prices[i] * (1.0 + drift)).max(0.01);
            let volume = self.rng.gen_range(1.0..10.0_f64).floor();
            batch.push((symbol.clone(), Tick::new(now, self.prices[i], volume)));
        }
        Some(batch)
    }
}
