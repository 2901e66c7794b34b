//! Typed signal hook registry
//!
//! Hooks observe the pipeline; they never steer it. A failing hook is
//! logged and skipped, and the remaining hooks still run.

use super::signal::Decision;
use crate::market_data::{IndicatorBar, Symbol};
use tracing::warn;

type BeforeSignalFn = dyn Fn(&Symbol, &[IndicatorBar]) -> anyhow::Result<()> + Send + Sync;
type AfterSignalFn = dyn Fn(&Symbol, &Decision) -> anyhow::Result<()> + Send + Sync;

/// Ordered registry of pre/post signal callbacks.
#[derive(Default)]
pub struct HookRegistry {
    before_signal: Vec<(String, Box<BeforeSignalFn>)>,
    after_signal: Vec<(String, Box<AfterSignalFn>)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before_signal<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&Symbol, &[IndicatorBar]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before_signal.push((name.into(), Box::new(hook)));
    }

    pub fn register_after_signal<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&Symbol, &Decision) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after_signal.push((name.into(), Box::new(hook)));
    }

    pub fn run_before_signal(&self, symbol: &Symbol, bars: &[IndicatorBar]) {
        for (name, hook) in &self.before_signal {
            if let Err(e) = hook(symbol, bars) {
                warn!(%symbol, hook = name.as_str(), error = %e, "before-signal hook failed");
            }
        }
    }

    pub fn run_after_signal(&self, symbol: &Symbol, decision: &Decision) {
        for (name, hook) in &self.after_signal {
            if let Err(e) = hook(symbol, decision) {
                warn!(%symbol, hook = name.as_str(), error = %e, "after-signal hook failed");
            }
        }
    }
}
