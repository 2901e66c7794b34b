//! Exchange session calendar
//!
//! The exchange clock is modeled as a fixed UTC offset plus a daily
//! open/close window; weekends are always closed.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

/// Daily trading window in exchange-local time.
#[derive(Clone, Copy, Debug)]
pub struct MarketSession {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
}

impl MarketSession {
    pub fn new(offset: FixedOffset, open: NaiveTime, close: NaiveTime) -> Self {
        Self { offset, open, close }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    fn is_weekend(local: DateTime<FixedOffset>) -> bool {
        matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// True while the exchange accepts orders: a weekday, within
    /// `[open, close)` exchange-local.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = self.local(now);
        if Self::is_weekend(local) {
            return false;
        }
        let t = local.time();
        t >= self.open && t < self.close
    }

    /// True once the session is over for the day (past close, or weekend).
    pub fn is_closed_for_day(&self, now: DateTime<Utc>) -> bool {
        let local = self.local(now);
        if Self::is_weekend(local) {
            return true;
        }
        local.time() >= self.close
    }
}
