//! Trading-day boundary tracking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Remembers which calendar day the account is trading in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingDay {
    date: NaiveDate,
}

impl TradingDay {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Advance to `today`. Returns true only when a new, later day starts.
    pub fn observe(&mut self, today: NaiveDate) -> bool {
        if today > self.date {
            self.date = today;
            true
        } else {
            false
        }
    }
}
