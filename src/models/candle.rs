//! OHLCV candles stored per pair and timeframe.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price bar. `timestamp` is the bar's open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Zero when the source has no volume (rate snapshots)
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    /// A bar where every price is `price`, as recorded from a rate snapshot.
    pub fn flat(price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// Why the bar's prices cannot be a real bar, if they cannot.
    pub fn inconsistency(&self) -> Option<String> {
        if self.low <= Decimal::ZERO {
            return Some(format!("low must be positive, got {}", self.low));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Some(format!(
                "open {} and close {} must lie within low {} and high {}",
                self.open, self.close, self.low, self.high
            ));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Some(format!("volume must be a non-negative number, got {}", self.volume));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flat_candle_is_consistent() {
        let candle = Candle::flat(dec!(1.0850), Utc::now());
        assert_eq!(candle.high, candle.low);
        assert_eq!(candle.inconsistency(), None);
    }

    #[test]
    fn test_inconsistent_bars() {
        let mut candle = Candle::flat(dec!(1.0850), Utc::now());
        candle.high = dec!(1.0800);
        assert!(candle.inconsistency().is_some());

        let mut candle = Candle::flat(dec!(1.0850), Utc::now());
        candle.low = Decimal::ZERO;
        assert!(candle.inconsistency().is_some());

        let mut candle = Candle::flat(dec!(1.0850), Utc::now());
        candle.volume = -1.0;
        assert!(candle.inconsistency().is_some());
    }

    #[test]
    fn test_deserialize_with_numeric_prices() {
        let json = r#"{"timestamp":"2025-04-16T10:00:00Z","open":1.085,"high":"1.0870","low":1.084,"close":1.086,"volume":1200}"#;
        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(candle.high, dec!(1.0870));
        assert_eq!(candle.volume, 1200.0);
        assert_eq!(candle.inconsistency(), None);
    }
}
