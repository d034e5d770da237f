//! Price-history analysis over stored candles.
//!
//! - Swing points, trend lines and horizontal support/resistance levels
//! - Breakouts from those lines, turned into pattern detections
//! - Indicator confirmation (trend, RSI, MACD, Bollinger, volume) that
//!   adjusts a detection's confidence before it is signalled
//!
//! Everything here is pure computation over a candle slice, oldest first.
//! Prices are analysed as `f64`; only the trade levels handed back to the
//! desk are converted to `Decimal`.

mod breakout;
mod confirm;
mod indicators;
mod levels;

pub use breakout::{analyze, Breakout, BreakoutConfig};
pub use confirm::{confirm, MAX_CONFIRMATION_BOOST};

use rust_decimal::prelude::ToPrimitive;

use crate::models::Candle;

/// Candle columns as `f64`, with time in seconds since the first bar.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bars {
    pub times: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl Bars {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let Some(first) = candles.first() else {
            return Self::default();
        };

        let price = |d: rust_decimal::Decimal| d.to_f64().unwrap_or(f64::NAN);
        Self {
            times: candles
                .iter()
                .map(|c| (c.timestamp - first.timestamp).num_seconds() as f64)
                .collect(),
            highs: candles.iter().map(|c| price(c.high)).collect(),
            lows: candles.iter().map(|c| price(c.low)).collect(),
            closes: candles.iter().map(|c| price(c.close)).collect(),
            volumes: candles.iter().map(|c| c.volume).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }
}
