//! Data models for currency pairs, candles, chart patterns, detections and the trade journal.

mod candle;
mod journal;
mod pair;
mod pattern;
mod trade;

pub use candle::Candle;
pub use journal::JournalMetrics;
pub use pair::{pair_catalog, CurrencyPair, PairCategory};
pub use pattern::{
    pattern_catalog, ChartPattern, Confirmation, PatternDetection, PatternKind, Signal,
    RESISTANCE_BREAKOUT, SUPPORT_BREAKDOWN,
};
pub use trade::{Direction, TradeRecord, TradeStatus};
