//! Risk management: position sizing, drawdown tracking, trading-day rollover.

mod calculator;
mod config;
mod day;
mod error;

pub use calculator::{
    realized_pnl, AccountState, DrawdownStatus, PositionRequest, PositionResult, RiskCalculator,
    RiskMetrics, TradeRecorded, TradeSimulation, DEFAULT_BALANCE, DEFAULT_PIP_VALUE_PER_LOT,
};
pub use config::{normalize_symbol, PipScale, RiskConfig};
pub use day::TradingDay;
pub use error::RiskError;
