//! Errors surfaced by the risk calculator.

use rust_decimal::Decimal;
use thiserror::Error;

/// Failure or signal from a calculator operation.
///
/// `DrawdownLimitReached` is informational: trading may continue unless
/// the caller chooses to halt on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid price input: {0}")]
    InvalidPriceInput(String),

    #[error("invalid trade result: {0}")]
    InvalidTradeResult(String),

    #[error("daily drawdown limit reached: {current} of {limit}")]
    DrawdownLimitReached { current: Decimal, limit: Decimal },
}

impl RiskError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn price(msg: impl Into<String>) -> Self {
        Self::InvalidPriceInput(msg.into())
    }

    pub(crate) fn trade(msg: impl Into<String>) -> Self {
        Self::InvalidTradeResult(msg.into())
    }
}
