//! Trade direction and journal records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::risk::{realized_pnl, RiskError};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buy" | "long" => Some(Self::Buy),
            "sell" | "short" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Lifecycle of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A trade taken from a sized position, as kept in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,

    /// Pair symbol, e.g. `EUR/USD`
    pub pair_symbol: String,

    pub direction: Direction,

    pub entry_price: Decimal,

    pub stop_loss: Decimal,

    #[serde(default)]
    pub take_profit: Option<Decimal>,

    /// Price-weighted units, as returned by the sizer
    pub position_size: Decimal,

    /// Dollar risk at the time the trade was opened
    pub risk_amount: Decimal,

    pub status: TradeStatus,

    /// Set once the trade is closed
    #[serde(default)]
    pub profit_loss: Option<Decimal>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// P&L if the trade were closed at `exit_price`.
    pub fn pnl_at(&self, exit_price: Decimal) -> Result<Decimal, RiskError> {
        realized_pnl(self.direction, self.entry_price, exit_price, self.position_size)
    }
}
