//! Chart patterns, their detections, and sized signals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::risk::PositionRequest;

/// Family a textbook chart pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Reversal,
    Continuation,
    Bilateral,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Reversal => "reversal",
            PatternKind::Continuation => "continuation",
            PatternKind::Bilateral => "bilateral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reversal" => Some(Self::Reversal),
            "continuation" => Some(Self::Continuation),
            "bilateral" => Some(Self::Bilateral),
            _ => None,
        }
    }
}

/// A named chart pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPattern {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub kind: PatternKind,
    pub description: String,
    /// Historical hit rate, 0.0 to 1.0
    pub reliability: f64,
}

impl ChartPattern {
    pub fn new(name: &str, kind: PatternKind, description: &str, reliability: f64) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            kind,
            description: description.to_string(),
            reliability,
        }
    }
}

/// Catalog name for a confirmed close above resistance.
pub const RESISTANCE_BREAKOUT: &str = "Resistance Breakout";

/// Catalog name for a confirmed close below support.
pub const SUPPORT_BREAKDOWN: &str = "Support Breakdown";

/// The patterns every new database is seeded with.
pub fn pattern_catalog() -> Vec<ChartPattern> {
    use PatternKind::*;

    vec![
        ChartPattern::new("Head and Shoulders", Reversal, "Bearish reversal pattern", 0.75),
        ChartPattern::new("Inverse Head and Shoulders", Reversal, "Bullish reversal pattern", 0.75),
        ChartPattern::new("Double Top", Reversal, "Bearish reversal pattern", 0.8),
        ChartPattern::new("Double Bottom", Reversal, "Bullish reversal pattern", 0.8),
        ChartPattern::new("Triple Top", Reversal, "Bearish reversal pattern", 0.85),
        ChartPattern::new("Triple Bottom", Reversal, "Bullish reversal pattern", 0.85),
        ChartPattern::new("Ascending Triangle", Continuation, "Bullish continuation pattern", 0.7),
        ChartPattern::new("Descending Triangle", Continuation, "Bearish continuation pattern", 0.7),
        ChartPattern::new("Symmetrical Triangle", Bilateral, "Bilateral pattern", 0.65),
        ChartPattern::new("Flag", Continuation, "Continuation pattern", 0.6),
        ChartPattern::new("Pennant", Continuation, "Continuation pattern", 0.6),
        ChartPattern::new("Wedge", Continuation, "Continuation pattern", 0.65),
        ChartPattern::new("Cup and Handle", Continuation, "Bullish continuation pattern", 0.75),
        ChartPattern::new("Rounding Bottom", Reversal, "Bullish reversal pattern", 0.7),
        ChartPattern::new("Rounding Top", Reversal, "Bearish reversal pattern", 0.7),
        ChartPattern::new(RESISTANCE_BREAKOUT, Continuation, "Close above a trend-line or horizontal resistance", 0.6),
        ChartPattern::new(SUPPORT_BREAKDOWN, Continuation, "Close below a trend-line or horizontal support", 0.6),
    ]
}

/// A pattern flagged on a pair, with suggested trade levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    #[serde(default)]
    pub id: i64,
    pub pair_symbol: String,
    pub pattern_name: String,
    /// Chart timeframe, e.g. `1h`
    pub timeframe: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Confidence score, 0 to 100
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

impl PatternDetection {
    pub fn position_request(&self) -> PositionRequest {
        let request = PositionRequest::new(self.entry_price, self.stop_loss);
        match self.take_profit {
            Some(tp) => request.with_take_profit(tp),
            None => request,
        }
    }
}

/// Detection confidence after checking it against recent price action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Confidence as stored with the detection
    pub base_confidence: f64,
    /// Adjusted confidence, 0 to 100
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl Confirmation {
    /// No adjustment, with the reason why.
    pub fn unchanged(base_confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            base_confidence,
            confidence: base_confidence,
            reasons: vec![reason.into()],
        }
    }
}

/// A detection annotated with its confirmation and sizing for the current account.
///
/// Sizing fields are `None` when the detection's levels cannot be sized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(flatten)]
    pub detection: PatternDetection,
    pub confirmation: Confirmation,
    pub risk_amount: Option<Decimal>,
    pub position_size: Option<Decimal>,
    pub lots: Option<Decimal>,
    pub risk_reward_ratio: Option<Decimal>,
    #[serde(default)]
    pub sizing_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_catalog() {
        let patterns = pattern_catalog();
        assert_eq!(patterns.len(), 17);
        assert!(patterns.iter().all(|p| p.reliability > 0.0 && p.reliability <= 1.0));
        assert!(patterns.iter().any(|p| p.name == RESISTANCE_BREAKOUT));
        assert!(patterns.iter().any(|p| p.name == SUPPORT_BREAKDOWN));
        assert_eq!(
            patterns.iter().filter(|p| p.kind == PatternKind::Bilateral).count(),
            1
        );
    }

    #[test]
    fn test_detection_to_request() {
        let detection = PatternDetection {
            id: 1,
            pair_symbol: "EUR/USD".to_string(),
            pattern_name: "Double Bottom".to_string(),
            timeframe: "1h".to_string(),
            entry_price: dec!(1.0850),
            stop_loss: dec!(1.0820),
            take_profit: Some(dec!(1.0910)),
            confidence: 85.0,
            detected_at: Utc::now(),
        };

        let request = detection.position_request();
        assert_eq!(request.take_profit_price, Some(dec!(1.0910)));
        assert_eq!(request.direction, None);
    }
}
