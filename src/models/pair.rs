//! Currency pair model and the built-in pair catalog.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::risk::{normalize_symbol, PipScale};

/// How liquid a pair is, as conventionally grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PairCategory {
    #[default]
    Major,
    Cross,
    Exotic,
}

impl PairCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairCategory::Major => "major",
            PairCategory::Cross => "cross",
            PairCategory::Exotic => "exotic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "major" => Some(Self::Major),
            "cross" => Some(Self::Cross),
            "exotic" => Some(Self::Exotic),
            _ => None,
        }
    }
}

/// A tradable currency pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Storage id (0 until persisted)
    #[serde(default)]
    pub id: i64,

    /// Slash-separated symbol, e.g. `EUR/USD`
    pub symbol: String,

    /// Human-readable name
    pub name: String,

    pub category: PairCategory,

    /// Smallest standard price increment (0.0001, or 0.01 for yen pairs)
    pub pip_size: Decimal,
}

impl CurrencyPair {
    pub fn new(symbol: &str, name: &str, category: PairCategory, pip_size: Decimal) -> Self {
        Self {
            id: 0,
            symbol: symbol.to_string(),
            name: name.to_string(),
            category,
            pip_size,
        }
    }

    /// Base currency code (`EUR` in `EUR/USD`).
    pub fn base(&self) -> String {
        normalize_symbol(&self.symbol).chars().take(3).collect()
    }

    /// Quote currency code (`USD` in `EUR/USD`).
    pub fn quote(&self) -> String {
        normalize_symbol(&self.symbol).chars().skip(3).take(3).collect()
    }

    /// Pip scale from the stored pip size, falling back to the symbol convention.
    pub fn pip_scale(&self) -> PipScale {
        PipScale::from_pip_size(self.pip_size).unwrap_or_else(|_| PipScale::for_symbol(&self.symbol))
    }

    /// True if `symbol` names this pair under any common spelling.
    pub fn matches(&self, symbol: &str) -> bool {
        normalize_symbol(&self.symbol) == normalize_symbol(symbol)
    }
}

/// The pairs every new database is seeded with.
pub fn pair_catalog() -> Vec<CurrencyPair> {
    use PairCategory::*;

    let standard = dec!(0.0001);
    let jpy = dec!(0.01);

    vec![
        CurrencyPair::new("EUR/USD", "Euro / US Dollar", Major, standard),
        CurrencyPair::new("USD/JPY", "US Dollar / Japanese Yen", Major, jpy),
        CurrencyPair::new("GBP/USD", "British Pound / US Dollar", Major, standard),
        CurrencyPair::new("USD/CHF", "US Dollar / Swiss Franc", Major, standard),
        CurrencyPair::new("AUD/USD", "Australian Dollar / US Dollar", Major, standard),
        CurrencyPair::new("USD/CAD", "US Dollar / Canadian Dollar", Major, standard),
        CurrencyPair::new("NZD/USD", "New Zealand Dollar / US Dollar", Major, standard),
        CurrencyPair::new("EUR/GBP", "Euro / British Pound", Cross, standard),
        CurrencyPair::new("EUR/JPY", "Euro / Japanese Yen", Cross, jpy),
        CurrencyPair::new("GBP/JPY", "British Pound / Japanese Yen", Cross, jpy),
        CurrencyPair::new("AUD/JPY", "Australian Dollar / Japanese Yen", Cross, jpy),
        CurrencyPair::new("EUR/AUD", "Euro / Australian Dollar", Cross, standard),
        CurrencyPair::new("USD/SGD", "US Dollar / Singapore Dollar", Exotic, standard),
        CurrencyPair::new("USD/HKD", "US Dollar / Hong Kong Dollar", Exotic, standard),
        CurrencyPair::new("USD/TRY", "US Dollar / Turkish Lira", Exotic, standard),
        CurrencyPair::new("USD/MXN", "US Dollar / Mexican Peso", Exotic, standard),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_pip_sizes_follow_yen_convention() {
        for pair in pair_catalog() {
            assert_eq!(
                pair.pip_scale(),
                PipScale::for_symbol(&pair.symbol),
                "{} pip size disagrees with symbol convention",
                pair.symbol
            );
        }
    }

    #[test]
    fn test_legs_and_matching() {
        let pair = CurrencyPair::new("GBP/JPY", "British Pound / Japanese Yen", PairCategory::Cross, dec!(0.01));
        assert_eq!(pair.base(), "GBP");
        assert_eq!(pair.quote(), "JPY");
        assert!(pair.matches("gbpjpy"));
        assert!(!pair.matches("EUR/JPY"));
    }

    #[test]
    fn test_catalog_counts() {
        let pairs = pair_catalog();
        assert_eq!(pairs.len(), 16);
        assert_eq!(pairs.iter().filter(|p| p.category == PairCategory::Major).count(), 7);
        assert_eq!(pairs.iter().filter(|p| p.category == PairCategory::Exotic).count(), 4);
    }
}
