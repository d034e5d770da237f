//! Risk configuration and pip conventions.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::RiskError;

/// Pip multiplier for pairs quoted in yen.
pub const JPY_PIP_SCALE: Decimal = dec!(100);

/// Pip multiplier for every other pair.
pub const STANDARD_PIP_SCALE: Decimal = dec!(10000);

/// Per-account risk parameters, validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Risk per trade as a percentage of balance (0 < r <= 100)
    risk_percentage: Decimal,

    /// Daily drawdown limit as a percentage of the previous day's balance (0 < d <= 100)
    drawdown_percentage: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percentage: dec!(0.2),    // 0.2% per trade
            drawdown_percentage: dec!(8),  // 8% of yesterday's close
        }
    }
}

impl RiskConfig {
    /// Build a config, rejecting percentages outside (0, 100].
    pub fn new(risk_percentage: Decimal, drawdown_percentage: Decimal) -> Result<Self, RiskError> {
        validate_percentage("risk_percentage", risk_percentage)?;
        validate_percentage("drawdown_percentage", drawdown_percentage)?;

        Ok(Self {
            risk_percentage,
            drawdown_percentage,
        })
    }

    pub fn risk_percentage(&self) -> Decimal {
        self.risk_percentage
    }

    pub fn drawdown_percentage(&self) -> Decimal {
        self.drawdown_percentage
    }
}

fn validate_percentage(name: &str, value: Decimal) -> Result<(), RiskError> {
    if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(RiskError::config(format!(
            "{name} must be in (0, 100], got {value}"
        )));
    }
    Ok(())
}

/// Multiplier converting a price distance into pips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipScale(Decimal);

impl Default for PipScale {
    fn default() -> Self {
        Self(STANDARD_PIP_SCALE)
    }
}

impl PipScale {
    /// Explicit scale; must be positive.
    pub fn new(scale: Decimal) -> Result<Self, RiskError> {
        if scale <= Decimal::ZERO {
            return Err(RiskError::config(format!("pip scale must be positive, got {scale}")));
        }
        Ok(Self(scale))
    }

    /// Scale from a pair's pip size, e.g. 0.0001 -> 10000, 0.01 -> 100.
    pub fn from_pip_size(pip_size: Decimal) -> Result<Self, RiskError> {
        if pip_size <= Decimal::ZERO {
            return Err(RiskError::config(format!("pip size must be positive, got {pip_size}")));
        }
        Self::new(Decimal::ONE / pip_size)
    }

    /// Convention by symbol: 100 when either leg is JPY, 10000 otherwise.
    ///
    /// Accepts `USD/JPY`, `USDJPY`, `usd_jpy` and similar spellings.
    pub fn for_symbol(symbol: &str) -> Self {
        let normalized = normalize_symbol(symbol);
        let is_jpy = normalized.len() == 6
            && (&normalized[..3] == "JPY" || &normalized[3..] == "JPY");

        if is_jpy {
            Self(JPY_PIP_SCALE)
        } else {
            Self(STANDARD_PIP_SCALE)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// Uppercase a pair symbol and drop separators: `eur/usd` -> `EURUSD`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RiskConfig::default();
        assert_eq!(config.risk_percentage(), dec!(0.2));
        assert_eq!(config.drawdown_percentage(), dec!(8));
    }

    #[test]
    fn test_rejects_out_of_range_percentages() {
        assert!(matches!(
            RiskConfig::new(dec!(0), dec!(8)),
            Err(RiskError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RiskConfig::new(dec!(0.2), dec!(-1)),
            Err(RiskError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RiskConfig::new(dec!(100.5), dec!(8)),
            Err(RiskError::InvalidConfiguration(_))
        ));
        assert!(RiskConfig::new(dec!(100), dec!(100)).is_ok());
    }

    #[test]
    fn test_pip_scale_by_symbol() {
        assert_eq!(PipScale::for_symbol("EUR/USD").value(), dec!(10000));
        assert_eq!(PipScale::for_symbol("USD/JPY").value(), dec!(100));
        assert_eq!(PipScale::for_symbol("gbpjpy").value(), dec!(100));
        assert_eq!(PipScale::for_symbol("JPY/USD").value(), dec!(100));
        assert_eq!(PipScale::for_symbol("USD/MXN").value(), dec!(10000));
    }

    #[test]
    fn test_pip_scale_from_pip_size() {
        assert_eq!(PipScale::from_pip_size(dec!(0.01)).unwrap().value(), dec!(100));
        assert_eq!(PipScale::from_pip_size(dec!(0.0001)).unwrap().value(), dec!(10000));
        assert!(PipScale::from_pip_size(Decimal::ZERO).is_err());
        assert!(PipScale::new(dec!(-5)).is_err());
    }
}
