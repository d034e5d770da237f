//! Response types for the exchange-rates API.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Body of `/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestRatesResponse {
    pub success: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub rates: HashMap<String, Decimal>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Error object returned alongside `success: false`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub info: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.info.is_empty() {
            write!(f, "{} ({})", self.kind, self.code)
        } else {
            write!(f, "{} ({}): {}", self.kind, self.code, self.info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_success() {
        let body = r#"{
            "success": true,
            "timestamp": 1713263400,
            "base": "EUR",
            "date": "2025-04-16",
            "rates": {"USD": 1.085, "JPY": 163.42}
        }"#;

        let parsed: LatestRatesResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.base, "EUR");
        assert_eq!(parsed.rates.get("USD").copied(), Some(dec!(1.085)));
    }

    #[test]
    fn test_parse_error() {
        let body = r#"{
            "success": false,
            "error": {"code": 101, "type": "invalid_access_key", "info": "You have not supplied a valid API Access Key."}
        }"#;

        let parsed: LatestRatesResponse = serde_json::from_str(body).unwrap();
        assert!(!parsed.success);
        let err = parsed.error.unwrap();
        assert_eq!(err.code, 101);
        assert!(err.to_string().starts_with("invalid_access_key (101)"));
    }
}
