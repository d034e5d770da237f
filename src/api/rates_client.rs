//! Exchange-rates API client for live pair quotes.

use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::CurrencyPair;

use super::types::LatestRatesResponse;

const RATES_API_BASE: &str = "http://api.exchangeratesapi.io/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(60);

/// Client for an exchangeratesapi.io-compatible endpoint (read-only).
pub struct RatesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RatesClient {
    /// Create a new client against the public API.
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, RATES_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn latest_url(&self, base_currency: &str, symbols: &[&str]) -> String {
        let mut url = format!(
            "{}/latest?access_key={}&base={}",
            self.base_url, self.api_key, base_currency
        );
        if !symbols.is_empty() {
            url = format!("{}&symbols={}", url, symbols.join(","));
        }
        url
    }

    /// Fetch the latest rates of `symbols` against `base_currency`.
    ///
    /// Network errors, 429 and 5xx responses are retried with exponential
    /// backoff; anything else fails immediately.
    pub async fn get_latest_rates(
        &self,
        base_currency: &str,
        symbols: &[&str],
    ) -> Result<LatestRatesResponse> {
        let url = self.latest_url(base_currency, symbols);
        debug!(base = %base_currency, symbols = ?symbols, "Fetching latest rates");

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        };

        let client = &self.client;
        let url = url.as_str();

        let body: LatestRatesResponse = backoff::future::retry(policy, || async move {
            let response = client
                .get(url)
                .send()
                .await
                .context("Failed to fetch latest rates")
                .map_err(backoff::Error::transient)?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!(status = %status, "Rates request failed, retrying");
                return Err(backoff::Error::transient(anyhow::anyhow!(
                    "Rates request failed: {}",
                    status
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(anyhow::anyhow!(
                    "Rates request failed: {} - {}",
                    status,
                    body
                )));
            }

            response
                .json::<LatestRatesResponse>()
                .await
                .context("Failed to parse rates response")
                .map_err(backoff::Error::permanent)
        })
        .await?;

        if !body.success {
            match &body.error {
                Some(err) => anyhow::bail!("Rates API error: {}", err),
                None => anyhow::bail!("Rates API reported failure"),
            }
        }

        Ok(body)
    }

    /// Latest quote for one pair: units of quote currency per base unit.
    pub async fn get_pair_rate(&self, pair: &CurrencyPair) -> Result<Decimal> {
        let base = pair.base();
        let quote = pair.quote();

        let body = self.get_latest_rates(&base, &[quote.as_str()]).await?;
        body.rates
            .get(&quote)
            .copied()
            .with_context(|| format!("No {} rate in response for {}", quote, pair.symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_url() {
        let client =
            RatesClient::with_base_url("key123".to_string(), "http://localhost:9/v1/".to_string())
                .unwrap();

        assert_eq!(
            client.latest_url("EUR", &["USD", "JPY"]),
            "http://localhost:9/v1/latest?access_key=key123&base=EUR&symbols=USD,JPY"
        );
        assert_eq!(
            client.latest_url("GBP", &[]),
            "http://localhost:9/v1/latest?access_key=key123&base=GBP"
        );
    }
}
