//! Exchange-rates API client used to refresh stored pair quotes.

mod rates_client;
mod types;

pub use rates_client::RatesClient;
pub use types::{ApiError, LatestRatesResponse};
