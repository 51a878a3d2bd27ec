use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::models::Quote;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("unknown symbol {0:?}")]
    UnknownSymbol(String),

    #[error("malformed quote response: {0}")]
    Malformed(String),

    #[error("quote service unavailable: {0}")]
    Unavailable(String),
}

/// Source of current prices. One attempt per call, no caching.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Result<Quote, QuoteError>;
}

/// Connection settings for the Finnhub quote API.
#[derive(Clone)]
pub struct QuoteConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl fmt::Debug for QuoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Response structure for the Finnhub `/quote` endpoint. Only the current
/// price is used; unknown tickers come back with `c == 0`.
#[derive(Deserialize)]
struct FinnhubQuote {
    #[serde(default)]
    c: f64,
}

pub struct FinnhubClient {
    client: reqwest::Client,
    quote_url: String,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(config: &QuoteConfig) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            quote_url: format!("{}/quote", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    async fn lookup(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(QuoteError::UnknownSymbol(symbol));
        }

        let url = Url::parse_with_params(
            &self.quote_url,
            &[("symbol", symbol.as_str()), ("token", self.api_key.as_str())],
        )
        .map_err(|e| QuoteError::Unavailable(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| QuoteError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_server_error()
            || matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            )
        {
            return Err(QuoteError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            tracing::debug!("quote lookup for {} answered HTTP {}", symbol, status);
            return Err(QuoteError::UnknownSymbol(symbol));
        }

        let quote: FinnhubQuote = response.json().await.map_err(|e| {
            if e.is_timeout() {
                QuoteError::Unavailable(e.without_url().to_string())
            } else {
                QuoteError::Malformed(e.without_url().to_string())
            }
        })?;

        quote_from_price(symbol, quote.c)
    }
}

fn quote_from_price(symbol: String, price: f64) -> Result<Quote, QuoteError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(QuoteError::UnknownSymbol(symbol));
    }
    let price = Decimal::try_from(price)
        .map_err(|e| QuoteError::Malformed(e.to_string()))?
        .round_dp(4)
        .normalize();
    Ok(Quote { symbol, price })
}
