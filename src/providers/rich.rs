//! The "rich" provider: a paid, full-history data vendor for stocks and
//! ETFs (§4.1's primary source for equity-like assets), fetched over
//! HTTP JSON with `reqwest`. No example in this codebase's heritage
//! wraps this specific vendor's API, so the shape follows the generic
//! alphavantage-style loader pattern: one GET per (symbol, period) page,
//! rate-limited, decoded into the neutral [`RawCandle`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{CryptoMicrostructure, Period, RawCandle};
use crate::error::ProviderError;
use crate::resilience::RateLimiter;

use super::CandleProvider;

const SOURCE_NAME: &str = "rich";

#[derive(Debug, Deserialize)]
struct RichCandlePayload {
    #[serde(rename = "t")]
    period_open_ms: i64,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: u64,
}

#[derive(Debug, Deserialize)]
struct RichResponse {
    candles: Vec<RichCandlePayload>,
}

pub struct RichProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl RichProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            rate_limiter,
        }
    }
}

#[async_trait]
impl CandleProvider for RichProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_candles(
        &self,
        native_symbol: &str,
        period: Period,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>, ProviderError> {
        if !self.rate_limiter.allow() {
            return Err(ProviderError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
                retry_after_secs: Some(self.rate_limiter.time_until_next_token().as_secs()),
            });
        }

        let url = format!("{}/v1/candles", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", native_symbol),
                ("interval", period.code()),
                ("start", &range_start.timestamp().to_string()),
                ("end", &range_end.timestamp().to_string()),
                ("apikey", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth {
                source_name: SOURCE_NAME.to_string(),
                message: format!("status {status}"),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                source_name: SOURCE_NAME.to_string(),
                symbol: native_symbol.to_string(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
                retry_after_secs,
            });
        }
        if status.is_server_error() {
            return Err(ProviderError::Server {
                source_name: SOURCE_NAME.to_string(),
                message: format!("status {status}"),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: format!("unexpected status {status}"),
            });
        }

        let payload: RichResponse = response.json().await.map_err(|e| ProviderError::MalformedResponse {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        let mut candles = Vec::with_capacity(payload.candles.len());
        for c in payload.candles {
            let period_open = DateTime::from_timestamp_millis(c.period_open_ms).ok_or_else(|| {
                ProviderError::MalformedResponse {
                    source_name: SOURCE_NAME.to_string(),
                    message: format!("invalid timestamp {}", c.period_open_ms),
                }
            })?;
            candles.push(RawCandle {
                period_open,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
                microstructure: None::<CryptoMicrostructure>,
            });
        }
        Ok(candles)
    }
}
