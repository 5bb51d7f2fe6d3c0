//! The fallback provider (§4.1): a daily-only, CSV-based source used
//! once both the rich provider and (for crypto) the futures provider
//! are exhausted or breaker-open. Modeled on the CSV ingestion style
//! seen in the pack's alphavantage loaders, but over a plain HTTP GET
//! rather than a vendor SDK.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::{CryptoMicrostructure, Period, RawCandle};
use crate::error::ProviderError;
use crate::resilience::RateLimiter;

use super::CandleProvider;

const SOURCE_NAME: &str = "fallback";

pub struct FallbackProvider {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl FallbackProvider {
    pub fn new(base_url: impl Into<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            rate_limiter,
        }
    }

    fn parse_row(record: &csv::StringRecord) -> Result<RawCandle, ProviderError> {
        let malformed = |message: String| ProviderError::MalformedResponse {
            source_name: SOURCE_NAME.to_string(),
            message,
        };
        let date_str = record.get(0).ok_or_else(|| malformed("missing date column".into()))?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| malformed(format!("bad date {date_str}: {e}")))?;
        let period_open = date.and_hms_opt(0, 0, 0).unwrap().and_utc();

        let decimal_at = |idx: usize, field: &str| -> Result<Decimal, ProviderError> {
            let raw = record.get(idx).ok_or_else(|| malformed(format!("missing {field}")))?;
            Decimal::from_str(raw).map_err(|e| malformed(format!("bad {field}={raw}: {e}")))
        };

        let open = decimal_at(1, "open")?;
        let high = decimal_at(2, "high")?;
        let low = decimal_at(3, "low")?;
        let close = decimal_at(4, "close")?;
        let volume: u64 = record
            .get(5)
            .ok_or_else(|| malformed("missing volume".into()))?
            .parse()
            .map_err(|_| malformed("bad volume".into()))?;

        Ok(RawCandle {
            period_open,
            open,
            high,
            low,
            close,
            volume,
            microstructure: None::<CryptoMicrostructure>,
        })
    }
}

#[async_trait]
impl CandleProvider for FallbackProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    /// Only ever called with `period == Period::OneDay` per §4.1; callers
    /// that ask for an intraday period against the fallback get a plain
    /// `InvalidRequest` rather than a silent daily substitution.
    async fn fetch_candles(
        &self,
        native_symbol: &str,
        period: Period,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>, ProviderError> {
        if period != Period::OneDay {
            return Err(ProviderError::InvalidRequest(format!(
                "fallback provider only serves {:?}, got {:?}",
                Period::OneDay,
                period
            )));
        }
        if !self.rate_limiter.allow() {
            return Err(ProviderError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
                retry_after_secs: Some(self.rate_limiter.time_until_next_token().as_secs()),
            });
        }

        let url = format!("{}/daily.csv", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", native_symbol),
                ("from", &range_start.date_naive().to_string()),
                ("to", &range_end.date_naive().to_string()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Server {
                source_name: SOURCE_NAME.to_string(),
                message: format!("status {}", response.status()),
            });
        }

        let body = response.text().await.map_err(|e| ProviderError::Transport {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(body.as_bytes());
        let mut candles = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ProviderError::MalformedResponse {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;
            candles.push(Self::parse_row(&record)?);
        }
        Ok(candles)
    }
}
