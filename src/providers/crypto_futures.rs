//! Crypto-futures provider, wrapping the `binance` crate's kline API —
//! the teacher's own data source, generalized behind [`CandleProvider`]
//! and [`MicrostructureProvider`] instead of a hardcoded
//! `binance::market::Market` field on the retriever.

use std::sync::Arc;

use async_trait::async_trait;
use binance::market::Market;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::domain::{CryptoMicrostructure, Period, RawCandle};
use crate::error::ProviderError;
use crate::resilience::RateLimiter;

use super::{CandleProvider, MicrostructureProvider};

const SOURCE_NAME: &str = "crypto-futures";
/// Mirrors the teacher's `BATCH_SIZE` for a single klines call.
const BATCH_SIZE: u16 = 1000;

pub struct CryptoFuturesProvider {
    market: Market,
    rate_limiter: Arc<RateLimiter>,
}

impl CryptoFuturesProvider {
    pub fn new(market: Market, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { market, rate_limiter }
    }

    fn parse_decimal(field: &str, value: &str) -> Result<Decimal, ProviderError> {
        Decimal::from_str(value).map_err(|e| ProviderError::MalformedResponse {
            source_name: SOURCE_NAME.to_string(),
            message: format!("{field}={value}: {e}"),
        })
    }
}

#[async_trait]
impl CandleProvider for CryptoFuturesProvider {
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

        let end_ms = range_end.timestamp_millis() as u64;
        let mut cursor_ms = range_start.timestamp_millis() as u64;
        let tick_ms = period.tick_millis() as u64;

        let mut candles = Vec::new();
        loop {
            let symbol = native_symbol.to_string();
            let interval = period.code().to_string();
            let market = self.market.clone();

            let klines_data = tokio::task::spawn_blocking(move || {
                market.get_klines(symbol, interval, Some(BATCH_SIZE), Some(cursor_ms), Some(end_ms))
            })
            .await
            .map_err(|e| ProviderError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: format!("join error: {e}"),
            })?
            .map_err(|e| ProviderError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: format!("{e:?}"),
            })?;

            let binance::model::KlineSummaries::AllKlineSummaries(page) = klines_data;
            if page.is_empty() {
                break;
            }

            let mut last_open_time = cursor_ms;
            for k in &page {
                let period_open = Utc
                    .timestamp_millis_opt(k.open_time)
                    .single()
                    .ok_or_else(|| ProviderError::MalformedResponse {
                        source_name: SOURCE_NAME.to_string(),
                        message: format!("invalid open_time {}", k.open_time),
                    })?;
                let volume: u64 = k.volume.parse().unwrap_or_else(|_| {
                    warn!(open_time = k.open_time, "non-numeric volume, treating as 0");
                    0
                });
                let taker_buy_volume: Option<f64> = k.taker_buy_base_asset_volume.parse().ok();
                let taker_sell_volume = taker_buy_volume.map(|buy| volume as f64 - buy);
                candles.push(RawCandle {
                    period_open,
                    open: Self::parse_decimal("open", &k.open)?,
                    high: Self::parse_decimal("high", &k.high)?,
                    low: Self::parse_decimal("low", &k.low)?,
                    close: Self::parse_decimal("close", &k.close)?,
                    volume,
                    microstructure: Some(CryptoMicrostructure {
                        taker_buy_volume,
                        taker_sell_volume,
                        open_interest: None,
                        funding_rate: None,
                        long_liquidations: None,
                        short_liquidations: None,
                    }),
                });
                last_open_time = k.open_time as u64;
            }

            let page_len = page.len() as u16;
            if page_len < BATCH_SIZE || last_open_time + tick_ms > end_ms {
                break;
            }
            cursor_ms = last_open_time + tick_ms;
        }
        Ok(candles)
    }
}

#[async_trait]
impl MicrostructureProvider for CryptoFuturesProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    /// The `binance` market-data crate exposes klines (which already
    /// carry taker-buy volume) but not open interest or funding rate as
    /// a time series; those require the futures REST endpoints this
    /// crate does not wrap, so this returns an empty series rather than
    /// guessing at values, leaving the fields `None` per §3.
    async fn fetch_microstructure(
        &self,
        _native_symbol: &str,
        _period: Period,
        _range_start: DateTime<Utc>,
        _range_end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, CryptoMicrostructure)>, ProviderError> {
        Ok(Vec::new())
    }
}
