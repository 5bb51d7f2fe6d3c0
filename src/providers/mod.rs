//! Provider clients (§4.1): the fetch boundary between the engine and
//! external market-data sources. Each provider paces itself through a
//! [`RateLimiter`](crate::resilience::RateLimiter) and reports failures
//! the aggregator feeds into its [`CircuitBreaker`](crate::resilience::CircuitBreaker) —
//! generalized from the teacher's `CandleRetriever`, which pinned both
//! concerns to a single hardcoded `binance::market::Market` client.

pub mod crypto_futures;
pub mod fallback;
pub mod rich;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CryptoMicrostructure, Period, RawCandle};
use crate::error::ProviderError;

pub use crypto_futures::CryptoFuturesProvider;
pub use fallback::FallbackProvider;
pub use rich::RichProvider;

/// A source of OHLCV candles for one native symbol (§4.1). Implementors
/// page internally and return a single deduplicated, time-ordered batch;
/// the caller (the aggregator) drives repeated calls until the requested
/// range is exhausted, mirroring the teacher's `fetch_one_batch` loop
/// contract but abstracted behind a trait instead of a concrete struct.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches candles for `native_symbol` at `period`, covering
    /// `[range_start, range_end)`. Returns fewer candles than requested
    /// when the range is exhausted on the provider's side (e.g. listing
    /// date reached); an empty vec signals full exhaustion.
    async fn fetch_candles(
        &self,
        native_symbol: &str,
        period: Period,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>, ProviderError>;
}

/// A source of crypto-only microstructure fields (§3), fetched
/// separately from OHLCV because not every `CandleProvider` carries it.
#[async_trait]
pub trait MicrostructureProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_microstructure(
        &self,
        native_symbol: &str,
        period: Period,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, CryptoMicrostructure)>, ProviderError>;
}
