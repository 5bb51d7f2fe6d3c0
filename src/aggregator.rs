//! Source-priority walking and symbol translation (§4.1/§4.3): the
//! piece that decides which provider to call for a symbol and what to
//! do when one fails. Grounded on the teacher's `fetch_one_batch` loop
//! shape (try, check exhaustion, report), generalized from "one fixed
//! Binance client" to "walk a priority list of [`CandleProvider`]s,
//! each guarded by its own circuit breaker."

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::domain::{AssetClass, FetchAudit, Period, RawCandle, SymbolRegistry};
use crate::error::{AggregatorError, ProviderError};
use crate::resilience::{BoundedConcurrency, CircuitBreaker};

use crate::providers::CandleProvider;

/// One candidate source in a priority chain, paired with the breaker
/// that guards it.
pub struct SourceEntry {
    pub provider: Arc<dyn CandleProvider>,
    pub breaker: Arc<CircuitBreaker>,
}

/// The outcome of walking the priority chain for one (symbol, period).
pub struct FetchOutcome {
    pub candles: Vec<RawCandle>,
    pub source_used: String,
    pub audit: FetchAudit,
}

pub struct Aggregator {
    registry: Arc<SymbolRegistry>,
    /// Priority-ordered source chains, keyed by asset class (§4.1:
    /// equities try rich then fallback; crypto tries crypto-futures then
    /// rich then fallback).
    chains: HashMap<AssetClass, Vec<SourceEntry>>,
    concurrency: BoundedConcurrency,
}

impl Aggregator {
    pub fn new(
        registry: Arc<SymbolRegistry>,
        chains: HashMap<AssetClass, Vec<SourceEntry>>,
        scheduler_config: &SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            chains,
            concurrency: BoundedConcurrency::new(
                scheduler_config.max_concurrent_symbols,
                scheduler_config.per_acquire_deadline,
            ),
        }
    }

    /// Walks the priority chain for `symbol`'s asset class, skipping any
    /// source whose breaker is open, until one succeeds or all are
    /// exhausted (§4.1's "all-sources-exhausted" terminal error).
    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        period: Period,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<FetchOutcome, AggregatorError> {
        let descriptor = self
            .registry
            .get(symbol)
            .ok_or_else(|| AggregatorError::SymbolNotRegistered(symbol.to_string()))?;

        let chain = self
            .chains
            .get(&descriptor.asset_class)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut last_error: Option<ProviderError> = None;

        for entry in chain {
            if entry.breaker.guard().is_err() {
                warn!(source = entry.provider.name(), symbol, "skipping: breaker open");
                continue;
            }

            let native_symbol = descriptor
                .alias_for(entry.provider.name())
                .unwrap_or(symbol);

            let started = Instant::now();
            let result = entry
                .provider
                .fetch_candles(native_symbol, period, range_start, range_end)
                .await;
            let latency_ms = started.elapsed().as_millis() as i64;

            match result {
                Ok(candles) => {
                    entry.breaker.record_success();
                    let audit = FetchAudit {
                        id: None,
                        symbol: symbol.to_string(),
                        source: entry.provider.name().to_string(),
                        period,
                        requested_start: range_start,
                        requested_end: range_end,
                        fetched_count: candles.len() as i64,
                        inserted_count: 0,
                        updated_count: 0,
                        latency_ms,
                        success: true,
                        quota_remaining: None,
                        error_text: None,
                        timestamp: Utc::now(),
                    };
                    return Ok(FetchOutcome {
                        candles,
                        source_used: entry.provider.name().to_string(),
                        audit,
                    });
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    info!(source = entry.provider.name(), symbol, error = %e, "source failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.unwrap_or(ProviderError::InvalidRequest(
            "no sources configured for asset class".to_string(),
        ));
        Err(AggregatorError::AllSourcesExhausted {
            symbol: symbol.to_string(),
            period: period.code().to_string(),
            last_error,
        })
    }

    /// Fetches several symbols concurrently, bounded by the scheduler's
    /// `max_concurrent_symbols` semaphore (§4.7), rather than the
    /// teacher's unbounded `join_all` over every timeframe at once.
    pub async fn fetch_parallel(
        &self,
        requests: &[(String, Period, DateTime<Utc>, DateTime<Utc>)],
    ) -> Vec<Result<FetchOutcome, AggregatorError>> {
        let futures = requests.iter().map(|(symbol, period, start, end)| async move {
            match self.concurrency.acquire().await {
                Ok(_permit) => self.fetch_ohlcv(symbol, *period, *start, *end).await,
                Err(e) => Err(e),
            }
        });
        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::CircuitBreakerConfig;
    use crate::domain::{Period, SymbolDescriptor};

    struct AlwaysFails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CandleProvider for AlwaysFails {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn fetch_candles(
            &self,
            _native_symbol: &str,
            _period: Period,
            _range_start: DateTime<Utc>,
            _range_end: DateTime<Utc>,
        ) -> Result<Vec<RawCandle>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transport {
                source_name: "flaky".into(),
                message: "boom".into(),
            })
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl CandleProvider for AlwaysSucceeds {
        fn name(&self) -> &str {
            "reliable"
        }
        async fn fetch_candles(
            &self,
            _native_symbol: &str,
            _period: Period,
            _range_start: DateTime<Utc>,
            _range_end: DateTime<Utc>,
        ) -> Result<Vec<RawCandle>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn registry_with_aapl() -> Arc<SymbolRegistry> {
        let mut registry = SymbolRegistry::new();
        registry.register(SymbolDescriptor::new("AAPL", AssetClass::Stock, vec![Period::OneDay]));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn falls_back_to_second_source_on_failure() {
        let registry = registry_with_aapl();
        let chain = vec![
            SourceEntry {
                provider: Arc::new(AlwaysFails { calls: AtomicUsize::new(0) }),
                breaker: Arc::new(CircuitBreaker::new("flaky", CircuitBreakerConfig::default())),
            },
            SourceEntry {
                provider: Arc::new(AlwaysSucceeds),
                breaker: Arc::new(CircuitBreaker::new("reliable", CircuitBreakerConfig::default())),
            },
        ];
        let mut chains = HashMap::new();
        chains.insert(AssetClass::Stock, chain);
        let aggregator = Aggregator::new(registry, chains, &SchedulerConfig::default());

        let now = Utc::now();
        let outcome = aggregator
            .fetch_ohlcv("AAPL", Period::OneDay, now, now)
            .await
            .unwrap();
        assert_eq!(outcome.source_used, "reliable");
    }

    #[tokio::test]
    async fn all_sources_exhausted_is_reported() {
        let registry = registry_with_aapl();
        let chain = vec![SourceEntry {
            provider: Arc::new(AlwaysFails { calls: AtomicUsize::new(0) }),
            breaker: Arc::new(CircuitBreaker::new("flaky", CircuitBreakerConfig::default())),
        }];
        let mut chains = HashMap::new();
        chains.insert(AssetClass::Stock, chain);
        let aggregator = Aggregator::new(registry, chains, &SchedulerConfig::default());

        let now = Utc::now();
        let result = aggregator.fetch_ohlcv("AAPL", Period::OneDay, now, now).await;
        assert!(matches!(result, Err(AggregatorError::AllSourcesExhausted { .. })));
    }

    #[tokio::test]
    async fn unregistered_symbol_is_rejected() {
        let registry = Arc::new(SymbolRegistry::new());
        let aggregator = Aggregator::new(registry, HashMap::new(), &SchedulerConfig::default());
        let now = Utc::now();
        let result = aggregator.fetch_ohlcv("UNKNOWN", Period::OneDay, now, now).await;
        assert!(matches!(result, Err(AggregatorError::SymbolNotRegistered(_))));
    }

    #[tokio::test]
    async fn breaker_open_skips_source() {
        let registry = registry_with_aapl();
        let flaky_breaker = Arc::new(CircuitBreaker::new("flaky", CircuitBreakerConfig::default()));
        flaky_breaker.force_open();
        let chain = vec![
            SourceEntry {
                provider: Arc::new(AlwaysFails { calls: AtomicUsize::new(0) }),
                breaker: flaky_breaker,
            },
            SourceEntry {
                provider: Arc::new(AlwaysSucceeds),
                breaker: Arc::new(CircuitBreaker::new("reliable", CircuitBreakerConfig::default())),
            },
        ];
        let mut chains = HashMap::new();
        chains.insert(AssetClass::Stock, chain);
        let aggregator = Aggregator::new(registry, chains, &SchedulerConfig::default());

        let now = Utc::now();
        let outcome = aggregator
            .fetch_ohlcv("AAPL", Period::OneDay, now, now)
            .await
            .unwrap();
        assert_eq!(outcome.source_used, "reliable");
    }
}
