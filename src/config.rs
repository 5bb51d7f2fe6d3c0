//! Engine configuration structs. Populating these from environment
//! variables or a config file is external (§1 out-of-scope); the engine
//! only owns the typed defaults from §4.2/§4.7/§6.

use std::time::Duration;

/// §4.2 circuit breaker defaults.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(300),
            success_threshold: 1,
        }
    }
}

/// §4.2 / §6 token-bucket rate limiter defaults.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub rate_per_interval: u32,
    pub interval: Duration,
    pub burst: u32,
}

impl RateLimiterConfig {
    /// §6: rich provider, assumed tier — 5 req/min.
    pub fn rich_provider_default() -> Self {
        Self {
            rate_per_interval: 5,
            interval: Duration::from_secs(60),
            burst: 5,
        }
    }

    /// §6: crypto-futures provider — ~1200 req/min.
    pub fn crypto_futures_default() -> Self {
        Self {
            rate_per_interval: 1200,
            interval: Duration::from_secs(60),
            burst: 100,
        }
    }

    /// Fallback provider has no documented rate limit; keep it generous
    /// but non-zero so a misbehaving fallback can still trip backpressure.
    pub fn fallback_default() -> Self {
        Self {
            rate_per_interval: 60,
            interval: Duration::from_secs(60),
            burst: 10,
        }
    }
}

/// §4.2 retry-policy defaults, reused both by provider-level retries and
/// the orchestrator's task-level retry (§4.7: initial 2s, multiplier 2,
/// up to 3 attempts).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// §4.7 scheduler defaults.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sweep_hour_utc: u32,
    pub sweep_minute_utc: u32,
    pub max_concurrent_symbols: usize,
    pub per_acquire_deadline: Duration,
    pub shutdown_drain_window: Duration,
    pub retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_hour_utc: 0,
            sweep_minute_utc: 0,
            max_concurrent_symbols: 5,
            per_acquire_deadline: Duration::from_secs(60),
            shutdown_drain_window: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// §6 data-freshness SLA thresholds, per asset class.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessSla {
    pub target: Duration,
    pub warn: Duration,
    pub critical: Duration,
    pub stale: Duration,
}

impl FreshnessSla {
    /// §6: maps an age-since-last-success to one of the enrichment-status
    /// states. `critical` is a severity marker within the warning band
    /// (there is no dedicated `EnrichmentState` for it) rather than a
    /// fourth state between `warning` and `stale`.
    pub fn classify(self, age: std::time::Duration) -> crate::domain::EnrichmentState {
        use crate::domain::EnrichmentState;
        if age <= self.target {
            EnrichmentState::Healthy
        } else if age < self.stale {
            EnrichmentState::Warning
        } else {
            EnrichmentState::Stale
        }
    }

    pub fn for_asset_class(asset_class: crate::domain::AssetClass) -> Self {
        if asset_class.is_equity_like() {
            Self {
                target: Duration::from_secs(60),
                warn: Duration::from_secs(600),
                critical: Duration::from_secs(300),
                stale: Duration::from_secs(3600),
            }
        } else {
            Self {
                target: Duration::from_secs(30),
                warn: Duration::from_secs(60),
                critical: Duration::from_secs(120),
                stale: Duration::from_secs(600),
            }
        }
    }
}

/// Batch size for persistence UPSERT passes (§4.6).
pub const PERSISTENCE_BATCH_SIZE: usize = 500;

/// Minimum candle count the feature computer needs for full coverage (§4.5).
pub const MIN_CANDLES_FOR_FULL_FEATURES: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub rich_provider_rate_limit: RateLimiterConfigOwned,
    pub crypto_futures_rate_limit: RateLimiterConfigOwned,
    pub fallback_rate_limit: RateLimiterConfigOwned,
    pub breaker: CircuitBreakerConfig,
}

/// `RateLimiterConfig` with a `Default` impl, so it composes inside
/// `#[derive(Default)] EngineConfig` without every caller needing to
/// remember which per-source constructor to call.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfigOwned(pub RateLimiterConfig);

impl Default for RateLimiterConfigOwned {
    fn default() -> Self {
        Self(RateLimiterConfig::rich_provider_default())
    }
}
