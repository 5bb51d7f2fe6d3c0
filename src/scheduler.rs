//! Orchestrator (§4.7): daily sweep plus manual triggers, bounded
//! symbol concurrency, sequential periods within a symbol, task-level
//! retry with exponential backoff, and graceful cancellation. Replaces
//! the teacher's unbounded `run_backfill` (one `spawn_blocking` per
//! timeframe, no concurrency cap, no cancellation) with a
//! semaphore-bounded fanout over a `CancellationToken`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::config::SchedulerConfig;
use crate::domain::{
    AssetClass, EnrichedCandle, EnrichmentState, EnrichmentStatus, Period, QualityAnnotations,
    SymbolRegistry,
};
use crate::error::EngineError;
use crate::persistence::Database;
use crate::resilience::{next_delay, should_retry, BoundedConcurrency};
use crate::{features, validation};

/// Lookback applied when the daily sweep's default range meets a symbol
/// that has never been enriched (no `enrichment_status` row yet).
const DEFAULT_INITIAL_BACKFILL_LOOKBACK_DAYS: i64 = 30;

pub struct SymbolTaskResult {
    pub symbol: String,
    pub period: Period,
    pub outcome: Result<usize, EngineError>,
}

pub struct Scheduler {
    registry: Arc<SymbolRegistry>,
    aggregator: Arc<Aggregator>,
    db: Arc<Mutex<Database>>,
    config: SchedulerConfig,
    concurrency: BoundedConcurrency,
    cancellation: CancellationToken,
    running: Arc<AtomicBool>,
    last_sweep: Arc<Mutex<Option<DateTime<Utc>>>>,
    next_sweep: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl Scheduler {
    pub fn new(registry: Arc<SymbolRegistry>, aggregator: Arc<Aggregator>, db: Arc<Mutex<Database>>, config: SchedulerConfig) -> Self {
        let concurrency = BoundedConcurrency::new(config.max_concurrent_symbols, config.per_acquire_deadline);
        Self {
            registry,
            aggregator,
            db,
            config,
            concurrency,
            cancellation: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            last_sweep: Arc::new(Mutex::new(None)),
            next_sweep: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_sweep_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sweep.lock().unwrap()
    }

    pub fn next_sweep_at(&self) -> Option<DateTime<Utc>> {
        *self.next_sweep.lock().unwrap()
    }

    /// Signals every in-flight task to wind down; callers should await
    /// [`Scheduler::run_manual_sweep`]'s return (or the sweep loop's
    /// join handles) for up to `shutdown_drain_window` afterward.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn shutdown_drain_window(&self) -> std::time::Duration {
        self.config.shutdown_drain_window
    }

    /// Runs one sweep over every registered symbol/period combination,
    /// each as its own bounded task, sequential periods within a symbol
    /// (§4.7). Returns one [`SymbolTaskResult`] per (symbol, period).
    ///
    /// `range_start`: `Some(t)` for a manual trigger's explicit range;
    /// `None` for the daily sweep's default, which resolves per
    /// (symbol, period) to `enrichment_status.last_success + 1 period`,
    /// or `range_end` minus [`DEFAULT_INITIAL_BACKFILL_LOOKBACK_DAYS`]
    /// for a symbol that has never been enriched.
    pub async fn run_manual_sweep(&self, range_start: Option<DateTime<Utc>>, range_end: DateTime<Utc>) -> Vec<SymbolTaskResult> {
        self.running.store(true, Ordering::SeqCst);
        let job_id = format!("sweep-{}", Utc::now().timestamp_millis());
        let mut handles: Vec<JoinHandle<Vec<SymbolTaskResult>>> = Vec::new();

        for descriptor in self.registry.all() {
            let symbol = descriptor.symbol.clone();
            let asset_class = descriptor.asset_class;
            let periods = descriptor.periods.clone();
            let aggregator = Arc::clone(&self.aggregator);
            let db = Arc::clone(&self.db);
            let retry_config = self.config.retry;
            let cancellation = self.cancellation.clone();
            let job_id = job_id.clone();

            // Acquire a symbol-level permit before spawning so the
            // bound covers the whole pipeline, not just the fetch step.
            let permit = match self.concurrency.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => continue,
            };

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let mut results = Vec::with_capacity(periods.len());
                for period in periods {
                    if cancellation.is_cancelled() {
                        results.push(SymbolTaskResult {
                            symbol: symbol.clone(),
                            period,
                            outcome: Err(EngineError::Cancelled),
                        });
                        continue;
                    }
                    let outcome = run_symbol_period_task(
                        &aggregator,
                        &db,
                        &job_id,
                        &symbol,
                        asset_class,
                        period,
                        range_start,
                        range_end,
                        &retry_config,
                        &cancellation,
                    )
                    .await;
                    results.push(SymbolTaskResult { symbol: symbol.clone(), period, outcome });
                }
                results
            });
            handles.push(handle);
        }

        let mut all_results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(results) => all_results.extend(results),
                Err(e) => error!(error = %e, "symbol task panicked"),
            }
        }

        *self.last_sweep.lock().unwrap() = Some(Utc::now());
        self.running.store(false, Ordering::SeqCst);
        all_results
    }

    /// Computes the next scheduled sweep instant after `now`, per the
    /// configured `sweep_hour_utc`/`sweep_minute_utc` (§4.7).
    pub fn compute_next_sweep(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        use chrono::Timelike;
        let candidate = now
            .with_hour(self.config.sweep_hour_utc)
            .and_then(|t| t.with_minute(self.config.sweep_minute_utc))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let next = if candidate > now { candidate } else { candidate + chrono::Duration::days(1) };
        *self.next_sweep.lock().unwrap() = Some(next);
        next
    }

    pub fn status_for(&self, symbol: &str, asset_class: AssetClass) -> Option<EnrichmentStatus> {
        let db = self.db.lock().unwrap();
        crate::persistence::status::get_status(db.connection(), symbol, asset_class).ok().flatten()
    }
}

/// Runs the fetch → validate → compute → persist pipeline for one
/// (symbol, period), retrying task-level failures with exponential
/// backoff up to `retry_config.max_attempts` (§4.7), recording audits
/// and updating the symbol's enrichment status along the way.
#[allow(clippy::too_many_arguments)]
async fn run_symbol_period_task(
    aggregator: &Aggregator,
    db: &Arc<Mutex<Database>>,
    job_id: &str,
    symbol: &str,
    asset_class: AssetClass,
    period: Period,
    range_start: Option<DateTime<Utc>>,
    range_end: DateTime<Utc>,
    retry_config: &crate::config::RetryConfig,
    cancellation: &CancellationToken,
) -> Result<usize, EngineError> {
    use crate::persistence::backfill_state;

    let (effective_start, job) = {
        let guard = db.lock().unwrap();
        let base_start = match range_start {
            Some(explicit) => explicit,
            None => crate::persistence::status::get_status(guard.connection(), symbol, asset_class)
                .ok()
                .flatten()
                .and_then(|status| status.last_success)
                .map(|t| t + chrono::Duration::milliseconds(period.tick_millis()))
                .unwrap_or_else(|| range_end - chrono::Duration::days(DEFAULT_INITIAL_BACKFILL_LOOKBACK_DAYS)),
        };
        let resume_from = backfill_state::resume_start_date(guard.connection(), symbol, asset_class, period)
            .ok()
            .flatten();
        let effective_start = resume_from
            .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_time(chrono::NaiveTime::MIN), Utc))
            .filter(|start| *start > base_start)
            .unwrap_or(base_start);
        let job = backfill_state::register_job(
            guard.connection(),
            job_id,
            symbol,
            asset_class,
            period,
            effective_start.date_naive(),
            range_end.date_naive(),
        )
        .ok();
        (effective_start, job)
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        match run_symbol_period_once(aggregator, db, symbol, asset_class, period, effective_start, range_end).await {
            Ok(count) => {
                if let Some(job) = &job {
                    let guard = db.lock().unwrap();
                    let id = job.id.expect("just registered");
                    let _ = backfill_state::advance(guard.connection(), id, range_end.date_naive());
                    let _ = backfill_state::complete(guard.connection(), id);
                }
                return Ok(count);
            }
            Err(e) if e.is_retryable() && should_retry(retry_config, attempt) => {
                if let Some(job) = &job {
                    let guard = db.lock().unwrap();
                    let _ = backfill_state::fail(guard.connection(), job.id.expect("just registered"), &e.to_string());
                }
                let delay = next_delay(retry_config, attempt);
                warn!(symbol, period = %period, attempt, delay_secs = delay.as_secs(), error = %e, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                let mut guard = db.lock().unwrap();
                if let Some(job) = &job {
                    let _ = backfill_state::fail(guard.connection(), job.id.expect("just registered"), &e.to_string());
                }
                let mut status = crate::persistence::status::get_status(guard.connection(), symbol, asset_class)
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| EnrichmentStatus::not_enriched(symbol, asset_class));
                status.state = EnrichmentState::Error;
                status.last_error = Some(e.to_string());
                let _ = crate::persistence::status::upsert_status(guard.connection_mut(), &status);
                return Err(e);
            }
        }
    }
}

async fn run_symbol_period_once(
    aggregator: &Aggregator,
    db: &Arc<Mutex<Database>>,
    symbol: &str,
    asset_class: AssetClass,
    period: Period,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Result<usize, EngineError> {
    let outcome = aggregator.fetch_ohlcv(symbol, period, range_start, range_end).await?;

    for candle in &outcome.candles {
        validation::validate_candle(candle)?;
    }
    validation::validate_sequence_order(&outcome.candles)?;

    let universal = features::compute_universal_features(&outcome.candles, asset_class, period)?;
    let crypto = features::compute_crypto_features(&outcome.candles, &universal);
    let flags = validation::annotate_sequence(&outcome.candles, period);
    let overall_completeness = validation::completeness(&outcome.candles, asset_class);

    let now = Utc::now();
    let newest = outcome.candles.last().map(|c| c.period_open).unwrap_or(now);
    let freshness = validation::freshness_score(newest, now, asset_class);

    let enriched: Vec<EnrichedCandle> = outcome
        .candles
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let quality_score = validation::quality_score(overall_completeness, 1.0, if flags[i].gap_flag || flags[i].volume_anomaly_flag { 0.5 } else { 1.0 }, freshness);
            EnrichedCandle {
                id: None,
                symbol: symbol.to_string(),
                asset_class,
                period,
                period_open: raw.period_open,
                open: raw.open,
                high: raw.high,
                low: raw.low,
                close: raw.close,
                volume: raw.volume,
                universal: universal[i].clone(),
                crypto: crypto[i].clone(),
                quality: QualityAnnotations {
                    source: outcome.source_used.clone(),
                    validated: true,
                    quality_score,
                    completeness: overall_completeness,
                    gap_flag: flags[i].gap_flag,
                    volume_anomaly_flag: flags[i].volume_anomaly_flag,
                    validation_note: None,
                },
                revision: 1,
                amended_from: None,
                fetched_at: now,
                computed_at: now,
                updated_at: now,
            }
        })
        .collect();

    let mut guard = db.lock().unwrap();
    crate::persistence::audit::record_fetch(guard.connection(), &outcome.audit)?;

    let summary = crate::persistence::candles::upsert_candles(guard.connection_mut(), &enriched)?;

    let compute_audit = crate::domain::ComputeAudit {
        id: None,
        symbol: symbol.to_string(),
        period,
        candles_processed: enriched.len() as i64,
        features_computed: enriched.len() as i64,
        duration_ms: 0,
        success: true,
        error_text: None,
        timestamp: now,
    };
    crate::persistence::audit::record_compute(guard.connection(), &compute_audit)?;

    let sla = crate::config::FreshnessSla::for_asset_class(asset_class);
    let age = (now - newest).to_std().unwrap_or_default();
    let status = EnrichmentStatus {
        symbol: symbol.to_string(),
        asset_class,
        last_success: Some(now),
        last_source: Some(outcome.source_used.clone()),
        last_compute_duration_ms: Some(0),
        state: sla.classify(age),
        current_quality_score: enriched.last().map(|c| c.quality.quality_score),
        current_record_count: enriched.len() as i64,
        last_error: None,
    };
    crate::persistence::status::upsert_status(guard.connection(), &status)?;

    Ok((summary.inserted + summary.updated) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SourceEntry;
    use crate::config::CircuitBreakerConfig;
    use crate::domain::{RawCandle, SymbolDescriptor};
    use crate::error::ProviderError;
    use crate::providers::CandleProvider;
    use crate::resilience::CircuitBreaker;
    use async_trait::async_trait;
    use chrono::Timelike;
    use rust_decimal_macros::dec;

    struct StubProvider;

    #[async_trait]
    impl CandleProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn fetch_candles(
            &self,
            _native_symbol: &str,
            _period: Period,
            _range_start: DateTime<Utc>,
            _range_end: DateTime<Utc>,
        ) -> Result<Vec<RawCandle>, ProviderError> {
            Ok(vec![RawCandle {
                period_open: Utc::now(),
                open: dec!(10),
                high: dec!(11),
                low: dec!(9),
                close: dec!(10.5),
                volume: 100,
                microstructure: None,
            }])
        }
    }

    fn test_setup() -> (Arc<SymbolRegistry>, Arc<Aggregator>, Arc<Mutex<Database>>) {
        let mut registry = SymbolRegistry::new();
        registry.register(SymbolDescriptor::new("AAPL", AssetClass::Stock, vec![Period::OneDay]));
        let registry = Arc::new(registry);

        let mut chains = HashMap::new();
        chains.insert(
            AssetClass::Stock,
            vec![SourceEntry {
                provider: Arc::new(StubProvider),
                breaker: Arc::new(CircuitBreaker::new("stub", CircuitBreakerConfig::default())),
            }],
        );
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&registry), chains, &SchedulerConfig::default()));
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        (registry, aggregator, db)
    }

    #[tokio::test]
    async fn manual_sweep_persists_candles_and_updates_status() {
        let (registry, aggregator, db) = test_setup();
        let scheduler = Scheduler::new(registry, aggregator, Arc::clone(&db), SchedulerConfig::default());

        let now = Utc::now();
        let results = scheduler.run_manual_sweep(Some(now), now).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].outcome.is_ok());

        let status = scheduler.status_for("AAPL", AssetClass::Stock).unwrap();
        assert_eq!(status.state, EnrichmentState::Healthy);
    }

    #[tokio::test]
    async fn cancelled_sweep_reports_cancelled_error() {
        let (registry, aggregator, db) = test_setup();
        let scheduler = Scheduler::new(registry, aggregator, db, SchedulerConfig::default());
        scheduler.cancel();

        let now = Utc::now();
        let results = scheduler.run_manual_sweep(Some(now), now).await;
        assert!(matches!(results[0].outcome, Err(EngineError::Cancelled)));
    }

    #[test]
    fn next_sweep_rolls_to_tomorrow_when_time_passed() {
        let (registry, aggregator, db) = test_setup();
        let config = SchedulerConfig {
            sweep_hour_utc: 0,
            sweep_minute_utc: 0,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(registry, aggregator, db, config);
        let now = Utc::now().with_hour(12).unwrap();
        let next = scheduler.compute_next_sweep(now);
        assert!(next > now);
    }

    struct FlakyProvider {
        attempts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl CandleProvider for FlakyProvider {
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
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                return Err(ProviderError::Transport { source_name: "flaky".into(), message: "boom".into() });
            }
            Ok(vec![RawCandle {
                period_open: Utc::now(),
                open: dec!(10),
                high: dec!(11),
                low: dec!(9),
                close: dec!(10.5),
                volume: 100,
                microstructure: None,
            }])
        }
    }

    #[tokio::test]
    async fn retried_task_completes_its_backfill_job() {
        let mut registry = SymbolRegistry::new();
        registry.register(SymbolDescriptor::new("AAPL", AssetClass::Stock, vec![Period::OneDay]));
        let registry = Arc::new(registry);

        let mut chains = HashMap::new();
        chains.insert(
            AssetClass::Stock,
            vec![SourceEntry {
                provider: Arc::new(FlakyProvider { attempts: std::sync::atomic::AtomicUsize::new(0) }),
                breaker: Arc::new(CircuitBreaker::new("flaky", CircuitBreakerConfig::default())),
            }],
        );
        let config = SchedulerConfig {
            retry: crate::config::RetryConfig {
                max_attempts: 3,
                initial_delay: std::time::Duration::from_millis(5),
                multiplier: 2.0,
                max_delay: std::time::Duration::from_millis(20),
            },
            ..SchedulerConfig::default()
        };
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&registry), chains, &config));
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let scheduler = Scheduler::new(registry, aggregator, Arc::clone(&db), config);

        let now = Utc::now();
        let results = scheduler.run_manual_sweep(Some(now), now).await;
        assert!(results[0].outcome.is_ok());

        let guard = db.lock().unwrap();
        let still_pending = crate::persistence::backfill_state::resume_start_date(
            guard.connection(),
            "AAPL",
            AssetClass::Stock,
            Period::OneDay,
        )
        .unwrap();
        assert_eq!(still_pending, None, "a completed job should not be picked up for resumption");
    }

    struct RecordingProvider {
        seen_start: Mutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl CandleProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }
        async fn fetch_candles(
            &self,
            _native_symbol: &str,
            _period: Period,
            range_start: DateTime<Utc>,
            _range_end: DateTime<Utc>,
        ) -> Result<Vec<RawCandle>, ProviderError> {
            *self.seen_start.lock().unwrap() = Some(range_start);
            Ok(vec![RawCandle {
                period_open: Utc::now(),
                open: dec!(10),
                high: dec!(11),
                low: dec!(9),
                close: dec!(10.5),
                volume: 100,
                microstructure: None,
            }])
        }
    }

    #[tokio::test]
    async fn sweep_resumes_from_a_prior_jobs_last_successful_date() {
        let mut registry = SymbolRegistry::new();
        registry.register(SymbolDescriptor::new("AAPL", AssetClass::Stock, vec![Period::OneDay]));
        let registry = Arc::new(registry);

        let provider = Arc::new(RecordingProvider { seen_start: Mutex::new(None) });
        let mut chains = HashMap::new();
        chains.insert(
            AssetClass::Stock,
            vec![SourceEntry {
                provider: Arc::clone(&provider) as Arc<dyn CandleProvider>,
                breaker: Arc::new(CircuitBreaker::new("recording", CircuitBreakerConfig::default())),
            }],
        );
        let config = SchedulerConfig::default();
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&registry), chains, &config));
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));

        let range_start = Utc::now() - chrono::Duration::days(10);
        let range_end = Utc::now();
        let resumed_to = range_start.date_naive() + chrono::Duration::days(4);
        {
            let guard = db.lock().unwrap();
            let prior = crate::persistence::backfill_state::register_job(
                guard.connection(),
                "sweep-prior",
                "AAPL",
                AssetClass::Stock,
                Period::OneDay,
                range_start.date_naive(),
                range_end.date_naive(),
            )
            .unwrap();
            crate::persistence::backfill_state::advance(guard.connection(), prior.id.unwrap(), resumed_to).unwrap();
            crate::persistence::backfill_state::fail(guard.connection(), prior.id.unwrap(), "transient").unwrap();
        }

        let scheduler = Scheduler::new(registry, aggregator, Arc::clone(&db), config);
        let results = scheduler.run_manual_sweep(Some(range_start), range_end).await;
        assert!(results[0].outcome.is_ok());

        let seen = provider.seen_start.lock().unwrap().unwrap();
        assert_eq!(seen.date_naive(), resumed_to.succ_opt().unwrap());
    }

    #[tokio::test]
    async fn daily_sweep_without_explicit_range_starts_after_last_success() {
        let mut registry = SymbolRegistry::new();
        registry.register(SymbolDescriptor::new("AAPL", AssetClass::Stock, vec![Period::OneDay]));
        let registry = Arc::new(registry);

        let provider = Arc::new(RecordingProvider { seen_start: Mutex::new(None) });
        let mut chains = HashMap::new();
        chains.insert(
            AssetClass::Stock,
            vec![SourceEntry {
                provider: Arc::clone(&provider) as Arc<dyn CandleProvider>,
                breaker: Arc::new(CircuitBreaker::new("recording", CircuitBreakerConfig::default())),
            }],
        );
        let config = SchedulerConfig::default();
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&registry), chains, &config));
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));

        let last_success = Utc::now() - chrono::Duration::days(3);
        {
            let guard = db.lock().unwrap();
            let mut status = EnrichmentStatus::not_enriched("AAPL", AssetClass::Stock);
            status.last_success = Some(last_success);
            status.state = EnrichmentState::Healthy;
            crate::persistence::status::upsert_status(guard.connection(), &status).unwrap();
        }

        let scheduler = Scheduler::new(registry, aggregator, Arc::clone(&db), config);
        let now = Utc::now();
        let results = scheduler.run_manual_sweep(None, now).await;
        assert!(results[0].outcome.is_ok());

        let seen = provider.seen_start.lock().unwrap().unwrap();
        let expected = last_success + chrono::Duration::milliseconds(Period::OneDay.tick_millis());
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn daily_sweep_without_prior_status_falls_back_to_lookback_window() {
        let mut registry = SymbolRegistry::new();
        registry.register(SymbolDescriptor::new("AAPL", AssetClass::Stock, vec![Period::OneDay]));
        let registry = Arc::new(registry);

        let provider = Arc::new(RecordingProvider { seen_start: Mutex::new(None) });
        let mut chains = HashMap::new();
        chains.insert(
            AssetClass::Stock,
            vec![SourceEntry {
                provider: Arc::clone(&provider) as Arc<dyn CandleProvider>,
                breaker: Arc::new(CircuitBreaker::new("recording", CircuitBreakerConfig::default())),
            }],
        );
        let config = SchedulerConfig::default();
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&registry), chains, &config));
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let scheduler = Scheduler::new(registry, aggregator, Arc::clone(&db), config);

        let now = Utc::now();
        let results = scheduler.run_manual_sweep(None, now).await;
        assert!(results[0].outcome.is_ok());

        let seen = provider.seen_start.lock().unwrap().unwrap();
        let expected = now - chrono::Duration::days(DEFAULT_INITIAL_BACKFILL_LOOKBACK_DAYS);
        assert_eq!(seen, expected);
    }
}
