//! Closed error taxonomies for every layer of the engine.
//!
//! Each layer returns its own `thiserror`-derived enum so callers can match on
//! error *kind* rather than parse a message. `anyhow::Result` is reserved for
//! the outermost orchestration boundary, mirroring the teacher's own split
//! between `rusqlite::Result`/`SqlResult` internally and `anyhow::Result` at
//! the call sites that drive the program.

use thiserror::Error;

/// Errors a `CandleProvider` / `MicrostructureProvider` can raise.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("transport error calling {source_name}: {message}")]
    Transport { source_name: String, message: String },

    #[error("rate limited by {source_name}, retry_after={retry_after_secs:?}")]
    RateLimited {
        source_name: String,
        retry_after_secs: Option<u64>,
    },

    #[error("auth error calling {source_name}: {message}")]
    Auth { source_name: String, message: String },

    #[error("symbol {symbol} not carried by {source_name}")]
    NotFound { source_name: String, symbol: String },

    #[error("malformed response from {source_name}: {message}")]
    MalformedResponse { source_name: String, message: String },

    #[error("server error from {source_name}: {message}")]
    Server { source_name: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether a task-level retry loop should retry this kind on its own,
    /// as opposed to the aggregator simply trying the next source.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport { .. } | ProviderError::RateLimited { .. }
        )
    }

    pub fn source_name(&self) -> &str {
        match self {
            ProviderError::Transport { source_name, .. }
            | ProviderError::RateLimited { source_name, .. }
            | ProviderError::Auth { source_name, .. }
            | ProviderError::NotFound { source_name, .. }
            | ProviderError::MalformedResponse { source_name, .. }
            | ProviderError::Server { source_name, .. } => source_name,
            ProviderError::InvalidRequest(_) => "n/a",
        }
    }
}

/// Errors raised by the circuit breaker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakerError {
    #[error("circuit for {0} is open")]
    Open(String),
}

/// Errors raised while walking provider priorities in the aggregator.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("symbol {0} is not registered")]
    SymbolNotRegistered(String),

    #[error("all sources exhausted for {symbol}/{period}: {last_error}")]
    AllSourcesExhausted {
        symbol: String,
        period: String,
        last_error: ProviderError,
    },

    #[error("concurrency limiter deadline exceeded")]
    ConcurrencyDeadlineExceeded,
}

/// Errors raised by the validation & quality layer.
#[derive(Debug, Error, Clone)]
pub enum ValidationError {
    #[error("candle at {0} fails OHLC relation check")]
    OhlcRelation(String),

    #[error("candle at {0} has non-positive price")]
    NonPositivePrice(String),

    #[error("candle at {0} has negative volume")]
    NegativeVolume(String),

    #[error("candle at {0} is missing required fields")]
    MissingFields(String),

    #[error("duplicate timestamp {0} in sequence")]
    DuplicateTimestamp(String),

    #[error("timestamps not strictly increasing at {0}")]
    OutOfOrder(String),

    #[error("crypto candle at {0} has out-of-range funding rate")]
    FundingRateOutOfRange(String),

    #[error("crypto candle at {0} has negative open interest or liquidation")]
    NegativeMicrostructure(String),
}

/// Errors raised by the feature computer. A single bad candle aborts the
/// whole pass per §4.5 of the spec ("compute-failed").
#[derive(Debug, Error, Clone)]
pub enum ComputeError {
    #[error("feature computation failed at index {index}: {reason}")]
    Failed { index: usize, reason: String },
}

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("batch rolled back: {0}")]
    BatchRolledBack(String),
}

/// Top-level, task-facing error kinds from §7. The orchestrator matches on
/// these to decide whether to retry, and records them on audit rows.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("compute failed: {0}")]
    ComputeFailed(#[from] ComputeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// §7: only transport/rate-limited/persistence-failed kinds are
    /// retried by the orchestrator's own retry loop; everything else is
    /// terminal for the task (though the aggregator may have already
    /// tried other sources internally).
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Provider(e) => e.is_retryable(),
            EngineError::Aggregator(AggregatorError::SymbolNotRegistered(_)) => false,
            EngineError::Aggregator(_) => true,
            EngineError::Persistence(_) => true,
            EngineError::ValidationFailed(_) => false,
            EngineError::ComputeFailed(_) => false,
            EngineError::Cancelled => false,
        }
    }
}
