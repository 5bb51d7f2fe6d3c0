//! Resilience primitives (§4.2): circuit breaking, rate limiting, retry
//! delay computation, and bounded concurrency. Providers and the
//! aggregator compose these rather than retrying ad hoc.

pub mod circuit_breaker;
pub mod concurrency;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use concurrency::BoundedConcurrency;
pub use rate_limiter::RateLimiter;
pub use retry::{next_delay, should_retry};
