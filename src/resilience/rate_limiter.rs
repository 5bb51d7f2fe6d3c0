//! Token-bucket rate limiter (§4.2/§6), one instance per provider.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimiterConfig;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            bucket: Mutex::new(Bucket {
                tokens: config.burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_rate_per_sec(&self) -> f64 {
        self.config.rate_per_interval as f64 / self.config.interval.as_secs_f64()
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate_per_sec())
            .min(self.config.burst as f64);
        bucket.last_refill = Instant::now();
    }

    /// Consumes one token and returns `true`, or returns `false` without
    /// consuming if the bucket is empty. Non-blocking by design; the
    /// caller decides whether to queue, retry, or fail fast.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long until the next token would be available, useful for
    /// backoff-aware callers that want to sleep rather than spin.
    pub fn time_until_next_token(&self) -> Duration {
        let mut bucket = self.bucket.lock().unwrap();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let deficit = 1.0 - bucket.tokens;
            Duration::from_secs_f64(deficit / self.refill_rate_per_sec())
        }
    }
}
