//! Deadline-bounded counting semaphore (§4.7), used by the scheduler to
//! cap the number of symbols processed concurrently and by the
//! aggregator's `fetch_parallel` to bound outstanding provider calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};
use tokio::time::timeout;

use crate::error::AggregatorError;

pub struct BoundedConcurrency {
    semaphore: Arc<Semaphore>,
    acquire_deadline: Duration,
}

impl BoundedConcurrency {
    pub fn new(capacity: usize, acquire_deadline: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            acquire_deadline,
        }
    }

    /// Blocks until a permit is free or `acquire_deadline` elapses,
    /// whichever comes first.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AggregatorError> {
        timeout(self.acquire_deadline, self.semaphore.acquire())
            .await
            .map_err(|_| AggregatorError::ConcurrencyDeadlineExceeded)?
            .map_err(|_| AggregatorError::ConcurrencyDeadlineExceeded)
    }

    /// Like [`Self::acquire`], but returns an owned permit that can be
    /// moved into a spawned task instead of borrowing from `self`.
    pub async fn acquire_owned(&self) -> Result<OwnedSemaphorePermit, AggregatorError> {
        timeout(self.acquire_deadline, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| AggregatorError::ConcurrencyDeadlineExceeded)?
            .map_err(|_| AggregatorError::ConcurrencyDeadlineExceeded)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
