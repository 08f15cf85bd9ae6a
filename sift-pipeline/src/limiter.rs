//! Process-wide pipeline concurrency gate.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Bounds how many table pipelines execute concurrently, across all runs.
///
/// Backed by a Tokio semaphore, which queues waiters in FIFO order, so a
/// burst of launched pipelines is admitted roughly in launch order and no
/// waiter starves. Capacity is fixed at construction. Cancelling a task
/// that is waiting in `acquire` leaves the capacity untouched.
#[derive(Debug, Clone)]
pub struct PipelineLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PipelineLimiter {
    /// Default number of concurrent pipelines for the whole process.
    pub const DEFAULT_CAPACITY: usize = 3;

    /// Creates a limiter with the given capacity, clamped to at least one
    /// slot so pipelines can always make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PipelineLimiter {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot is free and claims it. The slot is returned when
    /// the permit is dropped, including on panic or early return.
    pub async fn acquire(&self) -> PipelinePermit {
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => PipelinePermit { _permit: permit },
            Err(_) => unreachable!("pipeline semaphore is never closed"),
        }
    }

    /// Claims a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<PipelinePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(PipelinePermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => unreachable!("pipeline semaphore is never closed"),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for PipelineLimiter {
    fn default() -> Self {
        PipelineLimiter::new(Self::DEFAULT_CAPACITY)
    }
}

/// RAII slot held for the duration of one table pipeline.
#[derive(Debug)]
pub struct PipelinePermit {
    _permit: OwnedSemaphorePermit,
}
