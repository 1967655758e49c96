use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Bounds concurrent analyses. A permit lives as long as the request's stream.
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
}

impl RequestLimiter {
    pub fn new(max_requests: usize) -> Self {
        info!(
            max_concurrent_requests = max_requests,
            "Initializing request semaphore"
        );
        Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
        }
    }

    pub fn try_acquire(&self, request_id: &str) -> AppResult<OwnedSemaphorePermit> {
        let total_requests = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;

        let permit = Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| {
                let rejected = self.rejected_requests.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    request_id = %request_id,
                    total_requests = total_requests,
                    rejected_requests = rejected,
                    "Rate limit exceeded - too many concurrent requests"
                );
                AppError::RateLimitExceeded
            })?;

        debug!(
            request_id = %request_id,
            available_permits = self.semaphore.available_permits(),
            "Request permit acquired"
        );
        Ok(permit)
    }

    /// (total, rejected, available permits)
    pub fn metrics(&self) -> (u64, u64, usize) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
            self.semaphore.available_permits(),
        )
    }
}
