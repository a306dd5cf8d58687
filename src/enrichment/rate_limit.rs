//! Minimum-interval rate limiting for outbound requests.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep_until};

/// Spaces requests at least `interval` apart across all clones.
///
/// Callers queue on the mutex, so concurrent workers are served one at a
/// time in arrival order.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    last: Arc<Mutex<Option<Instant>>>,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            last: Arc::new(Mutex::new(None)),
            interval,
        }
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            sleep_until(previous + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}
