//! Progressive slow-down.
//!
//! Keeps its own per-key window counter, separate from the tier limiters.
//! Past `delay_after` requests in a window, each further request is held
//! back by one more `delay` step, capped at `max_delay`. Nothing is rejected.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ThrottleConfig;
use crate::http::request::client_ip_of;
use crate::observability::metrics;
use crate::security::store::{CounterStore, InMemoryCounterStore};

#[derive(Clone)]
pub struct ProgressiveThrottle {
    window: Duration,
    delay_after: u32,
    delay: Duration,
    max_delay: Duration,
    store: Arc<dyn CounterStore>,
}

impl ProgressiveThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryCounterStore::new()))
    }

    pub fn with_store(config: &ThrottleConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            delay_after: config.delay_after,
            delay: Duration::from_millis(config.delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            store,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Count a request for `key` and return the delay it must wait.
    pub fn delay_for(&self, key: &str) -> Duration {
        let count = self.store.increment(key, self.window).count;
        if count <= self.delay_after {
            return Duration::ZERO;
        }
        let steps = count - self.delay_after;
        self.delay.saturating_mul(steps).min(self.max_delay)
    }
}

impl std::fmt::Debug for ProgressiveThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveThrottle")
            .field("window", &self.window)
            .field("delay_after", &self.delay_after)
            .field("delay", &self.delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

pub async fn throttle_middleware(
    State(throttle): State<Arc<ProgressiveThrottle>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_ip_of(&request);
    let delay = throttle.delay_for(&key);
    if !delay.is_zero() {
        tracing::debug!(client = %key, delay_ms = delay.as_millis() as u64, "Throttling client");
        metrics::record_throttle_delay(delay);
        tokio::time::sleep(delay).await;
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> ProgressiveThrottle {
        ProgressiveThrottle::new(&ThrottleConfig {
            enabled: true,
            window_secs: 60,
            delay_after: 2,
            delay_ms: 500,
            max_delay_ms: 1200,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_escalates_and_caps() {
        let t = throttle();
        assert_eq!(t.delay_for("k"), Duration::ZERO);
        assert_eq!(t.delay_for("k"), Duration::ZERO);
        assert_eq!(t.delay_for("k"), Duration::from_millis(500));
        assert_eq!(t.delay_for("k"), Duration::from_millis(1000));
        assert_eq!(t.delay_for("k"), Duration::from_millis(1200));
        assert_eq!(t.delay_for("k"), Duration::from_millis(1200));

        // Separate keys are counted separately
        assert_eq!(t.delay_for("other"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_clears_delay() {
        let t = throttle();
        for _ in 0..5 {
            t.delay_for("k");
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(t.delay_for("k"), Duration::ZERO);
    }
}
