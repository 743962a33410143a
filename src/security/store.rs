//! Window counter storage shared by the tier limiters and the throttle.
//!
//! # Design Decisions
//! - `CounterStore` is the seam for a shared-cache backend; the pipeline only
//!   sees increment/decrement
//! - The in-process store does check-reset-increment under the DashMap shard
//!   lock, so a key's window never resets early and no hit is lost
//! - Time comes from `tokio::time::Instant` so tests can drive it

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// State of a key's window right after a hit was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u32,
    pub window_start: Instant,
    pub reset_at: Instant,
}

impl WindowSnapshot {
    /// Time left until the window resets, as of `now`.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

/// Per-key fixed-window hit counters.
pub trait CounterStore: Send + Sync {
    /// Count one hit for `key`, opening a new window if none is live.
    fn increment(&self, key: &str, window: Duration) -> WindowSnapshot;

    /// Take back a hit counted in the window that began at `window_start`.
    /// Does nothing once that window has been replaced.
    fn decrement(&self, key: &str, window_start: Instant);

    /// Forget a key entirely.
    fn reset(&self, key: &str);

    /// Drop windows older than `window`. Returns how many were removed.
    fn purge_expired(&self, window: Duration) -> usize;

    /// Number of keys with a window.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    start: Instant,
    count: u32,
}

/// In-process counter store. Counters do not survive restarts and are not
/// shared between processes.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, WindowEntry>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, window: Duration) -> WindowSnapshot {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(WindowEntry { start: now, count: 0 });

        if now.duration_since(entry.start) >= window {
            entry.start = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        WindowSnapshot {
            count: entry.count,
            window_start: entry.start,
            reset_at: entry.start + window,
        }
    }

    fn decrement(&self, key: &str, window_start: Instant) {
        if let Some(mut entry) = self.windows.get_mut(key) {
            if entry.start == window_start {
                entry.count = entry.count.saturating_sub(1);
            }
        }
    }

    fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    fn purge_expired(&self, window: Duration) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, entry| now.duration_since(entry.start) < window);
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_window_lifecycle() {
        let store = InMemoryCounterStore::new();
        let first = store.increment("k", WINDOW);
        assert_eq!(first.count, 1);
        assert_eq!(store.increment("k", WINDOW).count, 2);

        // Still inside the window one tick before it closes
        tokio::time::advance(WINDOW - Duration::from_millis(1)).await;
        assert_eq!(store.increment("k", WINDOW).count, 3);

        tokio::time::advance(Duration::from_millis(1)).await;
        let fresh = store.increment("k", WINDOW);
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.window_start, first.window_start + WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decrement_only_hits_same_window() {
        let store = InMemoryCounterStore::new();
        let old = store.increment("k", WINDOW);
        store.increment("k", WINDOW);
        store.decrement("k", old.window_start);
        assert_eq!(store.increment("k", WINDOW).count, 2);

        tokio::time::advance(WINDOW).await;
        let current = store.increment("k", WINDOW);
        store.decrement("k", old.window_start);
        assert_eq!(store.increment("k", WINDOW).count, current.count + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = InMemoryCounterStore::new();
        store.increment("old", WINDOW);
        tokio::time::advance(WINDOW).await;
        store.increment("new", WINDOW);

        assert_eq!(store.purge_expired(WINDOW), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    store.increment("shared", Duration::from_secs(3600));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.increment("shared", Duration::from_secs(3600)).count, 2001);
    }
}
