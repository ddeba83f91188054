use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use super::policy::RatePolicy;

#[derive(Error, Debug)]
pub enum WindowStoreError {
    #[error("Window store unavailable: {0}")]
    Unavailable(String),
}

/// One logical window per (policy, scope key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub policy: RatePolicy,
    pub scope_key: String,
}

impl WindowKey {
    pub fn new(policy: RatePolicy, scope_key: impl Into<String>) -> Self {
        Self {
            policy,
            scope_key: scope_key.into(),
        }
    }
}

/// Counter state of a live window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub window_start_ms: u64,
    pub count: u32,
}

impl WindowSnapshot {
    pub fn reset_after_ms(&self, window_ms: u64, now_ms: u64) -> u64 {
        (self.window_start_ms + window_ms).saturating_sub(now_ms)
    }
}

/// Keyed counter store for fixed windows (port).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Atomically count one request in the window live at `now_ms`,
    /// opening a fresh window when none is live.
    async fn hit(
        &self,
        key: &WindowKey,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<WindowSnapshot, WindowStoreError>;

    /// Live window without counting anything.
    async fn peek(
        &self,
        key: &WindowKey,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<Option<WindowSnapshot>, WindowStoreError>;

    /// Drop windows whose duration has fully elapsed. Returns how many went.
    async fn sweep(&self, now_ms: u64) -> Result<usize, WindowStoreError>;
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    window_start_ms: u64,
    window_ms: u64,
    count: u32,
}

impl WindowEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= self.window_ms
    }

    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            window_start_ms: self.window_start_ms,
            count: self.count,
        }
    }
}

/// Single-process window store. Increments run under the DashMap shard
/// lock, so concurrent hits on one key never lose updates.
#[derive(Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<WindowKey, WindowEntry>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn hit(
        &self,
        key: &WindowKey,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<WindowSnapshot, WindowStoreError> {
        let mut entry = self
            .windows
            .entry(key.clone())
            .or_insert(WindowEntry {
                window_start_ms: now_ms,
                window_ms,
                count: 0,
            });

        if entry.is_expired(now_ms) {
            debug!("Window {}:{} rolled over", key.policy, key.scope_key);
            *entry = WindowEntry {
                window_start_ms: now_ms,
                window_ms,
                count: 0,
            };
        }

        entry.window_ms = window_ms;
        entry.count = entry.count.saturating_add(1);
        Ok(entry.snapshot())
    }

    async fn peek(
        &self,
        key: &WindowKey,
        _window_ms: u64,
        now_ms: u64,
    ) -> Result<Option<WindowSnapshot>, WindowStoreError> {
        Ok(self
            .windows
            .get(key)
            .filter(|e| !e.is_expired(now_ms))
            .map(|e| e.snapshot()))
    }

    async fn sweep(&self, now_ms: u64) -> Result<usize, WindowStoreError> {
        let before = self.windows.len();
        self.windows.retain(|_, entry| !entry.is_expired(now_ms));
        let removed = before.saturating_sub(self.windows.len());

        if removed > 0 {
            info!("Swept {} expired rate window(s)", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(scope: &str) -> WindowKey {
        WindowKey::new(RatePolicy::General, scope)
    }

    #[tokio::test]
    async fn test_hit_counts_and_rolls_over() {
        let store = InMemoryWindowStore::new();

        let first = store.hit(&key("a"), 1_000, 10).await.unwrap();
        assert_eq!(first, WindowSnapshot { window_start_ms: 10, count: 1 });

        let second = store.hit(&key("a"), 1_000, 500).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_after_ms(1_000, 500), 510);

        // now - start == window: new window
        let rolled = store.hit(&key("a"), 1_000, 1_010).await.unwrap();
        assert_eq!(rolled, WindowSnapshot { window_start_ms: 1_010, count: 1 });
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryWindowStore::new();
        store.hit(&key("a"), 1_000, 0).await.unwrap();
        store.hit(&key("a"), 1_000, 0).await.unwrap();
        let b = store.hit(&key("b"), 1_000, 0).await.unwrap();
        assert_eq!(b.count, 1);

        let other_policy = WindowKey::new(RatePolicy::Upload, "a");
        assert_eq!(store.hit(&other_policy, 1_000, 0).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_peek_does_not_count() {
        let store = InMemoryWindowStore::new();
        assert!(store.peek(&key("a"), 1_000, 0).await.unwrap().is_none());
        store.hit(&key("a"), 1_000, 0).await.unwrap();
        store.peek(&key("a"), 1_000, 1).await.unwrap();
        let seen = store.peek(&key("a"), 1_000, 2).await.unwrap().unwrap();
        assert_eq!(seen.count, 1);
        assert!(store.peek(&key("a"), 1_000, 1_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = InMemoryWindowStore::new();
        store.hit(&key("old"), 1_000, 0).await.unwrap();
        store.hit(&key("new"), 1_000, 900).await.unwrap();

        assert_eq!(store.sweep(1_200).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.peek(&key("new"), 1_000, 1_200).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_hits_are_not_lost() {
        let store = Arc::new(InMemoryWindowStore::new());
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.hit(&key("hot"), 60_000, 5).await.unwrap() })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }
        let seen = store.peek(&key("hot"), 60_000, 6).await.unwrap().unwrap();
        assert_eq!(seen.count, 64);
    }
}
