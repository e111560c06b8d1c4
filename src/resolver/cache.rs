use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct CachedEntry<V> {
    pub stored_at: Instant,
    pub value: V,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CachedEntry<V>>,
    revision: Option<String>,
}

/// Read-through cache with a fixed time-to-live. Concurrent readers share the
/// lock; a full refresh swaps the whole map under one write.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    state: RwLock<CacheState<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                revision: None,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let guard = self.state.read().await;
        guard
            .entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let mut guard = self.state.write().await;
        guard.entries.insert(
            key.into(),
            CachedEntry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    pub async fn insert_many(&self, items: Vec<(String, V)>) {
        let now = Instant::now();
        let mut guard = self.state.write().await;
        for (key, value) in items {
            guard.entries.insert(
                key,
                CachedEntry {
                    stored_at: now,
                    value,
                },
            );
        }
    }

    /// Replaces every entry at once. Readers see either the old or the new map.
    pub async fn replace_all(&self, items: Vec<(String, V)>, revision: String) {
        let now = Instant::now();
        let entries = items
            .into_iter()
            .map(|(key, value)| {
                (
                    key,
                    CachedEntry {
                        stored_at: now,
                        value,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        let mut guard = self.state.write().await;
        guard.entries = entries;
        guard.revision = Some(revision);
    }

    pub async fn invalidate(&self) {
        let mut guard = self.state.write().await;
        guard.entries.clear();
        guard.revision = None;
    }

    pub async fn revision(&self) -> Option<String> {
        self.state.read().await.revision.clone()
    }

    pub async fn fresh_len(&self) -> usize {
        let guard = self.state.read().await;
        guard
            .entries
            .values()
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::TtlCache;

    #[tokio::test]
    async fn returns_fresh_entries_only() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("A", 1).await;
        assert_eq!(cache.get("A").await, Some(1));
        assert_eq!(cache.get("B").await, None);

        let expired = TtlCache::new(Duration::ZERO);
        expired.insert("A", 1).await;
        assert_eq!(expired.get("A").await, None);
        assert_eq!(expired.fresh_len().await, 0);
    }

    #[tokio::test]
    async fn replace_all_swaps_contents_and_revision() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("old", 1).await;
        cache
            .replace_all(vec![("new".to_string(), 2)], "rev-1".to_string())
            .await;
        assert_eq!(cache.get("old").await, None);
        assert_eq!(cache.get("new").await, Some(2));
        assert_eq!(cache.revision().await.as_deref(), Some("rev-1"));

        cache.invalidate().await;
        assert_eq!(cache.get("new").await, None);
        assert!(cache.revision().await.is_none());
    }
}
