use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::catalog::fallback::{static_discounts, static_tracks};
use crate::catalog::{Discount, Track};
use crate::resolver::{DiscountRow, ReferenceStore, TrackRow};

/// One step in the resolution chain. `None` means "not here, ask the next one".
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn is_fallback(&self) -> bool {
        false
    }

    fn failure_count(&self) -> u64 {
        0
    }

    async fn track(&self, id: &str) -> Option<Track>;
    async fn tracks(&self) -> Option<Vec<Track>>;
    async fn discounts(&self) -> Option<Vec<Discount>>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub track_backoff: Duration,
    pub discount_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            track_backoff: Duration::from_millis(1500),
            discount_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            track_backoff: Duration::ZERO,
            discount_backoff: Duration::ZERO,
        }
    }
}

/// Live store lookups with bounded retry. Exhaustion is logged and reported as
/// a miss so the chain moves on to the built-in tables.
pub struct StoreStrategy {
    store: Arc<dyn ReferenceStore>,
    retry: RetryPolicy,
    failures: AtomicU64,
}

impl StoreStrategy {
    pub fn new(store: Arc<dyn ReferenceStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            failures: AtomicU64::new(0),
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, backoff: Duration, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let attempts = self.retry.max_retries + 1;
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Some(value),
                Err(error) => {
                    warn!(
                        "{} {what} failed (attempt {attempt}/{attempts}): {error:#}",
                        self.store.name()
                    );
                    if attempt < attempts && !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            "{} {what} exhausted retries, using fallback data",
            self.store.name()
        );
        None
    }

    async fn track_rows(&self) -> Option<Vec<TrackRow>> {
        let store = Arc::clone(&self.store);
        self.with_retry("track list", self.retry.track_backoff, move || {
            let store = Arc::clone(&store);
            async move { store.get_tracks().await }
        })
        .await
    }
}

#[async_trait]
impl ResolverStrategy for StoreStrategy {
    fn name(&self) -> &str {
        self.store.name()
    }

    fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    async fn track(&self, id: &str) -> Option<Track> {
        let store = Arc::clone(&self.store);
        let key = id.to_string();
        let direct = self
            .with_retry("track lookup", self.retry.track_backoff, move || {
                let store = Arc::clone(&store);
                let key = key.clone();
                async move { store.get_track(&key).await }
            })
            .await?;
        if let Some(row) = direct {
            return Some(row.into_track());
        }
        self.track_rows()
            .await?
            .into_iter()
            .find(|row| row.matches(id))
            .map(TrackRow::into_track)
    }

    async fn tracks(&self) -> Option<Vec<Track>> {
        let rows = self.track_rows().await?;
        Some(rows.into_iter().map(TrackRow::into_track).collect())
    }

    async fn discounts(&self) -> Option<Vec<Discount>> {
        let store = Arc::clone(&self.store);
        let rows = self
            .with_retry("discount list", self.retry.discount_backoff, move || {
                let store = Arc::clone(&store);
                async move { store.get_discount_types().await }
            })
            .await?;
        Some(rows.into_iter().map(DiscountRow::into_discount).collect())
    }
}

/// Built-in tables. Always answers.
#[derive(Debug, Clone, Copy)]
pub struct StaticStrategy;

#[async_trait]
impl ResolverStrategy for StaticStrategy {
    fn name(&self) -> &str {
        "static"
    }

    fn is_fallback(&self) -> bool {
        true
    }

    async fn track(&self, id: &str) -> Option<Track> {
        static_tracks().into_iter().find(|track| track.matches(id))
    }

    async fn tracks(&self) -> Option<Vec<Track>> {
        Some(static_tracks())
    }

    async fn discounts(&self) -> Option<Vec<Discount>> {
        Some(static_discounts())
    }
}

#[cfg(test)]
mod tests {
    use super::{ResolverStrategy, StaticStrategy};

    #[test]
    fn static_strategy_answers_well_known_ids() {
        let strategy = StaticStrategy;
        let track = tokio_test::block_on(strategy.track("b")).expect("track B");
        assert_eq!(track.cap_percentage, Some(25.0));
        assert!(tokio_test::block_on(strategy.track("Q")).is_none());
        let discounts = tokio_test::block_on(strategy.discounts()).expect("catalog");
        assert!(discounts.iter().any(|d| d.code == "COM_EXTRA"));
    }
}
