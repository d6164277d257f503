use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;

use crate::access::Snapshot;

/// Per-actor subscription snapshots kept between requests.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Cache<String, Snapshot>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { inner }
    }

    /// A snapshot whose usage month has rolled over is dropped, not returned.
    pub async fn get(&self, actor_id: &str, now: DateTime<Utc>) -> Option<Snapshot> {
        let snapshot = self.inner.get(actor_id).await?;

        if snapshot.usage.is_expired(now) {
            self.inner.invalidate(actor_id).await;
            return None;
        }

        Some(snapshot)
    }

    /// Degraded snapshots are never cached so the next request retries the source.
    pub async fn put(&self, actor_id: &str, snapshot: Snapshot) {
        if snapshot.degraded {
            return;
        }
        self.inner.insert(actor_id.to_string(), snapshot).await;
    }

    pub async fn invalidate(&self, actor_id: &str) {
        self.inner.invalidate(actor_id).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::access::{MonthlyLimit, SubscriptionState, UsagePeriod};

    fn snapshot(degraded: bool) -> Snapshot {
        Snapshot {
            subscription: SubscriptionState::free_default(),
            usage: UsagePeriod::new(
                1,
                MonthlyLimit::Limited(5),
                Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap(),
            ),
            degraded,
            has_profile: true,
        }
    }

    #[tokio::test]
    async fn stores_and_invalidates() {
        let cache = SnapshotCache::new(Duration::from_secs(60), 100);
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();

        cache.put("amy", snapshot(false)).await;
        assert_eq!(cache.get("amy", now).await, Some(snapshot(false)));

        cache.invalidate("amy").await;
        assert_eq!(cache.get("amy", now).await, None);
    }

    #[tokio::test]
    async fn skips_degraded_snapshots() {
        let cache = SnapshotCache::new(Duration::from_secs(60), 100);
        cache.put("amy", snapshot(true)).await;
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn month_rollover_evicts() {
        let cache = SnapshotCache::new(Duration::from_secs(60), 100);
        cache.put("amy", snapshot(false)).await;

        let next_month = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();
        assert_eq!(cache.get("amy", next_month).await, None);
        assert_eq!(cache.entry_count().await, 0);
    }
}
