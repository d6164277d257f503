use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    access::{
        catalog::{CATALOG, Catalog},
        session::SubscriptionSession,
        usage::UsageAccountant,
    },
    cache::SnapshotCache,
    clock::Clock,
    metrics::METRICS,
    store::{SubscriptionSource, UsageEventLog},
    utils::logs_fmt::abbrev,
};

/// Opens actor sessions, serving snapshots from the cache when it can.
#[derive(Clone)]
pub struct AccessService {
    source: Arc<dyn SubscriptionSource>,
    accountant: UsageAccountant,
    cache: SnapshotCache,
}

impl AccessService {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        log: Arc<dyn UsageEventLog>,
        clock: Arc<dyn Clock>,
        cache: SnapshotCache,
    ) -> Self {
        Self {
            source,
            accountant: UsageAccountant::new(log, clock),
            cache,
        }
    }

    pub fn catalog(&self) -> &'static Catalog {
        &CATALOG
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub async fn open_session(&self, actor_id: &str) -> SubscriptionSession {
        if let Some(snapshot) = self.cache.get(actor_id, self.accountant.now()).await {
            METRICS.cache_hits.inc();
            debug!(actor = %abbrev(actor_id), "Snapshot cache hit");
            return SubscriptionSession::from_snapshot(
                actor_id,
                snapshot,
                self.source.clone(),
                self.accountant.clone(),
            );
        }

        METRICS.cache_misses.inc();

        let mut session =
            SubscriptionSession::new(actor_id, self.source.clone(), self.accountant.clone());
        let snapshot = session.load().await;
        self.cache.put(actor_id, snapshot).await;

        session
    }

    /// Writes the session's current snapshot back, e.g. after tracking usage.
    pub async fn save(&self, session: &SubscriptionSession) {
        if let Some(snapshot) = session.snapshot() {
            self.cache.put(session.actor_id(), *snapshot).await;
        }
    }

    pub async fn refresh(&self, actor_id: &str) -> SubscriptionSession {
        self.cache.invalidate(actor_id).await;
        info!(actor = %abbrev(actor_id), "Subscription refresh requested");
        self.open_session(actor_id).await
    }

    pub async fn invalidate(&self, actor_id: &str) {
        self.cache.invalidate(actor_id).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
