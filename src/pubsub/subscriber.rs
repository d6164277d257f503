use futures::StreamExt;
use redis::{Client as RedisClient, aio::PubSub};
use tracing::{info, warn};

use crate::{
    access::AccessService,
    pubsub::types::{PubSubAction, PubSubError, PubSubEvent},
    utils::{constants::SUBSCRIPTION_CHANNEL, logs_fmt::abbrev},
};

pub struct PubSubSubscriber {
    redis_client: RedisClient,
    access: AccessService,
    origin: Option<String>,
}

impl PubSubSubscriber {
    pub fn new(redis_client: RedisClient, access: AccessService) -> Self {
        Self {
            redis_client,
            access,
            origin: None,
        }
    }

    /// Ignore events this instance published itself.
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub async fn run(&self) -> Result<(), PubSubError> {
        let mut pubsub_conn: PubSub = self.redis_client.get_async_pubsub().await?;
        pubsub_conn.subscribe(SUBSCRIPTION_CHANNEL).await?;

        info!(channel = SUBSCRIPTION_CHANNEL, "Subscribed to subscription channel");

        let mut stream = pubsub_conn.on_message();

        while let Some(msg) = stream.next().await {
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Unreadable pubsub payload");
                    continue;
                }
            };
            match serde_json::from_str::<PubSubEvent>(&payload) {
                Ok(event) => self.apply(event).await,
                Err(e) => warn!(error = %e, "Malformed pubsub event"),
            }
        }

        warn!("Pub/Sub stream ended unexpectedly");
        Ok(())
    }

    pub async fn apply(&self, event: PubSubEvent) {
        if self.origin.as_deref() == Some(event.origin.as_str()) {
            return;
        }
        match event.action {
            PubSubAction::Invalidate { actor_id } => {
                info!(actor = %abbrev(&actor_id), "Received snapshot invalidation");
                self.access.invalidate(&actor_id).await;
            }
            PubSubAction::InvalidateAll => {
                info!("Received full snapshot invalidation");
                self.access.invalidate_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        access::{Role, SubscriptionRecord, SubscriptionStatus, Tier},
        cache::SnapshotCache,
        clock::FixedClock,
        store::MemoryStore,
    };

    async fn cached_service() -> AccessService {
        let store = Arc::new(MemoryStore::new());
        store
            .put_subscription(
                "amy",
                SubscriptionRecord::new(Tier::Premium, SubscriptionStatus::Active, Role::Teacher),
            )
            .await;
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()));
        let access = AccessService::new(
            store.clone(),
            store,
            clock,
            SnapshotCache::new(Duration::from_secs(60), 100),
        );
        access.open_session("amy").await;
        access
    }

    #[tokio::test]
    async fn foreign_invalidation_evicts_snapshot() {
        let access = cached_service().await;
        assert_eq!(access.cache().entry_count().await, 1);

        // client is never connected; apply() does not touch redis
        let client = RedisClient::open("redis://127.0.0.1/").unwrap();
        let subscriber = PubSubSubscriber::new(client, access.clone()).with_origin("self");

        subscriber
            .apply(PubSubEvent::invalidate("self", "amy"))
            .await;
        assert_eq!(access.cache().entry_count().await, 1);

        subscriber
            .apply(PubSubEvent::invalidate("other", "amy"))
            .await;
        assert_eq!(access.cache().entry_count().await, 0);
    }

    #[tokio::test]
    async fn invalidate_all_clears_cache() {
        let access = cached_service().await;
        let client = RedisClient::open("redis://127.0.0.1/").unwrap();
        let subscriber = PubSubSubscriber::new(client, access.clone());

        subscriber.apply(PubSubEvent::invalidate_all("other")).await;
        assert_eq!(access.cache().entry_count().await, 0);
    }
}
