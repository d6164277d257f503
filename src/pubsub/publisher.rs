use redis::{Client as RedisClient, aio::MultiplexedConnection};
use tracing::info;
use uuid::Uuid;

use crate::{
    pubsub::types::{PubSubError, PubSubEvent},
    utils::{constants::SUBSCRIPTION_CHANNEL, logs_fmt::abbrev},
};

pub struct PubSubPublisher {
    origin: String,
    redis: MultiplexedConnection,
}

impl PubSubPublisher {
    pub async fn new(redis_client: &RedisClient) -> Result<Self, PubSubError> {
        let redis = redis_client.get_multiplexed_async_connection().await?;
        Ok(Self {
            origin: Uuid::new_v4().to_string(),
            redis,
        })
    }

    /// Identifies this instance so it can skip its own broadcasts.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub async fn publish_invalidate(&self, actor_id: &str) -> Result<(), PubSubError> {
        self.publish(&PubSubEvent::invalidate(&self.origin, actor_id))
            .await?;
        info!(event = "snapshot.invalidate.published", actor = %abbrev(actor_id));
        Ok(())
    }

    pub async fn publish_invalidate_all(&self) -> Result<(), PubSubError> {
        self.publish(&PubSubEvent::invalidate_all(&self.origin))
            .await?;
        info!(event = "snapshot.invalidate_all.published");
        Ok(())
    }

    async fn publish(&self, event: &PubSubEvent) -> Result<(), PubSubError> {
        let message = serde_json::to_string(event)?;
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(SUBSCRIPTION_CHANNEL)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
