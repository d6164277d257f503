use std::{sync::Arc, time::Duration};

use sqlx::PgPool;

use crate::{
    access::AccessService,
    cache::SnapshotCache,
    clock::Clock,
    fees::{FeeSchedule, FeeService, FeeStore},
    invitations::{InvitationService, InvitationStore},
    pubsub::PubSubPublisher,
    store::{SubscriptionSource, UsageEventLog},
    utils::config::AppConfig,
};

/// The four boundaries the API reads and writes through.
pub struct Stores {
    pub subscriptions: Arc<dyn SubscriptionSource>,
    pub usage: Arc<dyn UsageEventLog>,
    pub invitations: Arc<dyn InvitationStore>,
    pub fees: Arc<dyn FeeStore>,
}

impl Stores {
    /// One backend serving every boundary.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: SubscriptionSource + UsageEventLog + InvitationStore + FeeStore + 'static,
    {
        Self {
            subscriptions: store.clone(),
            usage: store.clone(),
            invitations: store.clone(),
            fees: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub access: AccessService,
    pub invitations: Arc<InvitationService>,
    pub fees: Arc<FeeService>,
    pub clock: Arc<dyn Clock>,
    pub publisher: Option<Arc<PubSubPublisher>>,
    pub pool: Option<PgPool>,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(cfg: &AppConfig, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        let cache = SnapshotCache::new(
            Duration::from_millis(cfg.cache_ttl_ms),
            cfg.cache_max_entries,
        );

        Self {
            access: AccessService::new(stores.subscriptions, stores.usage, clock.clone(), cache),
            invitations: Arc::new(InvitationService::new(
                stores.invitations,
                clock.clone(),
                cfg.invitation_expiry_days,
                cfg.invitation_max_uses,
            )),
            fees: Arc::new(FeeService::new(
                stores.fees,
                clock.clone(),
                FeeSchedule::default(),
                cfg.fee_due_day,
                cfg.fee_grace_days,
            )),
            clock,
            publisher: None,
            pool: None,
            api_key: Arc::from(cfg.api_key.as_str()),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<PubSubPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}
