use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    access::{
        evaluator::{AccessDecision, AccessEvaluator},
        types::SubscriptionState,
        usage::{MonthlyLimit, UsageAccountant, UsagePeriod},
    },
    metrics::METRICS,
    store::{StoreError, SubscriptionSource},
    utils::logs_fmt::abbrev,
};

/// Subscription plus usage as last seen for one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub subscription: SubscriptionState,
    pub usage: UsagePeriod,
    /// Set when the subscription source or the usage log could not be
    /// read and a fallback was substituted.
    pub degraded: bool,
    /// Cleared when the actor has no profile at all.
    pub has_profile: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Loaded(Snapshot),
    Refreshing(Snapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOutcome {
    /// One unit was appended to the usage log.
    Recorded,
    /// Unmetered feature, nothing to record.
    NotMetered,
    /// Superadmin, nothing recorded or limited.
    Bypassed,
    Denied,
    QuotaExhausted,
    /// No profile exists for the actor; nothing recorded.
    UnknownActor,
    /// The log append failed; local counters were left alone.
    WriteFailed,
}

impl TrackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TrackOutcome::Recorded | TrackOutcome::NotMetered | TrackOutcome::Bypassed
        )
    }
}

/// One actor's view of its subscription for the length of a session.
pub struct SubscriptionSession {
    actor_id: String,
    state: SessionState,
    source: Arc<dyn SubscriptionSource>,
    accountant: UsageAccountant,
    evaluator: AccessEvaluator,
}

impl SubscriptionSession {
    pub fn new(
        actor_id: impl Into<String>,
        source: Arc<dyn SubscriptionSource>,
        accountant: UsageAccountant,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            state: SessionState::Loading,
            source,
            accountant,
            evaluator: AccessEvaluator::default(),
        }
    }

    pub fn from_snapshot(
        actor_id: impl Into<String>,
        snapshot: Snapshot,
        source: Arc<dyn SubscriptionSource>,
        accountant: UsageAccountant,
    ) -> Self {
        Self {
            state: SessionState::Loaded(snapshot),
            ..Self::new(actor_id, source, accountant)
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn evaluator(&self) -> &AccessEvaluator {
        &self.evaluator
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.state {
            SessionState::Loading => None,
            SessionState::Loaded(s) | SessionState::Refreshing(s) => Some(s),
        }
    }

    fn snapshot_mut(&mut self) -> Option<&mut Snapshot> {
        match &mut self.state {
            SessionState::Loading => None,
            SessionState::Loaded(s) | SessionState::Refreshing(s) => Some(s),
        }
    }

    /// Fetches subscription and usage. Never fails: an unreadable source
    /// yields a degraded free-tier snapshot.
    pub async fn load(&mut self) -> Snapshot {
        self.state = match std::mem::replace(&mut self.state, SessionState::Loading) {
            SessionState::Loaded(s) | SessionState::Refreshing(s) => SessionState::Refreshing(s),
            SessionState::Loading => SessionState::Loading,
        };

        let snapshot = self.fetch_snapshot().await;
        self.state = SessionState::Loaded(snapshot);

        snapshot
    }

    pub async fn refresh(&mut self) -> Snapshot {
        self.load().await
    }

    async fn fetch_snapshot(&self) -> Snapshot {
        let fetched = self.source.fetch_subscription(&self.actor_id).await;
        let (subscription, source_degraded, has_profile) = match fetched {
            Ok(record) => (SubscriptionState::from_record(&record), false, true),
            Err(StoreError::NotFound(_)) => {
                debug!(
                    actor = %abbrev(&self.actor_id),
                    "No profile for actor, using free tier"
                );
                (SubscriptionState::free_default(), false, false)
            }
            Err(e) => {
                METRICS.upstream_read_failures.inc();
                warn!(
                    actor = %abbrev(&self.actor_id),
                    error = %e,
                    "Subscription unreadable, falling back to free tier"
                );
                (SubscriptionState::free_default(), true, true)
            }
        };

        let (usage, usage_degraded) = self
            .accountant
            .current_period(&self.actor_id, MonthlyLimit::for_subscription(&subscription))
            .await;

        debug!(
            actor = %abbrev(&self.actor_id),
            tier = %subscription.tier,
            status = %subscription.status,
            usage = usage.current_usage(),
            "Subscription snapshot loaded"
        );

        Snapshot {
            subscription,
            usage,
            degraded: source_degraded || usage_degraded,
            has_profile,
        }
    }

    pub fn has_access(&self, feature_id: &str) -> bool {
        match self.snapshot() {
            Some(s) => self.evaluator.has_access(&s.subscription, feature_id),
            None => self.evaluator.decide_without_subscription(feature_id).has_access,
        }
    }

    pub fn needs_upgrade(&self, feature_id: &str) -> bool {
        match self.snapshot() {
            Some(s) => self.evaluator.needs_upgrade(&s.subscription, feature_id),
            None => false,
        }
    }

    pub fn can_use_feature(&self, feature_id: &str) -> bool {
        match self.snapshot() {
            Some(s) => self
                .evaluator
                .can_use_feature(&s.subscription, &s.usage, feature_id),
            None => self.evaluator.decide_without_subscription(feature_id).can_use,
        }
    }

    pub fn decide(&self, feature_id: &str) -> AccessDecision {
        match self.snapshot() {
            Some(s) => self.evaluator.decide(&s.subscription, &s.usage, feature_id),
            None => self.evaluator.decide_without_subscription(feature_id),
        }
    }

    pub async fn track_usage(&mut self, feature_id: &str) -> bool {
        self.track(feature_id).await.is_success()
    }

    /// Consumes one unit of quota for a metered feature.
    pub async fn track(&mut self, feature_id: &str) -> TrackOutcome {
        if self
            .snapshot()
            .is_some_and(|s| s.subscription.is_superadmin())
        {
            return TrackOutcome::Bypassed;
        }

        if self.snapshot().is_some_and(|s| !s.has_profile) {
            return TrackOutcome::UnknownActor;
        }

        if !self.evaluator.catalog().is_metered(feature_id) {
            return TrackOutcome::NotMetered;
        }

        if !self.can_use_feature(feature_id) {
            return if self.has_access(feature_id) {
                TrackOutcome::QuotaExhausted
            } else {
                TrackOutcome::Denied
            };
        }

        let recorded = self.accountant.record(&self.actor_id, feature_id).await;

        match recorded {
            Ok(_) => {
                if let Some(snapshot) = self.snapshot_mut() {
                    snapshot.usage.record_one();
                }
                info!(
                    actor = %abbrev(&self.actor_id),
                    feature = feature_id,
                    "Usage recorded"
                );
                TrackOutcome::Recorded
            }
            Err(e) => {
                warn!(
                    actor = %abbrev(&self.actor_id),
                    feature = feature_id,
                    error = %e,
                    "Failed to record usage"
                );
                TrackOutcome::WriteFailed
            }
        }
    }
}
