use serde::Serialize;

use crate::access::{
    catalog::{CATALOG, Catalog, Tier},
    types::SubscriptionState,
    usage::UsagePeriod,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    SuperadminOverride,
    Granted,
    UnknownFeature,
    SubscriptionInactive,
    TierTooLow,
    QuotaExhausted,
    SubscriptionUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub feature_id: String,
    pub has_access: bool,
    pub can_use: bool,
    pub needs_upgrade: bool,
    pub metered: bool,
    pub required_tier: Tier,
    pub reason: DecisionReason,
}

/// Stateless access rules over a subscription snapshot.
///
/// Every check is total: it answers `false` rather than failing.
#[derive(Debug, Clone, Copy)]
pub struct AccessEvaluator {
    catalog: &'static Catalog,
}

impl Default for AccessEvaluator {
    fn default() -> Self {
        Self::new(&CATALOG)
    }
}

impl AccessEvaluator {
    pub fn new(catalog: &'static Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    pub fn has_access(&self, state: &SubscriptionState, feature_id: &str) -> bool {
        if state.is_superadmin() {
            return true;
        }

        // Lapsed subscriptions keep the free tier.
        let tier = if state.is_active() { state.tier } else { Tier::Free };

        self.catalog.grants(tier, feature_id)
    }

    pub fn needs_upgrade(&self, state: &SubscriptionState, feature_id: &str) -> bool {
        if self.has_access(state, feature_id) {
            return false;
        }

        self.catalog
            .required_tier(feature_id)
            .is_some_and(|tier| tier.is_paid())
    }

    pub fn can_use_feature(
        &self,
        state: &SubscriptionState,
        usage: &UsagePeriod,
        feature_id: &str,
    ) -> bool {
        if state.is_superadmin() {
            return true;
        }

        if !self.catalog.is_metered(feature_id) {
            return self.has_access(state, feature_id);
        }

        if !self.has_access(state, feature_id) {
            return false;
        }

        usage.has_remaining()
    }

    pub fn decide(
        &self,
        state: &SubscriptionState,
        usage: &UsagePeriod,
        feature_id: &str,
    ) -> AccessDecision {
        let has_access = self.has_access(state, feature_id);
        let can_use = self.can_use_feature(state, usage, feature_id);

        let reason = if state.is_superadmin() {
            DecisionReason::SuperadminOverride
        } else if !self.catalog.contains(feature_id) {
            DecisionReason::UnknownFeature
        } else if !has_access && !state.is_active() {
            DecisionReason::SubscriptionInactive
        } else if !has_access {
            DecisionReason::TierTooLow
        } else if !can_use {
            DecisionReason::QuotaExhausted
        } else {
            DecisionReason::Granted
        };

        AccessDecision {
            feature_id: feature_id.to_string(),
            has_access,
            can_use,
            needs_upgrade: self.needs_upgrade(state, feature_id),
            metered: self.catalog.is_metered(feature_id),
            required_tier: self.catalog.required_tier(feature_id).unwrap_or(Tier::Free),
            reason,
        }
    }

    /// Answer for an actor whose subscription has not been loaded: closed,
    /// except for features the catalog does not know.
    pub fn decide_without_subscription(&self, feature_id: &str) -> AccessDecision {
        let known = self.catalog.contains(feature_id);

        AccessDecision {
            feature_id: feature_id.to_string(),
            has_access: !known,
            can_use: !known,
            needs_upgrade: false,
            metered: self.catalog.is_metered(feature_id),
            required_tier: self.catalog.required_tier(feature_id).unwrap_or(Tier::Free),
            reason: if known {
                DecisionReason::SubscriptionUnavailable
            } else {
                DecisionReason::UnknownFeature
            },
        }
    }
}
