use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    access::{catalog::Tier, types::SubscriptionState},
    clock::Clock,
    metrics::METRICS,
    store::{StoreError, UsageEventLog},
    utils::logs_fmt::abbrev,
};

pub const FREE_MONTHLY_LIMIT: u32 = 5;
pub const PREMIUM_MONTHLY_LIMIT: u32 = 100;

/// Wire sentinel for an unlimited quota.
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyLimit {
    Limited(u32),
    Unlimited,
}

impl MonthlyLimit {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => MonthlyLimit::Limited(FREE_MONTHLY_LIMIT),
            Tier::Premium => MonthlyLimit::Limited(PREMIUM_MONTHLY_LIMIT),
            Tier::Enterprise => MonthlyLimit::Unlimited,
        }
    }

    /// Superadmins are unlimited whatever their tier.
    pub fn for_subscription(state: &SubscriptionState) -> Self {
        if state.is_superadmin() {
            MonthlyLimit::Unlimited
        } else {
            Self::for_tier(state.tier)
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            MonthlyLimit::Limited(n) => i64::from(*n),
            MonthlyLimit::Unlimited => UNLIMITED,
        }
    }
}

/// Calendar month in UTC, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsageWindow {
    pub fn containing(now: DateTime<Utc>) -> Self {
        let first_day = now.date_naive() - Duration::days(i64::from(now.day0()));
        let start = Utc.from_utc_datetime(&first_day.and_time(NaiveTime::default()));
        let end = start
            .checked_add_months(Months::new(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub actor_id: String,
    pub feature_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsagePeriod {
    current_usage: u32,
    monthly_limit: MonthlyLimit,
    reset_date: DateTime<Utc>,
}

impl UsagePeriod {
    pub fn new(current_usage: u32, monthly_limit: MonthlyLimit, reset_date: DateTime<Utc>) -> Self {
        Self {
            current_usage,
            monthly_limit,
            reset_date,
        }
    }

    pub fn current_usage(&self) -> u32 {
        self.current_usage
    }

    pub fn monthly_limit(&self) -> MonthlyLimit {
        self.monthly_limit
    }

    pub fn reset_date(&self) -> DateTime<Utc> {
        self.reset_date
    }

    /// Floored at zero; `-1` when unlimited.
    pub fn remaining_usage(&self) -> i64 {
        match self.monthly_limit {
            MonthlyLimit::Limited(limit) => {
                (i64::from(limit) - i64::from(self.current_usage)).max(0)
            }
            MonthlyLimit::Unlimited => UNLIMITED,
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining_usage() != 0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_date
    }

    pub(crate) fn record_one(&mut self) {
        self.current_usage = self.current_usage.saturating_add(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub current_usage: u32,
    pub monthly_limit: i64,
    pub remaining_usage: i64,
    pub reset_date: DateTime<Utc>,
}

impl From<&UsagePeriod> for UsageReport {
    fn from(period: &UsagePeriod) -> Self {
        Self {
            current_usage: period.current_usage(),
            monthly_limit: period.monthly_limit().as_i64(),
            remaining_usage: period.remaining_usage(),
            reset_date: period.reset_date(),
        }
    }
}

#[derive(Clone)]
pub struct UsageAccountant {
    log: Arc<dyn UsageEventLog>,
    clock: Arc<dyn Clock>,
}

impl UsageAccountant {
    pub fn new(log: Arc<dyn UsageEventLog>, clock: Arc<dyn Clock>) -> Self {
        Self { log, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Reads this month's usage. A log failure yields zero usage so the
    /// caller is never blocked by an unreadable log; the flag is `true`
    /// when that fallback was used.
    pub async fn current_period(
        &self,
        actor_id: &str,
        limit: MonthlyLimit,
    ) -> (UsagePeriod, bool) {
        let window = UsageWindow::containing(self.now());

        let (current_usage, fell_back) = match self.log.count(actor_id, &window).await {
            Ok(count) => (u32::try_from(count).unwrap_or(u32::MAX), false),
            Err(e) => {
                METRICS.upstream_read_failures.inc();
                warn!(
                    actor = %abbrev(actor_id),
                    error = %e,
                    "Usage log unreadable, assuming no usage this month"
                );
                (0, true)
            }
        };

        (UsagePeriod::new(current_usage, limit, window.end), fell_back)
    }

    pub async fn record(&self, actor_id: &str, feature_id: &str) -> Result<UsageEvent, StoreError> {
        let event = UsageEvent {
            actor_id: actor_id.to_string(),
            feature_id: feature_id.to_string(),
            occurred_at: self.now(),
        };

        self.log.append(&event).await?;

        Ok(event)
    }
}
