use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::access::catalog::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Unpaid,
    Incomplete,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    PrincipalAdmin,
    Principal,
    Teacher,
    Parent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Superadmin => "superadmin",
            Role::PrincipalAdmin => "principal_admin",
            Role::Principal => "principal",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "superadmin" => Ok(Role::Superadmin),
            "principal_admin" => Ok(Role::PrincipalAdmin),
            "principal" => Ok(Role::Principal),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Raw subscription row as the source returns it. Any column may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub tier: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

impl SubscriptionRecord {
    pub fn new(tier: Tier, status: SubscriptionStatus, role: Role) -> Self {
        Self {
            tier: Some(tier.to_string()),
            status: Some(status.to_string()),
            role: Some(role.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub role: Role,
}

impl SubscriptionState {
    pub fn new(tier: Tier, status: SubscriptionStatus, role: Role) -> Self {
        Self { tier, status, role }
    }

    /// Snapshot used whenever the subscription source cannot be read.
    pub fn free_default() -> Self {
        Self::new(Tier::Free, SubscriptionStatus::Active, Role::Parent)
    }

    /// Missing columns fall back to free / active / parent. Unparseable
    /// values fall back to the least privileged reading.
    pub fn from_record(record: &SubscriptionRecord) -> Self {
        let tier = match record.tier.as_deref() {
            None => Tier::Free,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Unrecognised tier, treating as free");
                Tier::Free
            }),
        };

        let status = match record.status.as_deref() {
            None => SubscriptionStatus::Active,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Unrecognised status, treating as incomplete");
                SubscriptionStatus::Incomplete
            }),
        };

        let role = match record.role.as_deref() {
            None => Role::Parent,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Unrecognised role, treating as parent");
                Role::Parent
            }),
        };

        Self { tier, status, role }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }
}
