//! Subscription and feature access engine.
//!
//! The catalog says which tier a feature needs and whether it is metered,
//! the usage accountant turns the usage log into a monthly quota view, and
//! the evaluator combines both with the actor's subscription.

pub mod catalog;
pub mod evaluator;
pub mod service;
pub mod session;
pub mod types;
pub mod usage;

pub use catalog::{CATALOG, Catalog, FeatureDescriptor, Tier};
pub use evaluator::{AccessDecision, AccessEvaluator, DecisionReason};
pub use service::AccessService;
pub use session::{SessionState, Snapshot, SubscriptionSession, TrackOutcome};
pub use types::{Role, SubscriptionRecord, SubscriptionState, SubscriptionStatus};
pub use usage::{MonthlyLimit, UsageAccountant, UsageEvent, UsagePeriod, UsageReport, UsageWindow};
