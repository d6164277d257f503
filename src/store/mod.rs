//! Boundaries to the external stores the engine reads and writes.

pub mod memory;

use async_trait::async_trait;

use crate::access::{SubscriptionRecord, UsageEvent, UsageWindow};

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Malformed(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// `NotFound` when the actor has no profile at all.
    async fn fetch_subscription(&self, actor_id: &str) -> Result<SubscriptionRecord, StoreError>;
}

/// Append-only log of metered invocations.
#[async_trait]
pub trait UsageEventLog: Send + Sync {
    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError>;

    /// Events for `actor_id` with `window.start <= at < window.end`.
    async fn count(&self, actor_id: &str, window: &UsageWindow) -> Result<u64, StoreError>;
}
