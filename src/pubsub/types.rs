use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Message broadcast on the subscription channel whenever an instance learns
/// that cached snapshots went stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubEvent {
    pub origin: String,
    pub action: PubSubAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PubSubAction {
    Invalidate { actor_id: String },
    InvalidateAll,
}

impl PubSubEvent {
    pub fn invalidate(origin: &str, actor_id: &str) -> Self {
        Self {
            origin: origin.to_string(),
            action: PubSubAction::Invalidate {
                actor_id: actor_id.to_string(),
            },
        }
    }

    pub fn invalidate_all(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            action: PubSubAction::InvalidateAll,
        }
    }
}
