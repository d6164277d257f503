pub mod publisher;
pub mod subscriber;
pub mod types;

pub use publisher::PubSubPublisher;
pub use subscriber::PubSubSubscriber;
pub use types::{PubSubAction, PubSubError, PubSubEvent};
