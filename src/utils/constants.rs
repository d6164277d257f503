/// Redis channel every instance listens on for snapshot invalidations.
pub const SUBSCRIPTION_CHANNEL: &str = "edudash:subscriptions";

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

pub const DEFAULT_LOG_FILTER: &str = "edudash=info,tower_http=warn";
