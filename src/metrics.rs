use once_cell::sync::Lazy;
use prometheus::{Counter, Histogram, HistogramOpts, Registry, TextEncoder};

pub struct AccessMetrics {
    pub checks_allowed: Counter,
    pub checks_denied: Counter,
    pub usage_tracked: Counter,
    pub usage_refused: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub upstream_read_failures: Counter,
    pub request_duration: Histogram,
    registry: Registry,
}

impl AccessMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let checks_allowed = Counter::new(
            "edudash_access_checks_allowed_total",
            "Feature checks answered with access",
        )
        .unwrap();
        let checks_denied = Counter::new(
            "edudash_access_checks_denied_total",
            "Feature checks answered without access",
        )
        .unwrap();
        let usage_tracked = Counter::new(
            "edudash_usage_tracked_total",
            "Metered invocations recorded",
        )
        .unwrap();
        let usage_refused = Counter::new(
            "edudash_usage_refused_total",
            "Metered invocations refused or not recorded",
        )
        .unwrap();
        let cache_hits = Counter::new(
            "edudash_snapshot_cache_hits_total",
            "Subscription snapshot cache hits",
        )
        .unwrap();
        let cache_misses = Counter::new(
            "edudash_snapshot_cache_misses_total",
            "Subscription snapshot cache misses",
        )
        .unwrap();
        let upstream_read_failures = Counter::new(
            "edudash_upstream_read_failures_total",
            "Subscription or usage reads that fell back to defaults",
        )
        .unwrap();
        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "edudash_request_duration_seconds",
                "Access API request duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )
        .unwrap();

        registry.register(Box::new(checks_allowed.clone())).unwrap();
        registry.register(Box::new(checks_denied.clone())).unwrap();
        registry.register(Box::new(usage_tracked.clone())).unwrap();
        registry.register(Box::new(usage_refused.clone())).unwrap();
        registry.register(Box::new(cache_hits.clone())).unwrap();
        registry.register(Box::new(cache_misses.clone())).unwrap();
        registry
            .register(Box::new(upstream_read_failures.clone()))
            .unwrap();
        registry
            .register(Box::new(request_duration.clone()))
            .unwrap();

        Self {
            checks_allowed,
            checks_denied,
            usage_tracked,
            usage_refused,
            cache_hits,
            cache_misses,
            upstream_read_failures,
            request_duration,
            registry,
        }
    }

    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }
}

pub static METRICS: Lazy<AccessMetrics> = Lazy::new(AccessMetrics::new);

pub async fn metrics_handler() -> String {
    METRICS.encode()
}
