use std::time::Duration;

use http::StatusCode;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "http_requests_total",
        "Requests served by method and status class",
    );
    let vec = IntCounterVec::new(opts, &["method", "status_class"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register http_requests_total");
    vec
});

static REQUEST_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "request_duration_seconds",
        "Request latency by request class",
    )
    .buckets(latency_buckets());
    let vec = HistogramVec::new(opts, &["class"]).expect("create histogram vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register request_duration_seconds");
    vec
});

static ROUTED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "routed_requests_total",
        "Routed requests by request class and response source",
    );
    let vec = IntCounterVec::new(opts, &["class", "source"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register routed_requests_total");
    vec
});

static CACHE_LOOKUP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_lookup_total", "Cache lookups by result");
    let vec = IntCounterVec::new(opts, &["result"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_lookup_total");
    vec
});

static CACHE_STORE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_store_total", "Entries written to cache partitions")
        .expect("create cache_store_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_total");
    counter
});

static CACHE_STORE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new(
            "cache_store_errors_total",
            "Best-effort cache writes that failed, by partition",
        ),
        &["partition"],
    )
    .expect("create cache_store_errors_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_store_errors_total");
    vec
});

static CACHE_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_evictions_total", "Entries evicted by size limits")
        .expect("create cache_evictions_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_evictions_total");
    counter
});

static CACHE_CLEANUP_DIRS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "cache_cleanup_dirs_total",
        "Tombstoned cache directories removed",
    )
    .expect("create cache_cleanup_dirs_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_cleanup_dirs_total");
    counter
});

static PARTITIONS_DELETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "cache_partitions_deleted_total",
        "Stale cache partitions deleted at activation",
    )
    .expect("create cache_partitions_deleted_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_partitions_deleted_total");
    counter
});

static LIFECYCLE_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new(
            "worker_lifecycle_transitions_total",
            "Worker lifecycle transitions by target state",
        ),
        &["state"],
    )
    .expect("create worker_lifecycle_transitions_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register worker_lifecycle_transitions_total");
    vec
});

static SYNC_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new("sync_runs_total", "Background sync runs by tag and result"),
        &["tag", "result"],
    )
    .expect("create sync_runs_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register sync_runs_total");
    vec
});

static CONTROL_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new("control_requests_total", "Control endpoint requests"),
        &["endpoint"],
    )
    .expect("create control_requests_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register control_requests_total");
    vec
});

fn latency_buckets() -> Vec<f64> {
    // Cache hits land in the first buckets; network fetches further up.
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

pub fn record_request(method: &str, class: &str, status: StatusCode, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, status_class(status.as_u16())])
        .inc();
    REQUEST_LATENCY_SECONDS
        .with_label_values(&[class])
        .observe(elapsed.as_secs_f64());
}

pub fn record_route(class: &str, source: &str) {
    ROUTED_REQUESTS_TOTAL
        .with_label_values(&[class, source])
        .inc();
}

pub fn record_cache_lookup(hit: bool) {
    let label = if hit { "hit" } else { "miss" };
    CACHE_LOOKUP_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_cache_store(entries: usize) {
    CACHE_STORE_TOTAL.inc_by(entries as u64);
}

pub fn record_cache_store_error(partition: &str) {
    CACHE_STORE_ERRORS_TOTAL
        .with_label_values(&[partition])
        .inc();
}

pub fn record_cache_eviction() {
    CACHE_EVICTIONS_TOTAL.inc();
}

pub fn record_cache_cleanup_dir() {
    CACHE_CLEANUP_DIRS_TOTAL.inc();
}

pub fn record_partition_deleted() {
    PARTITIONS_DELETED_TOTAL.inc();
}

pub fn record_lifecycle_state(state: &str) {
    LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&[state])
        .inc();
}

pub fn record_sync(tag: &str, success: bool) {
    let result = if success { "ok" } else { "error" };
    SYNC_RUNS_TOTAL.with_label_values(&[tag, result]).inc();
}

pub fn record_control(endpoint: &str) {
    CONTROL_REQUESTS_TOTAL.with_label_values(&[endpoint]).inc();
}

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

pub fn gather() -> Vec<u8> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    buffer
}
