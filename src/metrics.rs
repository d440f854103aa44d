use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("mytube_upstream_requests_total", "Total upstream attempts").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("mytube_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("mytube_cache_misses_total", "Total cache misses").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "mytube_upstream_latency_seconds",
        "Upstream request latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("mytube_cache_size", "Current number of items in cache").unwrap();
    pub static ref QUOTA_UNITS: CounterVec = register_counter_vec!(
        "mytube_quota_units_total",
        "Quota units billed per api key",
        &["key"]
    )
    .unwrap();
    pub static ref KEY_ROTATIONS: Counter =
        register_counter!("mytube_key_rotations_total", "Total api key rotations").unwrap();
}
