//! Metrics declaration and initialization.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events in `get_sync`/`get_async`.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "ddc_cache_hit_count",
            "Total number of cache hit events."
        );
        "ddc_cache_hit_count"
    };
    /// Track number of cache miss events in `get_sync`/`get_async`.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "ddc_cache_miss_count",
            "Total number of cache miss events."
        );
        "ddc_cache_miss_count"
    };
    /// Track number of `put` calls dispatched through the cache facade.
    pub static ref CACHE_PUT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "ddc_cache_put_count",
            "Total number of put calls dispatched through the cache facade."
        );
        "ddc_cache_put_count"
    };
}

/// Record a build-task outcome (hit or miss). No-op when the `metrics`
/// feature is disabled; the compiler eliminates the call entirely.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_build_result(hit: bool) {
    if hit {
        metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
    } else {
        metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_build_result(_hit: bool) {}

/// Record a `put` dispatched through [`crate::cache::Cache::put`].
#[cfg(feature = "metrics")]
#[inline]
pub fn record_put() {
    metrics::counter!(*CACHE_PUT_COUNTER).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_put() {}
