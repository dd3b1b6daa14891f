//! The [`Backend`] contract (§4.1): the single interface implemented by
//! every concrete store (memory, filesystem, pak) and every wrapper
//! (async-put, key-length, corruption, hierarchical, verify).
//!
//! Dyn-compatible by construction, so a `BackendGraph` can be built as a
//! tree of `Arc<dyn Backend>` regardless of concrete node type.

use std::sync::Arc;

use async_trait::async_trait;
use ddc_core::{CacheKey, Payload, UsageStatsMap};

use crate::error::BackendResult;

/// Storage or decoration node in a backend graph.
///
/// Every method is safe to call concurrently from any thread once the
/// backend has finished construction. None of these methods surface a
/// miss as an `Err` — a miss is `Ok(None)` from [`Backend::get`], and a
/// `BackendError` is reserved for failures the caller cannot paper over
/// as "not found".
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether this backend accepts writes at all. A read-only pak, or
    /// a filesystem backend that failed its write probe, reports
    /// `false` here.
    fn is_writable(&self) -> bool;

    /// Whether a hierarchical parent may write *through* this backend
    /// into lower tiers. `true` for every backend except a read-only
    /// pak, which must act as an authoritative stop for fan-down.
    fn backfill_lower_levels(&self) -> bool {
        true
    }

    /// Best-effort existence check. May answer `true` for a key that
    /// has since been invalidated or found corrupt (false positive);
    /// must never answer `false` for a key durably committed and
    /// unmodified (no false negatives).
    async fn probably_exists(&self, key: &CacheKey) -> bool;

    /// Fetch the payload for `key`. `Ok(None)` is a plain miss;
    /// `Err` is reserved for I/O failures reading an entry known to
    /// exist.
    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>>;

    /// Store `payload` under `key`. Fire-and-forget: the backend may
    /// return before the write is durable (see `AsyncPutWrapper` for
    /// the layer that makes this concrete). A no-op, not an error, if
    /// `is_writable()` is `false`. `put_even_if_exists` forces an
    /// overwrite of an existing entry rather than skipping the write.
    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()>;

    /// Remove `key` if present. `transient` hints that this removal is
    /// cleaning up a speculative copy (e.g. an async-put's in-flight
    /// cache entry) rather than an authoritative delete; backends that
    /// only support authoritative deletion may ignore transient
    /// removals entirely.
    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()>;

    /// Append this node's usage stats, and recursively its children's,
    /// to `map` under a dotted path (e.g. `"0.1.0"`) identifying this
    /// node's position in the graph.
    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str);
}

#[async_trait]
impl Backend for Arc<dyn Backend> {
    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn backfill_lower_levels(&self) -> bool {
        (**self).backfill_lower_levels()
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        (**self).probably_exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        (**self).put(key, payload, put_even_if_exists).await
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        (**self).remove(key, transient).await
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        (**self).gather_usage_stats(map, path)
    }
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn backfill_lower_levels(&self) -> bool {
        (**self).backfill_lower_levels()
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        (**self).probably_exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        (**self).put(key, payload, put_even_if_exists).await
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        (**self).remove(key, transient).await
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        (**self).gather_usage_stats(map, path)
    }
}

/// Convenience alias for the shape every wrapper and graph node stores
/// its inner backend as.
pub type DynBackend = Arc<dyn Backend>;
