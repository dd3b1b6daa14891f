//! [`VerifyWrapper`]: a debug-only wrapper that never serves a hit, but
//! cross-checks new puts against whatever is already stored to surface
//! derivers that produce non-deterministic output.

use std::path::PathBuf;

use async_trait::async_trait;
use ddc_core::{CacheKey, Payload, UsageStatsMap};
use tokio::sync::Mutex;
use tracing::warn;

use crate::backend::{Backend, DynBackend};
use crate::error::BackendResult;

/// Wraps an inner backend for verification: every `get` reports a miss
/// (forcing the deriver to rebuild), and every `put` is compared against
/// whatever the inner backend already held for that key. A mismatch is
/// written to `debug_dir` as `<key>.mismatch.old` / `.new` for later
/// inspection, and optionally overwrites the cache entry.
pub struct VerifyWrapper {
    inner: DynBackend,
    debug_dir: Option<PathBuf>,
    fix: bool,
    already_tested: Mutex<std::collections::HashSet<CacheKey>>,
}

impl VerifyWrapper {
    pub fn new(inner: DynBackend, debug_dir: Option<PathBuf>, fix: bool) -> Self {
        VerifyWrapper {
            inner,
            debug_dir,
            fix,
            already_tested: Mutex::new(std::collections::HashSet::new()),
        }
    }

    async fn record_mismatch(&self, key: &CacheKey, old: &[u8], new: &[u8]) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            warn!(%key, error = %err, "verify wrapper: could not create debug dir");
            return;
        }
        let _ = tokio::fs::write(dir.join(format!("{key}.mismatch.old")), old).await;
        let _ = tokio::fs::write(dir.join(format!("{key}.mismatch.new")), new).await;
    }
}

#[async_trait]
impl Backend for VerifyWrapper {
    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn backfill_lower_levels(&self) -> bool {
        self.inner.backfill_lower_levels()
    }

    async fn probably_exists(&self, _key: &CacheKey) -> bool {
        false
    }

    async fn get(&self, _key: &CacheKey) -> BackendResult<Option<Payload>> {
        Ok(None)
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        {
            let mut tested = self.already_tested.lock().await;
            tested.insert(key.clone());
        }

        if let Some(existing) = self.inner.get(key).await? {
            if existing != payload {
                warn!(%key, "verify wrapper: deriver produced non-matching output");
                self.record_mismatch(key, &existing, &payload).await;
                if !self.fix {
                    return Ok(());
                }
            } else {
                return Ok(());
            }
        }

        self.inner.put(key, payload, put_even_if_exists).await
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        self.inner.remove(key, transient).await
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        self.inner.gather_usage_stats(map, path);
    }
}
