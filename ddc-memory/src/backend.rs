//! In-memory backend (§4.2): a key→(age, bytes) map with LRU-by-age
//! eviction and an optional hard size cap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use ddc_backend::{Backend, BackendResult};
use ddc_core::{CacheKey, DdcUsageStats, Payload, UsageStatsMap};
use tokio::sync::Mutex;

struct Entry {
    payload: Payload,
    age: i32,
}

/// The in-memory tier. `Get` resets an entry's age to zero; entries are
/// otherwise aged by [`super::snapshot`] on load, not by this backend,
/// since the in-process map never "ages" on its own — only persisted
/// snapshots carry the turn-based eviction described in §4.2.
pub struct MemoryBackend {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    total_size: AtomicU64,
    max_cache_size: Option<u64>,
    max_size_exceeded: AtomicBool,
    stats: DdcUsageStats,
}

impl MemoryBackend {
    /// `max_cache_size` is the configured cap in bytes, or `None` for
    /// an unbounded memory tier.
    pub fn new(max_cache_size: Option<u64>) -> Self {
        MemoryBackend {
            entries: Mutex::new(HashMap::new()),
            total_size: AtomicU64::new(0),
            max_cache_size,
            max_size_exceeded: AtomicBool::new(false),
            stats: DdcUsageStats::default(),
        }
    }

    /// Restore a snapshot's already-aged entries directly, bypassing the
    /// size-cap bookkeeping that normal `put` calls go through (a loaded
    /// snapshot is trusted to have respected the cap when it was saved).
    pub(crate) async fn restore_entries(&self, restored: Vec<(CacheKey, i32, Payload)>) {
        let mut entries = self.entries.lock().await;
        let mut total = 0u64;
        for (key, age, payload) in restored {
            total += payload.len() as u64;
            entries.insert(key, Entry { payload, age });
        }
        self.total_size.store(total, Ordering::SeqCst);
    }

    /// Snapshot every live entry as `(key, age, payload)` triples, for
    /// `notify_boot_complete`'s save path.
    pub(crate) async fn snapshot_entries(&self) -> Vec<(CacheKey, i32, Payload)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.age, entry.payload.clone()))
            .collect()
    }

    fn is_exceeded(&self) -> bool {
        self.max_size_exceeded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn is_writable(&self) -> bool {
        true
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        if self.is_exceeded() {
            return true;
        }
        self.entries.lock().await.contains_key(key)
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        self.stats.get.record_call();
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        entry.age = 0;
        let payload = entry.payload.clone();
        self.stats.get.record_hit(payload.len() as u64);
        Ok(Some(payload))
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        self.stats.put.record_call();
        if self.is_exceeded() {
            return Ok(());
        }

        let mut entries = self.entries.lock().await;
        if !put_even_if_exists && entries.contains_key(key) {
            return Ok(());
        }

        let payload_len = payload.len() as u64;
        let previous_len = entries.get(key).map(|e| e.payload.len() as u64).unwrap_or(0);
        entries.insert(key.clone(), Entry { payload, age: 0 });
        drop(entries);

        let new_total = self
            .total_size
            .fetch_add(payload_len.saturating_sub(previous_len), Ordering::SeqCst)
            + payload_len.saturating_sub(previous_len);

        if let Some(max) = self.max_cache_size {
            if new_total > max {
                self.max_size_exceeded.store(true, Ordering::SeqCst);
            }
        }
        self.stats.put.record_hit(payload_len);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        if transient {
            // Transient removes are ignored so the in-flight async-put
            // copy survives until the real write lands.
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.remove(key) {
            self.total_size
                .fetch_sub(entry.payload.len() as u64, Ordering::SeqCst);
        }
        Ok(())
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        map.insert(path.to_string(), self.stats.snapshot());
    }
}
