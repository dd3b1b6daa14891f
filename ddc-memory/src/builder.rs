//! Boot-mode memory backend: a [`MemoryBackend`] that loads a snapshot
//! at construction and can save one on `notify_boot_complete`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ddc_backend::{Backend, BackendResult};
use ddc_core::{CacheKey, Payload, UsageStatsMap};

use crate::backend::MemoryBackend;
use crate::snapshot;

/// A memory backend that persists across runs via a boot snapshot file
/// (§3 `Boot` node kind). Delegates every storage operation to the
/// wrapped [`MemoryBackend`]; adds load-on-construct and
/// save-on-boot-complete.
pub struct BootMemoryBackend {
    inner: MemoryBackend,
    filename: Option<PathBuf>,
    max_cache_size_bytes: Option<u64>,
    disabled: AtomicBool,
}

/// `max_cache_size_mib` is clamped to 2048 MiB per §6's `Boot` node
/// option table.
const MAX_BOOT_CACHE_SIZE_MIB: u64 = 2048;

impl BootMemoryBackend {
    pub async fn new(filename: Option<PathBuf>, max_cache_size_mib: Option<u64>) -> Self {
        let max_cache_size_bytes = max_cache_size_mib
            .map(|mib| mib.min(MAX_BOOT_CACHE_SIZE_MIB) * 1024 * 1024);
        let inner = MemoryBackend::new(max_cache_size_bytes);

        if let Some(path) = &filename {
            let restored = snapshot::load_from_path(path, max_cache_size_bytes).await;
            inner.restore_entries(restored).await;
        }

        BootMemoryBackend {
            inner,
            filename,
            max_cache_size_bytes,
            disabled: AtomicBool::new(false),
        }
    }

    /// Write the current contents to the snapshot file and disable this
    /// backend for the remainder of the session, mirroring the
    /// top-level cache's `notify_boot_complete` contract (§4.7). A
    /// no-op if no filename was configured or saving is suppressed.
    pub async fn notify_boot_complete(&self, suppress_save: bool) -> std::io::Result<()> {
        if self.disabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(path) = &self.filename else {
            return Ok(());
        };
        if suppress_save {
            return Ok(());
        }
        let entries = self.inner.snapshot_entries().await;
        let bytes = snapshot::encode(&entries);
        tokio::fs::write(path, bytes).await
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for BootMemoryBackend {
    fn is_writable(&self) -> bool {
        !self.is_disabled()
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        if self.is_disabled() {
            return false;
        }
        self.inner.probably_exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        if self.is_disabled() {
            return Ok(None);
        }
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        if self.is_disabled() {
            return Ok(());
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
