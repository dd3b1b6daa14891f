//! The top-level cache (§4.7): wires a backend graph's root to a handle
//! table and dispatches deriver-driven builds, either synchronously on
//! the calling thread or on the runtime's worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use ddc_backend::{DynBackend, InFlightCounter};
use ddc_core::{CacheKey, Deriver, Payload, RequestHandle, deriver_cache_key};
use ddc_pak::{ReadPak, WritePak, merge_cache, sort_and_copy};
use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::handle_table::HandleTable;
use crate::rollup::Rollup;

/// A boxed callback invoked on `notify_boot_complete`. Kept behind a
/// plain closure rather than a dependency on `ddc-memory`'s concrete
/// `BootMemoryBackend` type, so the orchestrator stays decoupled from
/// which backend crates the graph happens to be built from.
pub type BootNotifyFn = dyn Fn(bool) -> futures::future::BoxFuture<'static, ()> + Send + Sync;

/// The derived data cache's public entry point. Holds the backend
/// graph's root, a handle table shared with every in-flight async get
/// and rollup, and (optionally) the pak lifecycle state needed at
/// shutdown.
pub struct Cache {
    root: DynBackend,
    handles: Arc<HandleTable>,
    counter: Arc<InFlightCounter>,
    verify_ddc: bool,
    boot_notify: Option<Arc<BootNotifyFn>>,
    write_pak: Option<Arc<WritePak>>,
    read_paks: Vec<Arc<ReadPak>>,
    merge_paks_on_shutdown: Vec<PathBuf>,
}

impl Cache {
    /// `root` is the fully wrapped graph root (`AsyncPut(KeyLength(..))`
    /// at minimum); `counter` is the same async-completion counter that
    /// root's outermost `AsyncPutWrapper` was constructed with, so
    /// `wait_for_quiescence` observes the whole graph's in-flight work.
    pub fn new(root: DynBackend, counter: Arc<InFlightCounter>) -> Self {
        Cache {
            root,
            handles: Arc::new(HandleTable::new()),
            counter,
            verify_ddc: false,
            boot_notify: None,
            write_pak: None,
            read_paks: Vec::new(),
            merge_paks_on_shutdown: Vec::new(),
        }
    }

    pub fn with_verify_ddc(mut self, verify_ddc: bool) -> Self {
        self.verify_ddc = verify_ddc;
        self
    }

    pub fn with_boot_notify(mut self, notify: Arc<BootNotifyFn>) -> Self {
        self.boot_notify = Some(notify);
        self
    }

    /// Registers the write-pak and read-paks a graph was built with, so
    /// `wait_for_quiescence(shutdown=true)` can close and sort them.
    pub fn with_pak_lifecycle(mut self, write_pak: Option<Arc<WritePak>>, read_paks: Vec<Arc<ReadPak>>) -> Self {
        self.write_pak = write_pak;
        self.read_paks = read_paks;
        self
    }

    /// Additional paks to merge into the write-pak at shutdown, before
    /// it is closed and sorted.
    pub fn with_merge_paks_on_shutdown(mut self, paths: Vec<PathBuf>) -> Self {
        self.merge_paks_on_shutdown = paths;
        self
    }

    /// Begin a new rollup batch against this cache's root and handle
    /// table (§4.6).
    pub fn rollup(&self) -> Arc<Rollup> {
        Arc::new(Rollup::new(self.root.clone(), self.handles.clone()))
    }

    /// Usage stats for the whole graph, keyed by dotted node path, for
    /// an administrative stats dump.
    pub fn gather_usage_stats(&self) -> ddc_core::UsageStatsMap {
        let mut map = ddc_core::UsageStatsMap::new();
        self.root.gather_usage_stats(&mut map, "0");
        map
    }

    /// Build cache key, then run the build task synchronously on the
    /// calling thread.
    pub async fn get_sync(&self, deriver: &dyn Deriver) -> Option<Payload> {
        let key = deriver_cache_key(deriver).ok()?;
        run_build_task(&self.root, &key, Some(deriver), self.verify_ddc).await
    }

    /// Allocate a handle and run the build task on the runtime's worker
    /// pool, unless the deriver declares itself not build-thread-safe,
    /// in which case it still runs inline but through the same
    /// handle-table bookkeeping as any other async get.
    pub async fn get_async(&self, deriver: Arc<dyn Deriver>) -> RequestHandle {
        let Ok(key) = deriver_cache_key(deriver.as_ref()) else {
            return self.handles.dispatch_inline(async { None }).await;
        };
        let verify_ddc = self.verify_ddc;
        if !deriver.is_build_thread_safe() {
            let root = self.root.clone();
            return self
                .handles
                .dispatch_inline(async move { run_build_task(&root, &key, Some(deriver.as_ref()), verify_ddc).await })
                .await;
        }
        let root = self.root.clone();
        self.handles
            .dispatch(async move { run_build_task(&root, &key, Some(deriver.as_ref()), verify_ddc).await })
    }

    pub fn poll(&self, handle: RequestHandle) -> bool {
        self.handles.poll(handle)
    }

    pub async fn wait(&self, handle: RequestHandle) {
        self.handles.wait(handle).await;
    }

    pub async fn get_async_result(&self, handle: RequestHandle) -> Option<Payload> {
        self.handles.get_async_result(handle).await
    }

    /// Same as `get_sync`, but with no deriver: a miss simply yields
    /// empty rather than triggering a build.
    pub async fn get_sync_by_key(&self, key: &CacheKey) -> Option<Payload> {
        run_build_task(&self.root, key, None, false).await
    }

    pub fn get_async_by_key(&self, key: CacheKey) -> RequestHandle {
        let root = self.root.clone();
        self.handles
            .dispatch(async move { run_build_task(&root, &key, None, false).await })
    }

    pub async fn put(&self, key: &CacheKey, payload: Payload, force: bool) -> CacheResult<()> {
        crate::metrics::record_put();
        self.root.put(key, payload, force).await.map_err(CacheError::from)
    }

    pub async fn mark_transient(&self, key: &CacheKey) -> CacheResult<()> {
        self.root.remove(key, true).await.map_err(CacheError::from)
    }

    pub async fn exists(&self, key: &CacheKey) -> bool {
        self.root.probably_exists(key).await
    }

    /// The Boot-mode memory cache, if present, writes its snapshot
    /// (unless suppressed) and disables itself for the rest of the
    /// session.
    pub async fn notify_boot_complete(&self, suppress_save: bool) {
        if let Some(notify) = &self.boot_notify {
            notify(suppress_save).await;
        }
    }

    /// Block until every in-flight async-put has completed or been
    /// abandoned. When `shutdown` is true and a write-pak is
    /// configured, also merges any requested extra paks, drops the
    /// read-paks, closes the write-pak and runs `SortAndCopy` to
    /// produce the final, sorted pak in its place.
    pub async fn wait_for_quiescence(&self, shutdown: bool) {
        self.counter.wait_for_zero().await;

        if !shutdown {
            return;
        }
        let Some(write_pak) = &self.write_pak else {
            return;
        };

        for path in &self.merge_paks_on_shutdown {
            match ReadPak::open(path) {
                Ok(extra) => {
                    if let Err(err) = merge_cache(write_pak, &extra).await {
                        warn!(?path, error = %err, "shutdown: failed to merge additional pak");
                    }
                }
                Err(err) => warn!(?path, error = %err, "shutdown: failed to open additional pak for merge"),
            }
        }

        // Read-paks have no explicit close step of their own; their
        // file handles are released whenever this cache (and the
        // `Arc<ReadPak>`s the builder handed it) is dropped.
        let _ = &self.read_paks;

        if let Err(err) = write_pak.close().await {
            warn!(error = %err, "shutdown: failed to close write-pak");
            return;
        }

        let original = write_pak.path().to_path_buf();
        let sorted = original.with_extension("pak.sorted");
        match sort_and_copy(&original, &sorted).await {
            Ok(entries) => {
                if let Err(err) = tokio::fs::remove_file(&original).await {
                    warn!(?original, error = %err, "shutdown: failed to delete temporary write-pak");
                }
                if let Err(err) = tokio::fs::rename(&sorted, &original).await {
                    warn!(?sorted, error = %err, "shutdown: failed to install sorted pak");
                }
                tracing::debug!(entries, path = ?original, "shutdown: wrote final sorted pak");
            }
            Err(err) => warn!(error = %err, "shutdown: sort-and-copy failed"),
        }
    }
}

async fn run_build_task(
    root: &DynBackend,
    key: &CacheKey,
    deriver: Option<&dyn Deriver>,
    verify_ddc: bool,
) -> Option<Payload> {
    match root.get(key).await {
        Ok(Some(payload)) => {
            crate::metrics::record_build_result(true);
            if verify_ddc {
                if let Some(deriver) = deriver {
                    if deriver.is_deterministic() {
                        let mut scratch = Vec::new();
                        if deriver.build(&mut scratch) && scratch != payload.as_ref() {
                            warn!(%key, "verify_ddc: rebuilt bytes do not match the cached payload");
                        }
                    }
                }
            }
            Some(payload)
        }
        _ => {
            crate::metrics::record_build_result(false);
            let deriver = deriver?;
            let mut built = Vec::new();
            if !deriver.build(&mut built) || built.is_empty() {
                return None;
            }
            let payload = Payload::from(built);
            let _ = root.put(key, payload.clone(), true).await;
            Some(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_memory::MemoryBackend;

    struct Fixed(&'static [u8]);

    impl Deriver for Fixed {
        fn name(&self) -> &str {
            "T"
        }
        fn version(&self) -> &str {
            "1"
        }
        fn key_suffix(&self) -> &str {
            "x"
        }
        fn build(&self, out: &mut Vec<u8>) -> bool {
            out.extend_from_slice(self.0);
            true
        }
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn sync_miss_then_hit() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        let cache = Cache::new(root, InFlightCounter::new());
        let deriver = Fixed(&[1, 2, 3]);

        let first = cache.get_sync(&deriver).await;
        assert_eq!(first.as_deref(), Some(&[1, 2, 3][..]));

        let second = cache.get_sync(&deriver).await;
        assert_eq!(second.as_deref(), Some(&[1, 2, 3][..]));
    }

    #[tokio::test]
    async fn async_build_lands_through_the_handle_table() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        let counter = InFlightCounter::new();
        let cache = Cache::new(root, counter);
        let handle = cache.get_async(Arc::new(Fixed(&[9, 9]))).await;

        cache.wait(handle).await;
        assert_eq!(cache.get_async_result(handle).await.as_deref(), Some(&[9, 9][..]));
    }

    #[tokio::test]
    async fn put_then_exists_and_mark_transient() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        let cache = Cache::new(root, InFlightCounter::new());

        cache.put(&key("K"), Payload::from_static(b"v"), true).await.unwrap();
        assert!(cache.exists(&key("K")).await);

        cache.mark_transient(&key("K")).await.unwrap();
        assert!(!cache.exists(&key("K")).await);
    }

    #[tokio::test]
    async fn by_key_miss_with_no_deriver_yields_none() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        let cache = Cache::new(root, InFlightCounter::new());
        assert_eq!(cache.get_sync_by_key(&key("MISSING")).await, None);
    }
}
