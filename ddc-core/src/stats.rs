//! Usage-statistics counters gathered from every node in a backend graph.
//!
//! Grounded on the original engine's `FDerivedDataCacheUsageStats`: calls,
//! hits and bytes are tracked per-operation, bucketed into "game thread"
//! (the thread that first touched this node — cheap, uncontended counters)
//! versus "other threads" (every other caller, which must use atomics).
//! Telemetry rollup on top of these counters is out of scope; this module
//! only defines the counter shape and the accumulation contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

/// Calls, hits and cumulative bytes for one operation (get/put/exists) on
/// one thread bucket.
#[derive(Debug, Default)]
pub struct OpStats {
    calls: AtomicU64,
    hits: AtomicU64,
    bytes: AtomicU64,
}

impl OpStats {
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self, bytes: u64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> OpStatsSnapshot {
        OpStatsSnapshot {
            calls: self.calls(),
            hits: self.hits(),
            bytes: self.bytes(),
        }
    }
}

/// Immutable point-in-time copy of [`OpStats`], suitable for logging or
/// serializing into a telemetry event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStatsSnapshot {
    pub calls: u64,
    pub hits: u64,
    pub bytes: u64,
}

/// One operation's stats, split by which thread recorded them. The
/// "game thread" bucket is whichever thread first records against this
/// instance; every other thread accumulates into "other threads". Both
/// buckets use the same atomic counters — the split only matters for
/// reporting, since DDC access from the main thread is the unusual case
/// worth calling out separately.
#[derive(Debug, Default)]
pub struct ThreadBucketStats {
    origin: std::sync::OnceLock<ThreadId>,
    game_thread: OpStats,
    other_threads: OpStats,
}

impl ThreadBucketStats {
    fn bucket_for_current_thread(&self) -> &OpStats {
        let current = std::thread::current().id();
        let origin = *self.origin.get_or_init(|| current);
        if origin == current {
            &self.game_thread
        } else {
            &self.other_threads
        }
    }

    pub fn record_call(&self) {
        self.bucket_for_current_thread().record_call();
    }

    pub fn record_hit(&self, bytes: u64) {
        self.bucket_for_current_thread().record_hit(bytes);
    }

    pub fn game_thread(&self) -> OpStatsSnapshot {
        self.game_thread.snapshot()
    }

    pub fn other_threads(&self) -> OpStatsSnapshot {
        self.other_threads.snapshot()
    }
}

/// Usage stats for one node in a backend graph: `Get`, `Put` and `Exists`
/// each tracked separately, thread-bucketed.
#[derive(Debug, Default)]
pub struct DdcUsageStats {
    pub get: ThreadBucketStats,
    pub put: ThreadBucketStats,
    pub exists: ThreadBucketStats,
}

/// A usage-stats map as produced by `gather_usage_stats`: dotted node
/// paths (`"0"`, `"0.1"`, `"0.1.0"`, ...) to that node's stats, matching
/// the original engine's convention of keying by graph position.
pub type UsageStatsMap = std::collections::BTreeMap<String, DdcUsageStatsSnapshot>;

/// Point-in-time snapshot of [`DdcUsageStats`] for inclusion in a
/// [`UsageStatsMap`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DdcUsageStatsSnapshot {
    pub get_game_thread: OpStatsSnapshot,
    pub get_other_threads: OpStatsSnapshot,
    pub put_game_thread: OpStatsSnapshot,
    pub put_other_threads: OpStatsSnapshot,
    pub exists_game_thread: OpStatsSnapshot,
    pub exists_other_threads: OpStatsSnapshot,
}

impl DdcUsageStats {
    pub fn snapshot(&self) -> DdcUsageStatsSnapshot {
        DdcUsageStatsSnapshot {
            get_game_thread: self.get.game_thread(),
            get_other_threads: self.get.other_threads(),
            put_game_thread: self.put.game_thread(),
            put_other_threads: self.put.other_threads(),
            exists_game_thread: self.exists.game_thread(),
            exists_other_threads: self.exists.other_threads(),
        }
    }
}
