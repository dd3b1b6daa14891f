//! [`HierarchicalWrapper`]: fans a single logical backend out across an
//! ordered chain of tiers (fastest first), backfilling hits upward and
//! downward.

use std::sync::Arc;

use async_trait::async_trait;
use ddc_core::{CacheKey, Payload, UsageStatsMap};
use tokio::sync::RwLock;
use tracing::warn;

use crate::backend::{Backend, DynBackend};
use crate::error::BackendResult;
use crate::wrappers::async_put::{AsyncPutWrapper, InFlightCounter};

/// One tier of a [`HierarchicalWrapper`]: the tier's own backend plus a
/// private async-put wrapper used only for backfill writes, so a
/// backfill can never block the foreground `get` that triggered it.
/// `label` identifies tiers mounted at runtime (`MountPak`/`UnmountPak`)
/// so they can be found again without downcasting the trait object.
struct Tier {
    backend: DynBackend,
    backfill: AsyncPutWrapper,
    label: Option<String>,
}

impl Tier {
    fn new(backend: DynBackend) -> Self {
        Tier {
            backfill: AsyncPutWrapper::new(backend.clone(), InFlightCounter::new(), true),
            backend,
            label: None,
        }
    }
}

/// Coordinates an ordered chain of backend tiers, fastest first.
///
/// Each child is wrapped in its own per-child [`AsyncPutWrapper`]
/// (independent of any top-level async-put wrapper further up the
/// graph) so backfill writes triggered by a hit never block the
/// foreground caller. Tiers are held behind a lock so `MountPak` and
/// `UnmountPak` can append/remove a tier while the graph is live.
pub struct HierarchicalWrapper {
    tiers: RwLock<Vec<Tier>>,
}

impl HierarchicalWrapper {
    pub fn new(children: Vec<DynBackend>) -> Self {
        let tiers = children.into_iter().map(Tier::new).collect();
        HierarchicalWrapper { tiers: RwLock::new(tiers) }
    }

    /// Append a new tier at the bottom of the chain, identified by
    /// `label` (typically the mounted pak's path) for later removal.
    pub async fn mount_tier(&self, backend: DynBackend, label: String) {
        let mut tier = Tier::new(backend);
        tier.label = Some(label);
        self.tiers.write().await.push(tier);
    }

    /// Remove and return the tier previously mounted under `label`.
    pub async fn unmount_tier(&self, label: &str) -> Option<DynBackend> {
        let mut tiers = self.tiers.write().await;
        let index = tiers.iter().position(|t| t.label.as_deref() == Some(label))?;
        Some(tiers.remove(index).backend)
    }
}

#[async_trait]
impl Backend for HierarchicalWrapper {
    fn is_writable(&self) -> bool {
        // try_read rather than blocking_read: this is a sync trait method
        // that may be called from async code, and a mount/unmount is a
        // brief, infrequent operation, so optimistically report writable
        // on the rare contended call rather than risk blocking the
        // executor.
        self.tiers
            .try_read()
            .map(|tiers| tiers.iter().any(|t| t.backend.is_writable()))
            .unwrap_or(true)
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        for tier in self.tiers.read().await.iter() {
            if tier.backend.probably_exists(key).await {
                return true;
            }
        }
        false
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        let tiers = self.tiers.read().await;
        let mut hit_index = None;
        let mut hit_payload = None;

        for (index, tier) in tiers.iter().enumerate() {
            if !tier.backend.probably_exists(key).await {
                continue;
            }
            if let Some(payload) = tier.backend.get(key).await? {
                hit_index = Some(index);
                hit_payload = Some(payload);
                break;
            }
        }

        let (Some(hit_index), Some(payload)) = (hit_index, hit_payload) else {
            return Ok(None);
        };

        if tiers.iter().any(|t| t.backend.is_writable()) {
            backfill_upward(&tiers, hit_index, key, &payload).await;
            backfill_downward(&tiers, hit_index, key, &payload).await;
        }

        Ok(Some(payload))
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        let tiers = self.tiers.read().await;
        let mut wrote_synchronously = false;
        for tier in tiers.iter() {
            if !tier.backend.is_writable() {
                if !tier.backend.backfill_lower_levels() && tier.backend.probably_exists(key).await {
                    // Read-pak authority: stop fanning the put out further.
                    break;
                }
                continue;
            }

            if !wrote_synchronously {
                tier.backend
                    .put(key, payload.clone(), put_even_if_exists)
                    .await?;
                wrote_synchronously = true;
            } else {
                tier.backfill.put(key, payload.clone(), put_even_if_exists).await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        for tier in self.tiers.read().await.iter() {
            if let Err(err) = tier.backend.remove(key, transient).await {
                warn!(%key, error = %err, "hierarchical: child remove failed, continuing broadcast");
            }
        }
        Ok(())
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        let Ok(tiers) = self.tiers.try_read() else {
            return;
        };
        for (index, tier) in tiers.iter().enumerate() {
            tier.backend
                .gather_usage_stats(map, &format!("{path}.{index}"));
        }
    }
}

async fn backfill_upward(tiers: &[Tier], hit_index: usize, key: &CacheKey, payload: &Payload) {
    for tier in &tiers[..hit_index] {
        if !tier.backend.is_writable() {
            continue;
        }
        if !tier.backend.backfill_lower_levels() {
            continue;
        }
        if tier.backend.probably_exists(key).await {
            let _ = tier.backend.remove(key, false).await;
            let _ = tier.backfill.put(key, payload.clone(), true).await;
        } else {
            let _ = tier.backfill.put(key, payload.clone(), false).await;
        }
    }
}

async fn backfill_downward(tiers: &[Tier], hit_index: usize, key: &CacheKey, payload: &Payload) {
    let hit_tier = &tiers[hit_index];
    if !hit_tier.backend.backfill_lower_levels() {
        return;
    }
    for tier in &tiers[hit_index + 1..] {
        if !tier.backend.backfill_lower_levels() && tier.backend.probably_exists(key).await {
            break;
        }
        if tier.backend.is_writable() {
            let _ = tier.backfill.put(key, payload.clone(), false).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStub;
    use bytes::Bytes;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn miss_on_fast_tier_hit_on_slow_tier_backfills_fast_tier() {
        let fast: DynBackend = Arc::new(MemoryStub::default());
        let slow: DynBackend = Arc::new(MemoryStub::default());
        slow.put(&key("K"), Bytes::from_static(&[0x42; 1024]), true)
            .await
            .unwrap();

        let hier = HierarchicalWrapper::new(vec![fast.clone(), slow]);
        let got = hier.get(&key("K")).await.unwrap();
        assert_eq!(got.as_deref(), Some(&[0x42; 1024][..]));

        hier.tiers.read().await[0].backfill.in_flight_counter().wait_for_zero().await;
        assert_eq!(
            fast.get(&key("K")).await.unwrap().as_deref(),
            Some(&[0x42; 1024][..])
        );
    }

    #[tokio::test]
    async fn read_only_lower_tier_stops_fan_out() {
        struct ReadOnlyStub(MemoryStub);

        #[async_trait]
        impl Backend for ReadOnlyStub {
            fn is_writable(&self) -> bool {
                false
            }
            fn backfill_lower_levels(&self) -> bool {
                false
            }
            async fn probably_exists(&self, key: &CacheKey) -> bool {
                self.0.probably_exists(key).await
            }
            async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
                self.0.get(key).await
            }
            async fn put(&self, _: &CacheKey, _: Payload, _: bool) -> BackendResult<()> {
                Ok(())
            }
            async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
                self.0.remove(key, transient).await
            }
            fn gather_usage_stats(&self, _: &mut UsageStatsMap, _: &str) {}
        }

        let pak = Arc::new(ReadOnlyStub(MemoryStub::default()));
        pak.0
            .put(&key("K"), Bytes::from_static(&[7]), true)
            .await
            .unwrap();
        let memory: DynBackend = Arc::new(MemoryStub::default());

        // Pak sits above memory in the chain and already holds the key, so
        // per invariant 10 no writable tier below it may receive the put.
        let hier = HierarchicalWrapper::new(vec![pak, memory.clone()]);
        hier.put(&key("K"), Bytes::from_static(&[8]), true).await.unwrap();

        assert!(!memory.probably_exists(&key("K")).await);
    }

    #[tokio::test]
    async fn mounted_tier_is_visible_and_unmount_removes_it() {
        let memory: DynBackend = Arc::new(MemoryStub::default());
        let hier = HierarchicalWrapper::new(vec![memory]);

        let mounted: DynBackend = Arc::new(MemoryStub::default());
        mounted.put(&key("K"), Bytes::from_static(&[1]), true).await.unwrap();
        hier.mount_tier(mounted, "pak-a".to_string()).await;

        assert!(hier.probably_exists(&key("K")).await);
        let removed = hier.unmount_tier("pak-a").await;
        assert!(removed.is_some());
        assert!(!hier.probably_exists(&key("K")).await);
    }

    #[tokio::test]
    async fn remove_broadcasts_past_a_tier_whose_remove_errors() {
        struct AlwaysErrorsOnRemove(MemoryStub);

        #[async_trait]
        impl Backend for AlwaysErrorsOnRemove {
            fn is_writable(&self) -> bool {
                false
            }
            async fn probably_exists(&self, key: &CacheKey) -> bool {
                self.0.probably_exists(key).await
            }
            async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
                self.0.get(key).await
            }
            async fn put(&self, _: &CacheKey, _: Payload, _: bool) -> BackendResult<()> {
                Ok(())
            }
            async fn remove(&self, _: &CacheKey, _: bool) -> BackendResult<()> {
                Err(crate::error::BackendError::NotWritable("read-pak".into()))
            }
            fn gather_usage_stats(&self, _: &mut UsageStatsMap, _: &str) {}
        }

        let pak = Arc::new(AlwaysErrorsOnRemove(MemoryStub::default()));
        let memory: DynBackend = Arc::new(MemoryStub::default());
        memory.put(&key("K"), Bytes::from_static(&[1]), true).await.unwrap();

        let hier = HierarchicalWrapper::new(vec![pak, memory.clone()]);
        hier.remove(&key("K"), false).await.unwrap();

        assert!(!memory.probably_exists(&key("K")).await);
    }
}
