//! Rollup batching (§4.6): many async gets collapsed under one synthetic
//! key, falling back to independent per-item gets (with the caller's
//! original handles preserved) when the bundle is missing or corrupt.

use std::sync::Arc;
use std::sync::Mutex;

use ddc_backend::DynBackend;
use ddc_core::{CacheKey, Payload, RequestHandle};
use tracing::debug;

use crate::bundle;
use crate::handle_table::HandleTable;

struct Member {
    key: CacheKey,
    slot: crate::handle_table::ResultSlot,
}

/// A batch of pending gets sharing one synthetic key. Construct with
/// [`Rollup::new`], register members with [`Rollup::add_member`], then
/// call [`Rollup::close`] once; every member's handle then behaves like
/// an ordinary async-get handle on the owning cache's handle table.
pub struct Rollup {
    root: DynBackend,
    handles: Arc<HandleTable>,
    members: Mutex<Vec<Member>>,
}

impl Rollup {
    pub fn new(root: DynBackend, handles: Arc<HandleTable>) -> Self {
        Rollup { root, handles, members: Mutex::new(Vec::new()) }
    }

    /// Register one member and return the handle the caller will later
    /// poll/wait/get exactly like any other async get.
    pub fn add_member(&self, key: CacheKey) -> RequestHandle {
        let (handle, slot) = self.handles.reserve();
        self.members.lock().unwrap().push(Member { key, slot });
        handle
    }

    /// Close the rollup: no further members may be added after this.
    /// Spawns the outer get and, if needed, the per-item fallback; every
    /// member's previously issued handle resolves once its payload (or
    /// miss) is known.
    pub async fn close(self: Arc<Self>) {
        let members = std::mem::take(&mut *self.members.lock().unwrap());
        if members.is_empty() {
            return;
        }

        let mut rollup_key_str = String::from("ROLLUP_");
        for member in &members {
            rollup_key_str.push_str(member.key.as_str());
        }
        let rollup_key = CacheKey::new_unchecked(rollup_key_str);

        let root = self.root.clone();
        tokio::spawn(async move {
            run_rollup(root, rollup_key, members).await;
        });
    }
}

async fn run_rollup(root: DynBackend, rollup_key: CacheKey, members: Vec<Member>) {
    let keys: Vec<CacheKey> = members.iter().map(|m| m.key.clone()).collect();

    let outer = root.get(&rollup_key).await;
    if let Ok(Some(payload)) = &outer {
        if let Some(payloads) = bundle::decode(payload, &keys) {
            debug!(%rollup_key, members = members.len(), "rollup: outer get succeeded");
            for (member, payload) in members.into_iter().zip(payloads) {
                let _ = member.slot.set(Some(payload));
            }
            return;
        }
    }

    // Failure path: corruption, a mismatched bundle, or a plain miss.
    // `force_put_for_corruption` only applies when something was there
    // and failed to parse; a clean miss does not force an overwrite.
    let force_put_for_corruption = matches!(outer, Ok(Some(_)));
    debug!(%rollup_key, force_put_for_corruption, "rollup: falling back to per-item gets");

    let fetches = members.into_iter().map(|member| {
        let root = root.clone();
        async move {
            let payload = root.get(&member.key).await.ok().flatten();
            let _ = member.slot.set(payload.clone());
            (member.key, payload)
        }
    });
    let results = futures::future::join_all(fetches).await;

    if results.iter().any(|(_, payload)| payload.is_none()) {
        debug!(%rollup_key, "rollup: at least one member missing, synthetic bundle not written");
        return;
    }

    let bundle_members: Vec<(CacheKey, Payload)> = results
        .into_iter()
        .map(|(key, payload)| (key, payload.expect("checked above")))
        .collect();
    let bytes = Payload::from(bundle::encode(&bundle_members));
    let _ = root.put(&rollup_key, bytes, force_put_for_corruption).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_backend::Backend;
    use ddc_memory::MemoryBackend;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn all_present_members_yield_their_payloads_via_outer_bundle() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        root.put(&key("K1"), bytes::Bytes::from_static(&[1]), true).await.unwrap();
        root.put(&key("K2"), bytes::Bytes::from_static(&[2]), true).await.unwrap();

        let handles = Arc::new(HandleTable::new());
        let rollup = Arc::new(Rollup::new(root.clone(), handles.clone()));
        let h1 = rollup.add_member(key("K1"));
        let h2 = rollup.add_member(key("K2"));
        rollup.clone().close().await;

        handles.wait(h1).await;
        handles.wait(h2).await;
        assert_eq!(handles.get_async_result(h1).await.as_deref(), Some(&[1][..]));
        assert_eq!(handles.get_async_result(h2).await.as_deref(), Some(&[2][..]));
    }

    #[tokio::test]
    async fn mixed_hits_and_misses_resolve_independently_and_skip_the_synthetic_put() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        root.put(&key("M1"), bytes::Bytes::from_static(&[1]), true).await.unwrap();
        root.put(&key("M3"), bytes::Bytes::from_static(&[3]), true).await.unwrap();

        let handles = Arc::new(HandleTable::new());
        let rollup = Arc::new(Rollup::new(root.clone(), handles.clone()));
        let h1 = rollup.add_member(key("M1"));
        let h2 = rollup.add_member(key("M2"));
        let h3 = rollup.add_member(key("M3"));
        rollup.clone().close().await;

        handles.wait(h1).await;
        handles.wait(h2).await;
        handles.wait(h3).await;
        assert_eq!(handles.get_async_result(h1).await.as_deref(), Some(&[1][..]));
        assert_eq!(handles.get_async_result(h2).await, None);
        assert_eq!(handles.get_async_result(h3).await.as_deref(), Some(&[3][..]));

        let rollup_key = key("ROLLUP_M1M2M3");
        assert!(!root.probably_exists(&rollup_key).await);
    }

    #[tokio::test]
    async fn closing_an_empty_rollup_is_a_no_op() {
        let root: DynBackend = Arc::new(MemoryBackend::new(None));
        let handles = Arc::new(HandleTable::new());
        let rollup = Arc::new(Rollup::new(root, handles));
        rollup.close().await;
    }
}
