//! Minimal in-memory [`Backend`] used only by this crate's wrapper unit
//! tests, so each wrapper can be exercised without pulling in the real
//! `ddc-memory` crate (which itself depends on `ddc-backend`).

use async_trait::async_trait;
use ddc_core::{CacheKey, Payload, UsageStatsMap};
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::error::BackendResult;

#[derive(Default)]
pub struct MemoryStub {
    entries: Mutex<std::collections::HashMap<CacheKey, Payload>>,
}

impl MemoryStub {
    pub async fn corrupt_one_bit(&self, key: &CacheKey) {
        let mut entries = self.entries.lock().await;
        if let Some(payload) = entries.get_mut(key) {
            let mut bytes = payload.to_vec();
            if let Some(first) = bytes.first_mut() {
                *first ^= 0x01;
            }
            *payload = Payload::from(bytes);
        }
    }

    pub async fn raw_len(&self, key: &CacheKey) -> Option<usize> {
        self.entries.lock().await.get(key).map(|p| p.len())
    }
}

#[async_trait]
impl Backend for MemoryStub {
    fn is_writable(&self) -> bool {
        true
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, payload: Payload, put_even_if_exists: bool) -> BackendResult<()> {
        let mut entries = self.entries.lock().await;
        if !put_even_if_exists && entries.contains_key(key) {
            return Ok(());
        }
        entries.insert(key.clone(), payload);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey, _transient: bool) -> BackendResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    fn gather_usage_stats(&self, _map: &mut UsageStatsMap, _path: &str) {}
}
