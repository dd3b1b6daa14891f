//! [`CorruptionWrapper`]: appends a checksummed trailer to every payload
//! on the way in, and verifies it on the way out.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use ddc_core::{CacheKey, Payload, UsageStatsMap};
use tracing::warn;

use crate::backend::{Backend, DynBackend};
use crate::error::BackendResult;

const TRAILER_MAGIC: u32 = 0x1e87_3d89;
const TRAILER_VERSION: u32 = 1;
const TRAILER_LEN: usize = 16;

fn append_trailer(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + TRAILER_LEN);
    out.put_slice(payload);
    out.put_u32_le(TRAILER_MAGIC);
    out.put_u32_le(TRAILER_VERSION);
    out.put_u32_le(crc32fast::hash(payload));
    out.put_u32_le(payload.len() as u32);
    out.freeze()
}

/// Strip and verify the trailer. `Ok(Some(payload))` on success,
/// `Ok(None)` if the trailer is malformed or the checksum/size mismatch.
fn strip_trailer(raw: &[u8]) -> Option<Bytes> {
    if raw.len() < TRAILER_LEN {
        return None;
    }
    let split = raw.len() - TRAILER_LEN;
    let (payload, mut trailer) = (&raw[..split], &raw[split..]);
    let magic = trailer.get_u32_le();
    let version = trailer.get_u32_le();
    let stored_crc = trailer.get_u32_le();
    let stored_size = trailer.get_u32_le();
    if magic != TRAILER_MAGIC || version != TRAILER_VERSION {
        return None;
    }
    if stored_size as usize != payload.len() {
        return None;
    }
    if crc32fast::hash(payload) != stored_crc {
        return None;
    }
    Some(Bytes::copy_from_slice(payload))
}

/// Wraps an inner backend, appending a 16-byte checksummed trailer to
/// every stored payload and verifying it on read. A corrupt entry is
/// actively deleted from the inner backend and reported as a miss.
pub struct CorruptionWrapper {
    inner: DynBackend,
}

impl CorruptionWrapper {
    pub fn new(inner: DynBackend) -> Self {
        CorruptionWrapper { inner }
    }
}

#[async_trait]
impl Backend for CorruptionWrapper {
    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn backfill_lower_levels(&self) -> bool {
        self.inner.backfill_lower_levels()
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.inner.probably_exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        let Some(raw) = self.inner.get(key).await? else {
            return Ok(None);
        };
        match strip_trailer(&raw) {
            Some(payload) => Ok(Some(payload)),
            None => {
                warn!(key = %key, "corruption detected, deleting inner entry");
                self.inner.remove(key, false).await?;
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        let framed = append_trailer(&payload);
        self.inner.put(key, framed, put_even_if_exists).await
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        self.inner.remove(key, transient).await
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        self.inner.gather_usage_stats(map, path);
    }
}
