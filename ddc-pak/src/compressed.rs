//! Compressed pak variant (§4.4): wraps any pak backend so payloads are
//! stored zlib-compressed, prefixed with a 4-byte uncompressed-size
//! header so `get` knows how large a buffer to allocate before
//! inflating.

use std::io::{Read, Write};

use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ddc_backend::{Backend, BackendError, BackendResult, DynBackend};
use ddc_core::{CacheKey, Payload, UsageStatsMap};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Decorates a [`crate::WritePak`] or [`crate::ReadPak`] (or any other
/// backend) with transparent zlib compression on the way in and out.
pub struct CompressedPak {
    inner: DynBackend,
}

impl CompressedPak {
    pub fn new(inner: DynBackend) -> Self {
        Self { inner }
    }
}

fn compress(payload: &Payload) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    let compressed = encoder.finish()?;

    let mut out = Vec::with_capacity(4 + compressed.len());
    out.write_u32::<LittleEndian>(payload.len() as u32)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

fn decompress(bytes: &[u8]) -> std::io::Result<Payload> {
    let mut header = &bytes[..4.min(bytes.len())];
    let uncompressed_size = header.read_u32::<LittleEndian>()? as usize;
    let mut decoder = ZlibDecoder::new(&bytes[4..]);
    let mut out = Vec::with_capacity(uncompressed_size);
    decoder.read_to_end(&mut out)?;
    Ok(Payload::from(out))
}

#[async_trait]
impl Backend for CompressedPak {
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
        if raw.len() < 4 {
            return Ok(None);
        }
        decompress(&raw)
            .map(Some)
            .map_err(|err| BackendError::Configuration(format!("corrupt compressed pak entry: {err}")))
    }

    async fn put(&self, key: &CacheKey, payload: Payload, put_even_if_exists: bool) -> BackendResult<()> {
        let packed = compress(&payload)
            .map_err(|err| BackendError::Configuration(format!("compression failed: {err}")))?;
        self.inner.put(key, Payload::from(packed), put_even_if_exists).await
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        self.inner.remove(key, transient).await
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        self.inner.gather_usage_stats(map, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::WritePak;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_compressed_payload() {
        let dir = tempdir().unwrap();
        let inner: DynBackend = Arc::new(WritePak::create(dir.path().join("a.pak")).unwrap());
        let compressed = CompressedPak::new(inner);

        let payload = Payload::from_static(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        compressed.put(&key("A"), payload.clone(), false).await.unwrap();
        let got = compressed.get(&key("A")).await.unwrap().unwrap();
        assert_eq!(got, payload);
    }
}
