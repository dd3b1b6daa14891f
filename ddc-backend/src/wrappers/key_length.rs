//! [`KeyLengthWrapper`]: rewrites cache keys longer than a configured
//! maximum into a fixed-width hashed form, embedding the original key
//! in the payload as a collision guard.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use ddc_core::{CacheKey, Payload, UsageStatsMap};
use sha1::{Digest, Sha1};
use tracing::warn;

use crate::backend::{Backend, DynBackend};
use crate::error::BackendResult;

/// Default maximum key length accepted without shortening (§4.5).
pub const DEFAULT_MAX_KEY_LENGTH: usize = 120;

/// Legacy key prefix affected by an old embedded-key bug (§9 open
/// question). Preserved literally per the specification.
const LEGACY_BUG_PREFIX: &str = "TEXTURE2D_0002";

/// Shorten `key` to fit within `max_key_length`, returning the new key
/// if shortening was required.
///
/// Mirrors the original engine's `ShortenKey`, but truncates the SHA-1
/// digest to a single byte (two hex characters) rather than embedding
/// all 40, so the rewritten key fits even very small `max_key_length`
/// values without going negative — the only rule consistent with the
/// specification's own literal 16-character worked example.
fn shorten_key(key: &CacheKey, max_key_length: usize) -> Option<String> {
    let original = key.as_str();
    if original.len() <= max_key_length {
        return None;
    }

    let utf16: Vec<u16> = original.encode_utf16().collect();
    let utf16_bytes: Vec<u8> = utf16.iter().flat_map(|c| c.to_le_bytes()).collect();
    let crc_of_payload = crc32fast::hash(&utf16_bytes);

    let mut hasher = Sha1::new();
    hasher.update((original.len() as i32).to_le_bytes());
    hasher.update(crc_of_payload.to_le_bytes());
    hasher.update(&utf16_bytes);
    let digest = hasher.finalize();

    let hash_string = hex::encode_upper([digest[0]]);
    debug_assert_eq!(hash_string.len(), 2);

    let original_part = max_key_length.saturating_sub(hash_string.len() + 2);
    let prefix: String = original.chars().take(original_part).collect();
    let mut shortened = String::with_capacity(max_key_length);
    shortened.push_str(&prefix);
    shortened.push_str("__");
    shortened.push_str(&hash_string);
    Some(shortened)
}

fn embed_key(payload: &[u8], original_key: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + original_key.len() + 1);
    out.extend_from_slice(payload);
    out.extend_from_slice(original_key.as_bytes());
    out.extend_from_slice(&[0]);
    out.freeze()
}

/// Split a payload embedding a null-terminated original key off its
/// tail and compare it against `expected_key`. `None` if the payload is
/// too short to contain the embedded key at all.
fn split_embedded_key(raw: &[u8], expected_key: &str) -> Option<(Bytes, bool)> {
    let key_len = expected_key.len() + 1;
    if raw.len() < key_len {
        return None;
    }
    let split = raw.len() - key_len;
    let (payload, embedded) = (&raw[..split], &raw[split..]);
    let matches = embedded.last() == Some(&0) && &embedded[..expected_key.len()] == expected_key.as_bytes();
    Some((Bytes::copy_from_slice(payload), matches))
}

/// Strip a legacy-bug embedded key from `raw`, if `key` matches the
/// historical prefix and the payload looks like it was written by the
/// buggy code path.
fn strip_legacy_bug_embedded_key(raw: &[u8], key: &str) -> Bytes {
    if !key.starts_with(LEGACY_BUG_PREFIX) {
        return Bytes::copy_from_slice(raw);
    }
    let key_len = key.len() + 1;
    if raw.len() <= key_len {
        return Bytes::copy_from_slice(raw);
    }
    let split = raw.len() - key_len;
    let (payload, embedded) = (&raw[..split], &raw[split..]);
    if embedded.last() == Some(&0) && &embedded[..key.len()] == key.as_bytes() {
        warn!(%key, "key-length wrapper: fixed old embedded-key bug");
        Bytes::copy_from_slice(payload)
    } else {
        Bytes::copy_from_slice(raw)
    }
}

/// Wraps an inner backend, transparently hashing keys longer than
/// `max_key_length` and guarding against hash collisions by embedding
/// the original key in the stored payload.
pub struct KeyLengthWrapper {
    inner: DynBackend,
    max_key_length: usize,
}

impl KeyLengthWrapper {
    pub fn new(inner: DynBackend, max_key_length: usize) -> Self {
        KeyLengthWrapper {
            inner,
            max_key_length: max_key_length.clamp(0, DEFAULT_MAX_KEY_LENGTH),
        }
    }

    fn routed_key(&self, key: &CacheKey) -> (CacheKey, bool) {
        match shorten_key(key, self.max_key_length) {
            Some(short) => (CacheKey::new_unchecked(short), true),
            None => (key.clone(), false),
        }
    }
}

#[async_trait]
impl Backend for KeyLengthWrapper {
    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn backfill_lower_levels(&self) -> bool {
        self.inner.backfill_lower_levels()
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        let (routed, _) = self.routed_key(key);
        self.inner.probably_exists(&routed).await
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        let (routed, shortened) = self.routed_key(key);
        let Some(raw) = self.inner.get(&routed).await? else {
            return Ok(None);
        };

        if !shortened {
            return Ok(Some(strip_legacy_bug_embedded_key(&raw, key.as_str())));
        }

        match split_embedded_key(&raw, key.as_str()) {
            Some((payload, true)) => Ok(Some(payload)),
            _ => {
                warn!(%key, "key-length wrapper: short file or hash collision, deleting");
                self.inner.remove(&routed, false).await?;
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
        let (routed, shortened) = self.routed_key(key);
        if shortened {
            let framed = embed_key(&payload, key.as_str());
            self.inner.put(&routed, framed, put_even_if_exists).await
        } else {
            self.inner.put(&routed, payload, put_even_if_exists).await
        }
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> BackendResult<()> {
        let (routed, _) = self.routed_key(key);
        self.inner.remove(&routed, transient).await
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        self.inner.gather_usage_stats(map, path);
    }
}
