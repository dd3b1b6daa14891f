//! The opaque byte payload associated with a cache key.

use bytes::Bytes;

/// An opaque byte buffer stored under a [`crate::CacheKey`].
///
/// Empty payloads are invalid at the core boundary: a put of zero bytes
/// is a contract violation, and a get that would yield zero bytes is
/// defined to be a miss rather than a successful empty result.
pub type Payload = Bytes;

/// A payload is well-formed only if it is non-empty.
pub fn is_valid_payload(payload: &[u8]) -> bool {
    !payload.is_empty()
}
