//! The [`Deriver`] contract: a capability supplied by a client that can
//! (re)build a payload for a cache key the cache does not currently hold.
//!
//! Deriver plugins themselves are out of scope for this crate (§1 of the
//! specification treats them as an external collaborator); this module
//! only defines the interface the cache engine calls into.

use crate::key::{CacheKey, KeyError};

/// A capability object that can build the payload for a given cache key.
///
/// `name`, `version` and `key_suffix` together compose the full cache key
/// (`name || version || key_suffix`); `name` and `version` must be stable
/// across runs for equivalent computations, `key_suffix` encodes the
/// specific inputs to this particular build.
pub trait Deriver: Send + Sync {
    /// Stable identifier for this deriver (e.g. `"ShaderCompiler"`).
    fn name(&self) -> &str;

    /// Stable version string; bump to invalidate every key this deriver
    /// has ever produced.
    fn version(&self) -> &str;

    /// Encodes the specific inputs of this build (asset id, platform,
    /// quality level, ...).
    fn key_suffix(&self) -> &str;

    /// Whether rebuilding with the same inputs always produces
    /// byte-identical output. Consulted by `verify_ddc` mode.
    fn is_deterministic(&self) -> bool {
        true
    }

    /// Whether [`Deriver::build`] may be invoked on a background worker
    /// thread. When false, the cache runs the build synchronously even
    /// from its async entry points.
    fn is_build_thread_safe(&self) -> bool {
        true
    }

    /// Build the payload into `out`. Returns `true` on success; `false`
    /// signals build failure, in which case the cache discards whatever
    /// was written to `out` and returns an empty payload to its caller.
    fn build(&self, out: &mut Vec<u8>) -> bool;
}

/// Compose the full cache key for a deriver: `name || version || key_suffix`.
pub fn deriver_cache_key(deriver: &dyn Deriver) -> Result<CacheKey, KeyError> {
    let mut composed = String::with_capacity(
        deriver.name().len() + deriver.version().len() + deriver.key_suffix().len(),
    );
    composed.push_str(deriver.name());
    composed.push_str(deriver.version());
    composed.push_str(deriver.key_suffix());
    CacheKey::new(composed)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn composes_name_version_suffix() {
        let d = Fixed(&[1, 2, 3]);
        let key = deriver_cache_key(&d).unwrap();
        assert_eq!(key.as_str(), "T1x");
    }
}
