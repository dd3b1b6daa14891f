//! Cache key type.
//!
//! A [`CacheKey`] is an opaque identifier: ASCII alphanumerics, `_` and `$`.
//! Unlike request-derived composite keys, it carries no prefix/version
//! structure of its own — composition (deriver name/version/suffix, rollup
//! batching) happens one layer up, in `ddc`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error returned when a candidate string is not a valid [`CacheKey`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum KeyError {
    /// The key was empty.
    #[error("cache key is empty")]
    Empty,
    /// The key contained a byte outside `[A-Za-z0-9_$]`.
    #[error("cache key {0:?} contains invalid character {1:?}")]
    InvalidCharacter(String, char),
}

fn is_valid_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// An opaque, content-addressed cache key.
///
/// Cheap to clone: the backing string is reference-counted, so passing a
/// key through wrapper after wrapper (async-put, key-length, hierarchical)
/// only bumps a refcount.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Validate and construct a cache key from any string-like input.
    pub fn new(value: impl AsRef<str>) -> Result<Self, KeyError> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(KeyError::Empty);
        }
        if let Some(bad) = value.chars().find(|c| !is_valid_key_char(*c)) {
            return Err(KeyError::InvalidCharacter(value.to_string(), bad));
        }
        Ok(CacheKey(Arc::from(value)))
    }

    /// Construct a key from parts already known to be valid (deriver
    /// composition, wrapper-internal rewrites). Debug-asserts the
    /// invariant rather than paying validation cost on every hot path.
    pub fn new_unchecked(value: impl Into<Arc<str>>) -> Self {
        let value = value.into();
        debug_assert!(!value.is_empty());
        debug_assert!(value.chars().all(is_valid_key_char));
        CacheKey(value)
    }

    /// Borrow the key as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of bytes in the key (all characters are ASCII, so this is
    /// also the character count).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive comparison, normalizing to upper-case the way the
    /// filesystem backend does when hashing a key into a path.
    pub fn eq_ignore_ascii_case(&self, other: &CacheKey) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Upper-cased copy of this key, as used by the filesystem backend to
    /// build hashed directory paths.
    pub fn to_uppercase(&self) -> CacheKey {
        CacheKey::new_unchecked(self.0.to_uppercase())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.0.as_ref()).finish()
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        CacheKey::new(value)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CacheKey::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alnum_underscore_dollar() {
        assert!(CacheKey::new("Shader_0042$lod0").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(CacheKey::new("").unwrap_err(), KeyError::Empty);
    }

    #[test]
    fn rejects_bad_character() {
        let err = CacheKey::new("bad/key").unwrap_err();
        assert!(matches!(err, KeyError::InvalidCharacter(_, '/')));
    }

    #[test]
    fn clone_is_cheap_and_equal() {
        let k1 = CacheKey::new("ABC").unwrap();
        let k2 = k1.clone();
        assert_eq!(k1, k2);
    }

    #[test]
    fn case_insensitive_compare_matches_uppercase_normalization() {
        let k1 = CacheKey::new("AbC").unwrap();
        let k2 = CacheKey::new("ABC").unwrap();
        assert!(k1.eq_ignore_ascii_case(&k2));
        assert_eq!(k1.to_uppercase(), k2);
    }
}
