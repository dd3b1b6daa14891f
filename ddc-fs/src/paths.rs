//! Hashed path layout (§4.3): `<root>/<h100>/<h10>/<h1>/<KEY>.udd`.

use std::path::{Path, PathBuf};

use ddc_core::CacheKey;

/// Build the three-digit, three-level directory hash used to spread
/// entries across subdirectories so no single directory holds every
/// cached file.
fn hash_digits(uppercased_key: &CacheKey) -> (char, char, char) {
    let hash = crc32fast::hash(uppercased_key.as_str().as_bytes()) % 1000;
    let digits = format!("{hash:03}");
    let mut chars = digits.chars();
    (
        chars.next().unwrap(),
        chars.next().unwrap(),
        chars.next().unwrap(),
    )
}

/// Full on-disk path for `key` under `root`.
pub fn entry_path(root: &Path, key: &CacheKey) -> PathBuf {
    let upper = key.to_uppercase();
    let (h100, h10, h1) = hash_digits(&upper);
    root.join(h100.to_string())
        .join(h10.to_string())
        .join(h1.to_string())
        .join(format!("{upper}.udd"))
}

/// Conservative ceiling on `root`'s absolute path length so that
/// `root + 3 hashed subdirectories + uppercased key + ".udd"` fits
/// common platform path limits, per §4.3's initialization contract.
pub fn max_root_path_len(max_key_length: usize) -> usize {
    // "/h/h/h/" (7) + key + ".udd" (4), leaving headroom under a 260
    // character conservative ceiling shared across platforms.
    260usize.saturating_sub(7 + max_key_length + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[test]
    fn path_has_three_hashed_directories_and_uppercased_key() {
        let path = entry_path(Path::new("/root"), &key("AbC"));
        let components: Vec<_> = path.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
        assert_eq!(components.len(), 6); // "/", root, h100, h10, h1, ABC.udd
        assert_eq!(components.last().unwrap(), "ABC.udd");
    }

    #[test]
    fn hashing_is_deterministic() {
        let a = entry_path(Path::new("/root"), &key("SAME"));
        let b = entry_path(Path::new("/root"), &key("same"));
        assert_eq!(a, b);
    }
}
