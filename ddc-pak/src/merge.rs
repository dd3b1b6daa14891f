//! MergeCache (§4.4): copy every entry from a read-pak into a
//! still-open write-pak, skipping keys the destination already holds.
//! Entries are moved as raw bytes read straight off each pak's index,
//! never through a compression wrapper, so merging never transcodes.

use ddc_backend::{Backend, BackendResult};
use tracing::debug;

use crate::read::ReadPak;
use crate::write::WritePak;

/// Copy entries present in `source` but absent from `destination`.
/// Returns the number of entries actually copied.
pub async fn merge_cache(destination: &WritePak, source: &ReadPak) -> BackendResult<usize> {
    let mut copied = 0usize;
    let keys: Vec<_> = source.keys().cloned().collect();
    for key in keys {
        if destination.probably_exists(&key).await {
            continue;
        }
        let Some(payload) = source.get(&key).await? else {
            continue;
        };
        destination.put(&key, payload, false).await?;
        copied += 1;
    }
    debug!(source = ?source.path(), destination = ?destination.path(), copied, "merge-cache: done");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_backend::Backend;
    use ddc_core::{CacheKey, Payload};
    use tempfile::tempdir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn copies_missing_keys_and_skips_existing_ones() {
        let dir = tempdir().unwrap();

        let source_writer = WritePak::create(dir.path().join("source.pak")).unwrap();
        source_writer.put(&key("A"), Payload::from_static(b"from-source"), false).await.unwrap();
        source_writer.put(&key("B"), Payload::from_static(b"also-from-source"), false).await.unwrap();
        source_writer.close().await.unwrap();
        let source = ReadPak::open(dir.path().join("source.pak")).unwrap();

        let destination = WritePak::create(dir.path().join("dest.pak")).unwrap();
        destination.put(&key("A"), Payload::from_static(b"already-here"), false).await.unwrap();

        let copied = merge_cache(&destination, &source).await.unwrap();
        assert_eq!(copied, 1);
        assert_eq!(
            destination.get(&key("A")).await.unwrap().unwrap(),
            Payload::from_static(b"already-here")
        );
        assert_eq!(
            destination.get(&key("B")).await.unwrap().unwrap(),
            Payload::from_static(b"also-from-source")
        );
    }
}
