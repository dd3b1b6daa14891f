//! Read-mode pak backend (§4.4): opens an already-closed pak file,
//! parses its trailer and index, and serves gets by seeking. Puts are
//! rejected since the file is immutable once mounted.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ddc_backend::{Backend, BackendError, BackendResult};
use ddc_core::{CacheKey, DdcUsageStats, Payload, UsageStatsMap};
use tracing::debug;

use crate::format::{self, IndexEntry, PakFormatError};

fn format_err(err: PakFormatError) -> BackendError {
    BackendError::Configuration(err.to_string())
}

/// A pak file mounted read-only. Acts as an authoritative stop for
/// hierarchical fan-down: it reports `backfill_lower_levels() == false`
/// because re-deriving or re-fetching what it already holds would
/// defeat the point of shipping a pak in the first place.
pub struct ReadPak {
    path: PathBuf,
    file: Mutex<File>,
    entries: HashMap<CacheKey, IndexEntry>,
    stats: DdcUsageStats,
}

impl ReadPak {
    pub fn open(path: impl Into<PathBuf>) -> BackendResult<Self> {
        let path = path.into();
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < format::TRAILER_LEN as u64 {
            return Err(format_err(PakFormatError::Truncated));
        }

        let mut tail = vec![0u8; format::TRAILER_LEN];
        file.seek(SeekFrom::End(-(format::TRAILER_LEN as i64)))?;
        file.read_exact(&mut tail)?;
        let index_offset = format::decode_trailer(&tail).map_err(format_err)?;

        let index_len = len - format::TRAILER_LEN as u64 - index_offset as u64;
        let mut index_bytes = vec![0u8; index_len as usize];
        file.seek(SeekFrom::Start(index_offset as u64))?;
        file.read_exact(&mut index_bytes)?;
        let entries = format::decode_index(&index_bytes)
            .map_err(format_err)?
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();

        debug!(path = ?path, "read-pak: mounted");
        Ok(Self { path, file: Mutex::new(file), entries, stats: DdcUsageStats::default() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.keys()
    }

    pub fn entry(&self, key: &CacheKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }
}

#[async_trait]
impl Backend for ReadPak {
    fn is_writable(&self) -> bool {
        false
    }

    fn backfill_lower_levels(&self) -> bool {
        false
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        self.stats.get.record_call();
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let mut buf = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(entry.offset as u64))?;
            file.read_exact(&mut buf)?;
        }
        if crc32fast::hash(&buf) != entry.crc {
            return Ok(None);
        }
        self.stats.get.record_hit(buf.len() as u64);
        Ok(Some(Payload::from(buf)))
    }

    async fn put(&self, _key: &CacheKey, _payload: Payload, _put_even_if_exists: bool) -> BackendResult<()> {
        Err(BackendError::NotWritable(self.path.display().to_string()))
    }

    async fn remove(&self, _key: &CacheKey, _transient: bool) -> BackendResult<()> {
        Err(BackendError::NotWritable(self.path.display().to_string()))
    }

    fn gather_usage_stats(&self, stats: &mut UsageStatsMap, path: &str) {
        stats.insert(path.to_string(), self.stats.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::WritePak;
    use tempfile::tempdir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn write_close_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pak");
        let writer = WritePak::create(&path).unwrap();
        writer.put(&key("A"), Payload::from_static(b"hello"), false).await.unwrap();
        writer.put(&key("B"), Payload::from_static(b"world!"), false).await.unwrap();
        writer.close().await.unwrap();

        let reader = ReadPak::open(&path).unwrap();
        assert_eq!(reader.get(&key("A")).await.unwrap().unwrap(), Payload::from_static(b"hello"));
        assert_eq!(reader.get(&key("B")).await.unwrap().unwrap(), Payload::from_static(b"world!"));
        assert!(reader.get(&key("C")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pak");
        let writer = WritePak::create(&path).unwrap();
        writer.close().await.unwrap();

        let reader = ReadPak::open(&path).unwrap();
        assert!(!reader.is_writable());
        assert!(reader.put(&key("A"), Payload::from_static(b"x"), false).await.is_err());
    }

    #[tokio::test]
    async fn corrupted_entry_bytes_are_reported_as_miss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pak");
        let writer = WritePak::create(&path).unwrap();
        writer.put(&key("A"), Payload::from_static(b"hello"), false).await.unwrap();
        writer.close().await.unwrap();

        {
            use std::io::Write as _;
            let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(0)).unwrap();
            file.write_all(b"HELLO").unwrap();
        }

        let reader = ReadPak::open(&path).unwrap();
        assert!(reader.get(&key("A")).await.unwrap().is_none());
    }
}
