//! Write-mode pak backend (§4.4): entries are appended to the file as
//! they arrive; closing serializes the index and trailer and freezes
//! the pak against further writes.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ddc_backend::{Backend, BackendError, BackendResult};
use ddc_core::{CacheKey, DdcUsageStats, Payload, UsageStatsMap};
use tracing::debug;

use crate::format::{self, IndexEntry};

struct State {
    file: File,
    next_offset: i64,
    entries: HashMap<CacheKey, IndexEntry>,
    closed: bool,
}

/// A pak file open for writing. `put` appends; `close` finalizes the
/// index and trailer, after which every further operation is a no-op.
pub struct WritePak {
    path: PathBuf,
    state: Mutex<State>,
    stats: DdcUsageStats,
}

impl WritePak {
    pub fn create(path: impl Into<PathBuf>) -> BackendResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(State { file, next_offset: 0, entries: HashMap::new(), closed: false }),
            stats: DdcUsageStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Serialize the index table and trailer and freeze the pak. Calling
    /// this more than once is harmless; the second call is a no-op.
    pub async fn close(&self) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(());
        }
        let mut entries: Vec<IndexEntry> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));

        let index_offset = state.next_offset;
        let index_bytes = format::encode_index(&entries);
        state.file.write_all(&index_bytes)?;
        let trailer = format::encode_trailer(index_offset);
        state.file.write_all(&trailer)?;
        state.file.flush()?;
        state.closed = true;
        debug!(path = ?self.path, entries = entries.len(), "write-pak: closed");
        Ok(())
    }
}

#[async_trait]
impl Backend for WritePak {
    fn is_writable(&self) -> bool {
        !self.state.lock().unwrap().closed
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.state.lock().unwrap().entries.contains_key(key)
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        let mut state = self.state.lock().unwrap();
        self.stats.get.record_call();
        let Some(entry) = state.entries.get(key).cloned() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; entry.size as usize];
        state.file.seek(SeekFrom::Start(entry.offset as u64))?;
        state.file.read_exact(&mut buf)?;
        if crc32fast::hash(&buf) != entry.crc {
            return Ok(None);
        }
        self.stats.get.record_hit(buf.len() as u64);
        Ok(Some(Payload::from(buf)))
    }

    async fn put(&self, key: &CacheKey, payload: Payload, _put_even_if_exists: bool) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(());
        }
        let offset = state.next_offset;
        state.file.seek(SeekFrom::Start(offset as u64))?;
        state.file.write_all(&payload)?;
        let crc = crc32fast::hash(&payload);
        let size = payload.len() as i64;
        state.next_offset += size;
        state.entries.insert(key.clone(), IndexEntry { key: key.clone(), offset, size, crc });
        self.stats.put.record_call();
        self.stats.put.record_hit(size as u64);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey, _transient: bool) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BackendError::NotWritable(self.path.display().to_string()));
        }
        state.entries.remove(key);
        Ok(())
    }

    fn gather_usage_stats(&self, stats: &mut UsageStatsMap, path: &str) {
        stats.insert(path.to_string(), self.stats.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_before_close() {
        let dir = tempdir().unwrap();
        let pak = WritePak::create(dir.path().join("a.pak")).unwrap();
        pak.put(&key("A"), Payload::from_static(b"hello"), false).await.unwrap();
        assert_eq!(pak.get(&key("A")).await.unwrap().unwrap(), Payload::from_static(b"hello"));
    }

    #[tokio::test]
    async fn operations_after_close_are_no_ops() {
        let dir = tempdir().unwrap();
        let pak = WritePak::create(dir.path().join("a.pak")).unwrap();
        pak.put(&key("A"), Payload::from_static(b"hello"), false).await.unwrap();
        pak.close().await.unwrap();

        assert!(!pak.is_writable());
        pak.put(&key("B"), Payload::from_static(b"ignored"), false).await.unwrap();
        assert!(!pak.probably_exists(&key("B")).await);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let pak = WritePak::create(dir.path().join("a.pak")).unwrap();
        pak.put(&key("A"), Payload::from_static(b"hello"), false).await.unwrap();
        pak.close().await.unwrap();
        pak.close().await.unwrap();
    }
}
