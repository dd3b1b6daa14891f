//! Filesystem backend (§4.3): one file per entry under a hashed path,
//! with opportunistic mtime-touching so frequently accessed entries
//! resist the age-based cleanup sweep.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use ddc_backend::{Backend, BackendError, BackendResult};
use ddc_core::{CacheKey, DdcUsageStats, Payload, UsageStatsMap};
use tracing::warn;
use uuid::Uuid;

use crate::paths::entry_path;

/// Configuration accepted at construction, mirroring the `FileSystem`
/// node's option table (§6).
#[derive(Debug, Clone)]
pub struct FileSystemConfig {
    pub root: PathBuf,
    pub read_only: bool,
    pub touch_on_exists: bool,
    pub unused_file_age: Duration,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        FileSystemConfig {
            root: PathBuf::from("."),
            read_only: false,
            touch_on_exists: false,
            unused_file_age: Duration::from_secs(60 * 60 * 24 * 30),
        }
    }
}

/// The filesystem tier. Construction probes the root for writability;
/// a failed probe (and an otherwise-empty directory) demotes the
/// backend to unusable, matching §4.3's initialization contract.
pub struct FileSystemBackend {
    config: FileSystemConfig,
    writable: AtomicBool,
    stats: DdcUsageStats,
}

impl FileSystemBackend {
    pub async fn new(config: FileSystemConfig) -> Self {
        let writable = if config.read_only {
            false
        } else {
            probe_writable(&config.root).await
        };
        FileSystemBackend {
            config,
            writable: AtomicBool::new(writable),
            stats: DdcUsageStats::default(),
        }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        entry_path(&self.config.root, key)
    }

    async fn maybe_touch(&self, path: &Path) {
        let should_touch = if self.config.touch_on_exists {
            true
        } else {
            match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
                Ok(modified) => match SystemTime::now().duration_since(modified) {
                    Ok(age) => age > self.config.unused_file_age / 4,
                    Err(_) => false,
                },
                Err(_) => false,
            }
        };
        if should_touch {
            let now = filetime::FileTime::now();
            let _ = tokio::task::spawn_blocking({
                let path = path.to_path_buf();
                move || filetime::set_file_mtime(&path, now)
            })
            .await;
        }
    }
}

async fn probe_writable(root: &Path) -> bool {
    if tokio::fs::create_dir_all(root).await.is_err() {
        return false;
    }
    let probe_path = root.join(format!("probe.{}", Uuid::new_v4()));
    match tokio::fs::write(&probe_path, b"probe").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe_path).await;
            true
        }
        Err(err) => {
            warn!(?root, error = %err, "filesystem backend: write probe failed, falling back to read-only");
            false
        }
    }
}

#[async_trait]
impl Backend for FileSystemBackend {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        let path = self.path_for(key);
        if tokio::fs::metadata(&path).await.is_ok() {
            self.maybe_touch(&path).await;
            true
        } else {
            false
        }
    }

    async fn get(&self, key: &CacheKey) -> BackendResult<Option<Payload>> {
        self.stats.get.record_call();
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                self.stats.get.record_hit(bytes.len() as u64);
                Ok(Some(Payload::from(bytes)))
            }
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BackendError::Io(err)),
        }
    }

    async fn put(
        &self,
        key: &CacheKey,
        payload: Payload,
        put_even_if_exists: bool,
    ) -> BackendResult<()> {
        self.stats.put.record_call();
        if !self.is_writable() {
            return Ok(());
        }
        let path = self.path_for(key);
        if !put_even_if_exists && tokio::fs::metadata(&path).await.is_ok() {
            return Ok(());
        }
        let Some(dir) = path.parent() else {
            return Err(BackendError::Configuration("entry path has no parent".into()));
        };
        tokio::fs::create_dir_all(dir).await?;

        let temp_path = dir.join(format!("temp.{}", Uuid::new_v4()));
        tokio::fs::write(&temp_path, &payload).await?;

        match tokio::fs::rename(&temp_path, &path).await {
            Ok(()) => {
                self.stats.put.record_hit(payload.len() as u64);
                Ok(())
            }
            Err(_) => {
                // A concurrent put may have already created the target;
                // that race is accepted silently per §4.3.
                let _ = tokio::fs::remove_file(&temp_path).await;
                Ok(())
            }
        }
    }

    async fn remove(&self, key: &CacheKey, _transient: bool) -> BackendResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackendError::Io(err)),
        }
    }

    fn gather_usage_stats(&self, map: &mut UsageStatsMap, path: &str) {
        map.insert(path.to_string(), self.stats.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    async fn backend(root: PathBuf) -> FileSystemBackend {
        FileSystemBackend::new(FileSystemConfig {
            root,
            ..Default::default()
        })
        .await
    }

    #[tokio::test]
    async fn round_trips_a_value() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().to_path_buf()).await;
        assert!(backend.is_writable());

        backend.put(&key("K"), Bytes::from_static(b"payload"), true).await.unwrap();
        assert_eq!(
            backend.get(&key("K")).await.unwrap().as_deref(),
            Some(&b"payload"[..])
        );
    }

    #[tokio::test]
    async fn miss_on_unknown_key_returns_none() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().to_path_buf()).await;
        assert!(backend.get(&key("MISSING")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_case_insensitive() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().to_path_buf()).await;
        backend.put(&key("AbC"), Bytes::from_static(b"v"), true).await.unwrap();
        assert_eq!(
            backend.get(&key("ABC")).await.unwrap().as_deref(),
            Some(&b"v"[..])
        );
    }

    #[tokio::test]
    async fn gather_usage_stats_reports_real_get_and_put_counts() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().to_path_buf()).await;
        backend.put(&key("K"), Bytes::from_static(b"payload"), true).await.unwrap();
        backend.get(&key("K")).await.unwrap();
        backend.get(&key("MISSING")).await.unwrap();

        let mut map = UsageStatsMap::new();
        backend.gather_usage_stats(&mut map, "0");
        let snapshot = map.get("0").unwrap();
        assert_eq!(snapshot.put_game_thread.calls, 1);
        assert_eq!(snapshot.put_game_thread.hits, 1);
        assert_eq!(snapshot.get_game_thread.calls, 2);
        assert_eq!(snapshot.get_game_thread.hits, 1);
    }
}
