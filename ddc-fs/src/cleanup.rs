//! Age-based cleanup sweep (§4.3): an external collaborator that walks
//! the hashed directory tree and deletes files untouched for longer
//! than `max_age_days`, rate-limited so a sweep does not monopolize the
//! disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Registered alongside a writable [`crate::FileSystemBackend`]; owns
/// none of the backend's state and only ever deletes files, never
/// entries it cannot prove are stale.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub root: PathBuf,
    pub max_age_days: u32,
    pub max_folders_per_sweep: usize,
    pub max_files_per_sec: u32,
}

/// Run one sweep of `config.root`, deleting `.udd` files whose mtime is
/// older than `max_age_days`. Rate-limited to `max_files_per_sec` by
/// sleeping between deletions. Returns the number of files removed.
pub async fn run_sweep(config: &CleanupConfig) -> usize {
    let max_age = Duration::from_secs(u64::from(config.max_age_days) * 86_400);
    let delay = if config.max_files_per_sec > 0 {
        Duration::from_secs_f64(1.0 / f64::from(config.max_files_per_sec))
    } else {
        Duration::ZERO
    };

    let mut removed = 0usize;
    let mut folders_visited = 0usize;

    for entry in WalkDir::new(&config.root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            folders_visited += 1;
            if folders_visited > config.max_folders_per_sweep {
                break;
            }
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("udd") {
            continue;
        }
        if is_stale(entry.path(), max_age).await {
            if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                warn!(path = ?entry.path(), error = %err, "cleanup sweep: failed to remove stale entry");
            } else {
                removed += 1;
                debug!(path = ?entry.path(), "cleanup sweep: removed stale entry");
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
    removed
}

async fn is_stale(path: &Path, max_age: Duration) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn leaves_fresh_files_untouched() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("FRESH.udd");
        tokio::fs::write(&file, b"x").await.unwrap();

        let config = CleanupConfig {
            root: dir.path().to_path_buf(),
            max_age_days: 30,
            max_folders_per_sweep: 1000,
            max_files_per_sec: 0,
        };
        let removed = run_sweep(&config).await;
        assert_eq!(removed, 0);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn removes_files_older_than_max_age() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("STALE.udd");
        tokio::fs::write(&file, b"x").await.unwrap();
        let old = filetime::FileTime::from_system_time(SystemTime::now() - Duration::from_secs(100 * 86_400));
        filetime::set_file_mtime(&file, old).unwrap();

        let config = CleanupConfig {
            root: dir.path().to_path_buf(),
            max_age_days: 30,
            max_folders_per_sweep: 1000,
            max_files_per_sec: 0,
        };
        let removed = run_sweep(&config).await;
        assert_eq!(removed, 1);
        assert!(!file.exists());
    }
}
