//! Turns a parsed [`BackendGraph`] into a live tree of backends (§6).
//!
//! The builder is the one place allowed to reach for concrete backend
//! types; everything above it only ever sees `Arc<dyn Backend>`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ddc_backend::{
    AsyncPutWrapper, DynBackend, HierarchicalWrapper, InFlightCounter, KeyLengthWrapper, VerifyWrapper,
};
use ddc_fs::{CleanupConfig, FileSystemBackend, FileSystemConfig};
use ddc_memory::{BootMemoryBackend, MemoryBackend};
use ddc_pak::{CompressedPak, ReadPak, WritePak};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::graph::BackendGraph;

/// Every backfill tier below `Root` is re-wrapped in its own async-put
/// wrapper by `HierarchicalWrapper` already, so only the outermost
/// `AsyncPut` uses the counter shared with the top-level cache.
const DEFAULT_KEY_LENGTH: usize = 120;

/// Everything the builder discovered while constructing the tree that
/// the top-level cache and runtime administrative commands need direct
/// handles to, since they aren't reachable through the `Backend` trait
/// object alone.
#[derive(Default)]
pub struct BuiltGraph {
    pub root: Option<DynBackend>,
    pub boot: Option<Arc<BootMemoryBackend>>,
    pub hierarchical: Option<Arc<HierarchicalWrapper>>,
    pub write_pak: Option<Arc<WritePak>>,
    pub read_paks: Vec<Arc<ReadPak>>,
    pub cleanup_configs: Vec<CleanupConfig>,
}

/// Build a complete backend graph from `graph`, synthesizing the
/// `AsyncPut(KeyLength(..))` wrapping pair around the root if it is
/// missing. `root_counter` is the async-completion counter the
/// top-level cache polls for quiescence (§4.7); it is wired into the
/// single outermost `AsyncPut` node only.
pub async fn build(graph: BackendGraph, root_counter: Arc<InFlightCounter>) -> ConfigResult<BuiltGraph> {
    let graph = ensure_root_wrappers(graph);
    let mut built = BuiltGraph::default();

    let BackendGraph::AsyncPut { inner } = &graph else {
        unreachable!("ensure_root_wrappers always produces an outer AsyncPut node");
    };
    let wrapped_inner = build_node(inner, &mut built).await?;
    let root: DynBackend = Arc::new(AsyncPutWrapper::new(wrapped_inner, root_counter, true));
    built.root = Some(root);
    Ok(built)
}

/// If `graph`'s outermost shape is not `AsyncPut(KeyLength(_))`, wrap it
/// so it is. A graph description that the builder cannot coerce into
/// this shape is not possible to construct from [`BackendGraph`]'s own
/// enum shape, so this always succeeds.
fn ensure_root_wrappers(graph: BackendGraph) -> BackendGraph {
    match graph {
        BackendGraph::AsyncPut { inner } => {
            let inner = match *inner {
                BackendGraph::KeyLength { .. } => *inner,
                other => BackendGraph::KeyLength { inner: Box::new(other), length: DEFAULT_KEY_LENGTH },
            };
            BackendGraph::AsyncPut { inner: Box::new(inner) }
        }
        other => BackendGraph::AsyncPut {
            inner: Box::new(BackendGraph::KeyLength {
                inner: Box::new(other),
                length: DEFAULT_KEY_LENGTH,
            }),
        },
    }
}

async fn build_node(graph: &BackendGraph, built: &mut BuiltGraph) -> ConfigResult<DynBackend> {
    match graph {
        BackendGraph::FileSystem {
            path,
            read_only,
            clean,
            flush,
            touch,
            delete_unused,
            unused_file_age,
            folders_to_clean,
            max_file_checks_per_sec,
            env_path_override: _,
            editor_override_setting: _,
            purge_transient: _,
        } => {
            let root = PathBuf::from(path);
            if (*clean || *flush) && !*read_only {
                if let Err(err) = tokio::fs::remove_dir_all(&root).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(?root, error = %err, "filesystem backend: failed to clean root on startup");
                    }
                }
            }

            let config = FileSystemConfig {
                root: root.clone(),
                read_only: *read_only,
                touch_on_exists: *touch,
                unused_file_age: Duration::from_secs(u64::from(*unused_file_age) * 86_400),
            };
            let backend = FileSystemBackend::new(config).await;

            if *delete_unused {
                built.cleanup_configs.push(CleanupConfig {
                    root,
                    max_age_days: *unused_file_age,
                    max_folders_per_sweep: folders_to_clean.unwrap_or(10_000),
                    max_files_per_sec: max_file_checks_per_sec.unwrap_or(0),
                });
            }

            Ok(Arc::new(backend))
        }

        BackendGraph::Boot { filename, max_cache_size } => {
            let backend = Arc::new(BootMemoryBackend::new(Some(PathBuf::from(filename)), *max_cache_size).await);
            built.boot = Some(backend.clone());
            Ok(backend)
        }

        BackendGraph::Memory { .. } => Ok(Arc::new(MemoryBackend::new(None))),

        BackendGraph::Hierarchical { inner } => {
            let mut children = Vec::with_capacity(inner.len());
            for child in inner {
                children.push(Box::pin(build_node(child, built)).await?);
            }
            let hier = Arc::new(HierarchicalWrapper::new(children));
            built.hierarchical = Some(hier.clone());
            Ok(hier)
        }

        BackendGraph::KeyLength { inner, length } => {
            let child = Box::pin(build_node(inner, built)).await?;
            Ok(Arc::new(KeyLengthWrapper::new(child, *length)))
        }

        BackendGraph::AsyncPut { inner } => {
            let child = Box::pin(build_node(inner, built)).await?;
            Ok(Arc::new(AsyncPutWrapper::new(child, InFlightCounter::new(), true)))
        }

        BackendGraph::Verify { inner, fix } => {
            let child = Box::pin(build_node(inner, built)).await?;
            Ok(Arc::new(VerifyWrapper::new(child, None, *fix)))
        }

        BackendGraph::ReadPak { filename, compressed } => {
            let pak = Arc::new(ReadPak::open(filename).map_err(ConfigError::Backend)?);
            built.read_paks.push(pak.clone());
            let backend: DynBackend = if *compressed {
                Arc::new(CompressedPak::new(pak))
            } else {
                pak
            };
            Ok(backend)
        }

        BackendGraph::WritePak { filename, compressed } => {
            let pak = Arc::new(WritePak::create(filename).map_err(ConfigError::Backend)?);
            built.write_pak = Some(pak.clone());
            let backend: DynBackend = if *compressed {
                Arc::new(CompressedPak::new(pak))
            } else {
                pak
            };
            Ok(backend)
        }
    }
}
