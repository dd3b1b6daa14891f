//! The filesystem backend tier (§4.3): per-key hashed paths, plus the
//! age-based cleanup sweep registered alongside a writable instance.

pub mod backend;
pub mod cleanup;
pub mod paths;

pub use backend::{FileSystemBackend, FileSystemConfig};
pub use cleanup::{CleanupConfig, run_sweep};
