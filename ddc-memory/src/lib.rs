//! The in-memory backend tier (§4.2): a plain key→(age, bytes) map with
//! an optional hard size cap, plus the `Boot` node kind that persists
//! it across runs via a snapshot file.

pub mod backend;
pub mod builder;
pub mod snapshot;

pub use backend::MemoryBackend;
pub use builder::BootMemoryBackend;
pub use snapshot::{MAX_AGE, SnapshotError};
