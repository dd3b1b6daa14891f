//! The derived data cache orchestrator (§4.6, §4.7): the top-level
//! `Cache` facade, its handle table, and rollup batching, all sitting
//! on top of a backend graph root built by `ddc-config` (or wired up by
//! hand for tests and embedding).
//!
//! This crate makes a deliberate simplification versus the system this
//! specification was distilled from: request lifecycles are plain
//! `async`/`await` futures dispatched onto the Tokio runtime, rather
//! than a hand-rolled, Pin-projected state-machine future type. The
//! public contract (handles, poll/wait/get, rollup semantics) is
//! unchanged; only the internal plumbing is simpler.

pub mod bundle;
pub mod cache;
pub mod error;
pub mod handle_table;
mod metrics;
pub mod rollup;

pub use cache::{BootNotifyFn, Cache};
pub use error::{CacheError, CacheResult};
pub use handle_table::HandleTable;
pub use rollup::Rollup;
