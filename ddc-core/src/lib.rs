//! Shared types for the derived data cache: keys, payloads, request
//! handles, the deriver contract and usage-stats counters.
//!
//! Every other crate in the workspace depends on this one and nothing
//! else in the workspace; it has no knowledge of backends, wire formats
//! or configuration.

pub mod deriver;
pub mod handle;
pub mod key;
pub mod payload;
pub mod stats;

pub use deriver::{Deriver, deriver_cache_key};
pub use handle::{HandleAllocator, RequestHandle};
pub use key::{CacheKey, KeyError};
pub use payload::{Payload, is_valid_payload};
pub use stats::{DdcUsageStats, DdcUsageStatsSnapshot, OpStats, OpStatsSnapshot, UsageStatsMap};
