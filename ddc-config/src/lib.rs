//! Parses a declarative [`BackendGraph`] description into a live tree
//! of backends (§6). Configuration file parsing itself, and resolving
//! environment-variable overrides, happen upstream of this crate; it
//! only ever sees the already-resolved tree.

pub mod builder;
pub mod error;
pub mod graph;

pub use builder::{BuiltGraph, build};
pub use error::{ConfigError, ConfigResult};
pub use graph::BackendGraph;
