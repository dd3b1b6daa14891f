//! Decorator backends that each wrap one inner backend, per §4.5.

pub mod async_put;
pub mod corruption;
pub mod hierarchical;
pub mod key_length;
pub mod verify;

pub use async_put::{AsyncPutWrapper, InFlightCounter};
pub use corruption::CorruptionWrapper;
pub use hierarchical::HierarchicalWrapper;
pub use key_length::{DEFAULT_MAX_KEY_LENGTH, KeyLengthWrapper};
pub use verify::VerifyWrapper;
