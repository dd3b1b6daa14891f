//! The [`Backend`] contract and every decorator wrapper the backend
//! graph can be built from (§4.1, §4.5).

pub mod backend;
pub mod error;
pub mod wrappers;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, DynBackend};
pub use error::{BackendError, BackendResult};
pub use wrappers::*;
