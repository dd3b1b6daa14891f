//! Error types shared by every backend and wrapper.

use thiserror::Error;

/// Error returned by a [`crate::Backend`] operation.
///
/// Per the error-handling design, most failure modes (miss, corruption)
/// are *not* represented here — they are folded into `Option`/`bool`
/// results at the call site. `BackendError` is reserved for failures a
/// caller cannot recover from by simply treating the call as a miss:
/// I/O errors reaching storage, a write-pak that has been closed, or a
/// malformed graph.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The underlying storage medium failed (disk I/O, broken pipe, ...).
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A write was attempted against a backend or node that cannot
    /// accept it (read-only pak, closed writer).
    #[error("backend is not writable: {0}")]
    NotWritable(String),

    /// The backend graph description referenced a node that does not
    /// exist, or declared it inconsistently.
    #[error("backend configuration error: {0}")]
    Configuration(String),
}

/// Result type returned by every [`crate::Backend`] operation that can
/// fail in a way the caller must not treat as a plain miss.
pub type BackendResult<T> = Result<T, BackendError>;
