use thiserror::Error;

/// Errors surfaced by the orchestrator layer itself, distinct from
/// [`ddc_backend::BackendError`] (which backend operations already fold
/// into `Option`/`bool` results wherever a miss is not a real failure).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("backend error: {0}")]
    Backend(#[from] ddc_backend::BackendError),
    #[error("invalid cache key: {0}")]
    Key(#[from] ddc_core::KeyError),
}

pub type CacheResult<T> = Result<T, CacheError>;
