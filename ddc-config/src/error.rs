use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend I/O error building graph: {0}")]
    Io(#[from] std::io::Error),
    #[error("graph description is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("backend error building graph: {0}")]
    Backend(#[from] ddc_backend::BackendError),
    #[error("graph root could not be built: {0}")]
    RootUnbuildable(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
