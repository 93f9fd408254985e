use flock_api::ApiError;
use thiserror::Error;

/// Top-level error type for the flock-sdk crate.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("session is not initialized")]
    Uninitialized,
    #[error("session is already initialized")]
    AlreadyInitialized,
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
    #[error("checkpoint {0} has no placement")]
    CheckpointWithoutPlacement(String),
    #[error("no placement is currently presented")]
    NoActiveBridge,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("identify generation {generation} superseded by {latest}")]
    StaleIdentify { generation: u64, latest: u64 },
}

impl SdkError {
    pub(crate) fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
