//! Error types for flow fetching and caching

use thiserror::Error;
use tourguide_core_types::GuideError;

/// Transport failure while fetching tour definitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS or timeout failure
    #[error("Flow transport failed: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("Flow endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Body that is not a map of tour definitions
    #[error("Flow response could not be decoded: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether asking again later may succeed. Retrying is the caller's call.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The load that owned an in-flight fetch was dropped before finishing
    #[error("In-flight fetch for '{0}' was abandoned")]
    Abandoned(String),
}

impl CacheError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Fetch(err) => err.is_retryable(),
            CacheError::Abandoned(_) => true,
        }
    }
}

impl From<FetchError> for GuideError {
    fn from(value: FetchError) -> Self {
        GuideError::new(value.to_string())
    }
}

impl From<CacheError> for GuideError {
    fn from(value: CacheError) -> Self {
        GuideError::new(value.to_string())
    }
}
