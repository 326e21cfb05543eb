//! Error types for the tour controller

use flow_cache::CacheError;
use thiserror::Error;
use tourguide_core_types::{GuideError, TourId};

use crate::model::ErrorCode;

/// Failures of the resumption store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Resume store unavailable: {0}")]
    Unavailable(String),

    /// Stored value that does not decode
    #[error("Corrupt resume record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Only one session at a time; callers serialize tour starts
    #[error("Tour '{0}' is already active")]
    TourActive(TourId),

    #[error("No active tour")]
    NoActiveTour,

    #[error("Tour '{0}' is not available")]
    UnknownTour(TourId),

    #[error("Tour '{0}' has no steps")]
    EmptyTour(TourId),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControllerError {
    /// Fetch problems may go away; the caller decides whether to ask again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Cache(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Position in the engine's error taxonomy, when it has one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ControllerError::Cache(_) | ControllerError::UnknownTour(_) => {
                Some(ErrorCode::FetchFailure)
            }
            _ => None,
        }
    }
}

impl From<StoreError> for GuideError {
    fn from(value: StoreError) -> Self {
        GuideError::new(value.to_string())
    }
}

impl From<ControllerError> for GuideError {
    fn from(value: ControllerError) -> Self {
        GuideError::new(value.to_string())
    }
}
