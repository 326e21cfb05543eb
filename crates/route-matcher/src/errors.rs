//! Error types for route parsing

use thiserror::Error;
use tourguide_core_types::GuideError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Absolute location that the URL parser rejected
    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Placeholder with no name, e.g. `{{}}`
    #[error("Invalid placeholder in '{0}'")]
    InvalidPlaceholder(String),
}

impl From<RouteError> for GuideError {
    fn from(value: RouteError) -> Self {
        GuideError::new(value.to_string())
    }
}
