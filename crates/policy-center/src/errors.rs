use thiserror::Error;
use tourguide_core_types::GuideError;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unsupported policy path: {0}")]
    UnsupportedPath(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl From<PolicyError> for GuideError {
    fn from(value: PolicyError) -> Self {
        GuideError::new(value.to_string())
    }
}
