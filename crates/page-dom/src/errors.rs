//! Error types for the page model

use thiserror::Error;
use tourguide_core_types::GuideError;

use crate::host::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// Selector text the engine cannot parse
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Handle that does not name a node of this page
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    /// Operation needs an element but got a document, shadow root or text
    #[error("Not an element: {0:?}")]
    NotAnElement(NodeId),

    /// Tree operation that would produce an invalid tree
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),
}

impl DomError {
    pub(crate) fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        DomError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<DomError> for GuideError {
    fn from(value: DomError) -> Self {
        GuideError::new(value.to_string())
    }
}
