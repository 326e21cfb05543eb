//! Error types for selector synthesis and resolution

use page_dom::{DomError, NodeId};
use thiserror::Error;
use tourguide_core_types::GuideError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Node is not reachable from the top document
    #[error("Node {0:?} is detached")]
    Detached(NodeId),

    /// Only elements can be targeted
    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    /// A required hop goes through a frame the top document cannot script
    #[error("Cross-origin boundary at '{boundary}'")]
    CrossOrigin { boundary: String },

    /// Descriptor violating the hop/boundary invariant
    #[error("Malformed selector descriptor: {0}")]
    InvalidDescriptor(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl SelectorError {
    /// Boundary errors never heal by retrying.
    pub fn is_boundary(&self) -> bool {
        matches!(self, SelectorError::CrossOrigin { .. })
    }
}

impl From<SelectorError> for GuideError {
    fn from(value: SelectorError) -> Self {
        GuideError::new(value.to_string())
    }
}
