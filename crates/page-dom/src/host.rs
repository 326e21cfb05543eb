//! The DOM host port

use std::fmt;

use tokio::sync::broadcast;
use tourguide_core_types::Rect;

use crate::errors::DomError;

/// Opaque, stable handle of a node. Equal handles mean the same node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Root of the tree a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRoot {
    /// Top document or the content document of an iframe.
    Document(NodeId),
    ShadowRoot { root: NodeId, host: NodeId },
}

impl TreeRoot {
    pub fn node(&self) -> NodeId {
        match self {
            TreeRoot::Document(node) => *node,
            TreeRoot::ShadowRoot { root, .. } => *root,
        }
    }
}

/// Outcome of asking for an iframe's document from the top document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAccess {
    Document(NodeId),
    /// The frame is scriptable only from its own origin.
    CrossOrigin,
    /// No document loaded, or the node is not a frame.
    NotLoaded,
}

/// Change notifications published by a host.
#[derive(Debug, Clone, PartialEq)]
pub enum DomChange {
    /// Children of `target` were added or removed.
    ChildList { target: NodeId },
    Attributes { target: NodeId, name: String },
    /// Layout size of `target` changed.
    Resized { target: NodeId },
    /// `target` (and its subtree) left the page.
    Detached { target: NodeId },
    Navigated { url: String },
}

impl DomChange {
    pub fn target(&self) -> Option<NodeId> {
        match self {
            DomChange::ChildList { target }
            | DomChange::Attributes { target, .. }
            | DomChange::Resized { target }
            | DomChange::Detached { target } => Some(*target),
            DomChange::Navigated { .. } => None,
        }
    }
}

/// Read access to a live page, as seen from its top document.
pub trait DomHost: Send + Sync {
    fn top_document(&self) -> NodeId;

    /// Current location of the top document.
    fn location(&self) -> String;

    /// Parent node within the same tree; `None` for roots and detached nodes.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Root of the tree holding `node`; `None` when the node is detached.
    fn root_of(&self, node: NodeId) -> Option<TreeRoot>;

    /// True when the node is reachable from the top document through
    /// frames and shadow hosts.
    fn is_connected(&self, node: NodeId) -> bool;

    /// Lower-case tag name, `None` for non-elements.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Attributes in document order.
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    /// 1-based position among element siblings, as used by `:nth-child`.
    fn element_index(&self, node: NodeId) -> Option<usize>;

    /// Elements under `context` (a document, shadow root or element) that
    /// match `selector`, in document order. Does not pierce shadow roots or
    /// frames.
    fn query_selector_all(&self, context: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError>;

    fn shadow_root(&self, host: NodeId) -> Option<NodeId>;

    /// Iframe element whose content document is `document`.
    fn frame_element(&self, document: NodeId) -> Option<NodeId>;

    fn frame_document(&self, frame: NodeId) -> FrameAccess;

    /// Layout box of a connected element.
    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;

    /// True when `node` is `ancestor` or lies inside it, in the same tree.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn changes(&self) -> broadcast::Receiver<DomChange>;
}
