//! Thread-safe in-memory page.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tourguide_core_types::Rect;
use tourguide_event_bus::{EventBus, InMemoryBus};
use tracing::{debug, trace};
use url::Url;

use crate::errors::DomError;
use crate::host::{DomChange, DomHost, FrameAccess, NodeId, TreeRoot};
use crate::selector::{parse_selector, ElementView};

const CHANGE_CAPACITY: usize = 256;

#[derive(Debug)]
enum NodeKind {
    Document {
        origin: String,
        /// Iframe element hosting this document; `None` for the top document.
        frame: Option<NodeId>,
    },
    ShadowRoot {
        host: NodeId,
    },
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        shadow: Option<NodeId>,
        content: Option<NodeId>,
    },
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Option<Rect>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            rect: None,
        }
    }
}

#[derive(Debug)]
struct DomTree {
    nodes: Vec<NodeData>,
    top: NodeId,
    location: String,
}

impl DomTree {
    fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or(DomError::UnknownNode(id))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(NodeData::new(kind));
        id
    }

    fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0 as usize).map(|n| &n.kind),
            Some(NodeKind::Element { .. })
        )
    }

    fn top_origin(&self) -> &str {
        match self.nodes.get(self.top.0 as usize).map(|n| &n.kind) {
            Some(NodeKind::Document { origin, .. }) => origin,
            _ => "null",
        }
    }

    fn root_of(&self, id: NodeId) -> Option<TreeRoot> {
        let mut current = id;
        let mut data = self.nodes.get(current.0 as usize)?;
        while let Some(parent) = data.parent {
            current = parent;
            data = self.nodes.get(current.0 as usize)?;
        }
        match data.kind {
            NodeKind::Document { .. } => Some(TreeRoot::Document(current)),
            NodeKind::ShadowRoot { host } => Some(TreeRoot::ShadowRoot {
                root: current,
                host,
            }),
            _ => None,
        }
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = id;
        loop {
            match self.root_of(cursor) {
                Some(TreeRoot::Document(doc)) if doc == self.top => return true,
                Some(TreeRoot::Document(doc)) => match self.node(doc).map(|n| &n.kind) {
                    Ok(NodeKind::Document {
                        frame: Some(frame), ..
                    }) => cursor = *frame,
                    _ => return false,
                },
                Some(TreeRoot::ShadowRoot { host, .. }) => cursor = host,
                None => return false,
            }
        }
    }

    /// True when `ancestor` is `node` or one of its tree ancestors.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current.0 as usize).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, child: NodeId) -> Result<Option<NodeId>, DomError> {
        let parent = self.node(child)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != child);
            self.node_mut(child)?.parent = None;
        }
        Ok(parent)
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent_data = self.node(parent)?;
        if matches!(parent_data.kind, NodeKind::Text(_)) {
            return Err(DomError::Hierarchy(format!("{parent:?} cannot have children")));
        }
        match self.node(child)?.kind {
            NodeKind::Document { .. } | NodeKind::ShadowRoot { .. } => {
                return Err(DomError::Hierarchy(format!("{child:?} cannot be inserted")))
            }
            _ => {}
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Hierarchy(format!(
                "{child:?} is an ancestor of {parent:?}"
            )));
        }
        Ok(())
    }

    fn collect_matches(&self, context: NodeId, selector: &crate::SelectorList) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        if let Some(data) = self.nodes.get(context.0 as usize) {
            stack.extend(data.children.iter().rev());
        }
        while let Some(id) = stack.pop() {
            let Some(data) = self.nodes.get(id.0 as usize) else {
                continue;
            };
            if matches!(data.kind, NodeKind::Element { .. }) && selector.matches(self, id, context) {
                found.push(id);
            }
            stack.extend(data.children.iter().rev());
        }
        found
    }
}

impl ElementView for DomTree {
    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0 as usize)?.parent
    }

    fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0 as usize)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0 as usize)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    fn element_index(&self, node: NodeId) -> Option<usize> {
        if !self.is_element(node) {
            return None;
        }
        let parent = self.nodes.get(node.0 as usize)?.parent?;
        self.nodes
            .get(parent.0 as usize)?
            .children
            .iter()
            .filter(|sibling| self.is_element(**sibling))
            .position(|sibling| *sibling == node)
            .map(|index| index + 1)
    }
}

fn origin_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .map(|parsed| parsed.origin().ascii_serialization())
}

/// In-memory page with a top document, shadow roots and iframes.
///
/// Cloning yields another handle to the same page. Every mutation publishes
/// [`DomChange`] notifications to [`DomHost::changes`] subscribers.
#[derive(Clone)]
pub struct MemoryDom {
    tree: Arc<RwLock<DomTree>>,
    bus: Arc<InMemoryBus<DomChange>>,
}

impl MemoryDom {
    pub fn new(url: impl Into<String>) -> Self {
        let location = url.into();
        let origin = origin_of(&location).unwrap_or_else(|| "null".to_string());
        let mut tree = DomTree {
            nodes: Vec::new(),
            top: NodeId(0),
            location,
        };
        tree.top = tree.push(NodeKind::Document {
            origin,
            frame: None,
        });
        Self {
            tree: Arc::new(RwLock::new(tree)),
            bus: InMemoryBus::new(CHANGE_CAPACITY),
        }
    }

    pub fn document(&self) -> NodeId {
        self.tree.read().top
    }

    fn publish(&self, changes: Vec<DomChange>) {
        for change in changes {
            trace!(target: "page-dom", ?change, "dom change");
            self.bus.publish(change);
        }
    }

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.write().push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            shadow: None,
            content: None,
        })
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let changes = {
            let mut tree = self.tree.write();
            tree.check_insert(parent, child)?;
            let mut changes = Vec::new();
            if let Some(old_parent) = tree.detach(child)? {
                changes.push(DomChange::ChildList { target: old_parent });
            }
            tree.node_mut(parent)?.children.push(child);
            tree.node_mut(child)?.parent = Some(parent);
            changes.push(DomChange::ChildList { target: parent });
            changes
        };
        self.publish(changes);
        Ok(())
    }

    /// Creates an element with `attrs` and appends it under `parent`.
    pub fn append_element(
        &self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let element = {
            let mut tree = self.tree.write();
            tree.node(parent)?;
            tree.push(NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                    .collect(),
                shadow: None,
                content: None,
            })
        };
        self.append_child(parent, element)?;
        Ok(element)
    }

    pub fn append_text(&self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        let node = self.tree.write().push(NodeKind::Text(text.to_string()));
        self.append_child(parent, node)?;
        Ok(node)
    }

    /// Inserts `child` before `reference`, which must be a child of `parent`.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        let changes = {
            let mut tree = self.tree.write();
            tree.check_insert(parent, child)?;
            if tree.node(reference)?.parent != Some(parent) || reference == child {
                return Err(DomError::Hierarchy(format!(
                    "{reference:?} is not a child of {parent:?}"
                )));
            }
            let mut changes = Vec::new();
            if let Some(old_parent) = tree.detach(child)? {
                if old_parent != parent {
                    changes.push(DomChange::ChildList { target: old_parent });
                }
            }
            let parent_data = tree.node_mut(parent)?;
            let index = parent_data
                .children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(parent_data.children.len());
            parent_data.children.insert(index, child);
            tree.node_mut(child)?.parent = Some(parent);
            changes.push(DomChange::ChildList { target: parent });
            changes
        };
        self.publish(changes);
        Ok(())
    }

    /// Detaches `node` and its subtree from the page.
    pub fn remove(&self, node: NodeId) -> Result<(), DomError> {
        let changes = {
            let mut tree = self.tree.write();
            match tree.detach(node)? {
                Some(parent) => vec![
                    DomChange::ChildList { target: parent },
                    DomChange::Detached { target: node },
                ],
                None => Vec::new(),
            }
        };
        self.publish(changes);
        Ok(())
    }

    /// Puts `replacement` where `old` was and detaches `old`.
    pub fn replace(&self, old: NodeId, replacement: NodeId) -> Result<(), DomError> {
        let parent = self
            .tree
            .read()
            .node(old)?
            .parent
            .ok_or_else(|| DomError::Hierarchy(format!("{old:?} has no parent")))?;
        self.insert_before(parent, replacement, old)?;
        self.remove(old)
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        {
            let mut tree = self.tree.write();
            let NodeKind::Element { attrs, .. } = &mut tree.node_mut(node)?.kind else {
                return Err(DomError::NotAnElement(node));
            };
            match attrs.iter_mut().find(|(key, _)| *key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => attrs.push((name.clone(), value.to_string())),
            }
        }
        self.publish(vec![DomChange::Attributes { target: node, name }]);
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        let removed = {
            let mut tree = self.tree.write();
            let NodeKind::Element { attrs, .. } = &mut tree.node_mut(node)?.kind else {
                return Err(DomError::NotAnElement(node));
            };
            let before = attrs.len();
            attrs.retain(|(key, _)| *key != name);
            attrs.len() != before
        };
        if removed {
            self.publish(vec![DomChange::Attributes { target: node, name }]);
        }
        Ok(())
    }

    /// Attaches an open shadow root to `host` and returns it.
    pub fn attach_shadow(&self, host: NodeId) -> Result<NodeId, DomError> {
        let mut tree = self.tree.write();
        match tree.node(host)?.kind {
            NodeKind::Element { shadow: Some(_), .. } => {
                return Err(DomError::Hierarchy(format!("{host:?} already has a shadow root")))
            }
            NodeKind::Element { .. } => {}
            _ => return Err(DomError::NotAnElement(host)),
        }
        let root = tree.push(NodeKind::ShadowRoot { host });
        if let NodeKind::Element { shadow, .. } = &mut tree.node_mut(host)?.kind {
            *shadow = Some(root);
        }
        Ok(root)
    }

    /// Loads a document at `url` into the iframe element `frame`.
    ///
    /// The frame is cross-origin when the origin of `url` differs from the
    /// top document's; relative URLs stay same-origin.
    pub fn attach_frame(&self, frame: NodeId, url: &str) -> Result<NodeId, DomError> {
        let document = {
            let mut tree = self.tree.write();
            if !tree.is_element(frame) {
                return Err(DomError::NotAnElement(frame));
            }
            let origin = origin_of(url).unwrap_or_else(|| tree.top_origin().to_string());
            let document = tree.push(NodeKind::Document {
                origin,
                frame: Some(frame),
            });
            if let NodeKind::Element { content, .. } = &mut tree.node_mut(frame)?.kind {
                *content = Some(document);
            }
            document
        };
        self.publish(vec![DomChange::ChildList { target: frame }]);
        Ok(document)
    }

    /// Sets the layout box. `Resized` is published only when the size
    /// changes (or on the first layout); moves are silent.
    pub fn set_rect(&self, node: NodeId, rect: Rect) -> Result<(), DomError> {
        let resized = {
            let mut tree = self.tree.write();
            let data = tree.node_mut(node)?;
            let resized = data
                .rect
                .map_or(true, |previous| !previous.same_size(&rect));
            data.rect = Some(rect);
            resized
        };
        if resized {
            self.publish(vec![DomChange::Resized { target: node }]);
        }
        Ok(())
    }

    /// Changes the top location without touching the tree.
    pub fn navigate(&self, url: &str) {
        self.tree.write().location = url.to_string();
        debug!(target: "page-dom", url, "navigated");
        self.publish(vec![DomChange::Navigated {
            url: url.to_string(),
        }]);
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.tree.read().node(node).ok()?.kind {
            NodeKind::Text(text) => Some(text.clone()),
            _ => None,
        }
    }
}

impl DomHost for MemoryDom {
    fn top_document(&self) -> NodeId {
        self.document()
    }

    fn location(&self) -> String {
        self.tree.read().location.clone()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.read().node(node).ok()?.parent
    }

    fn root_of(&self, node: NodeId) -> Option<TreeRoot> {
        self.tree.read().root_of(node)
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.tree.read().is_connected(node)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.tree.read().tag(node).map(str::to_string)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        match self.tree.read().node(node).map(|n| &n.kind) {
            Ok(NodeKind::Element { attrs, .. }) => attrs.clone(),
            _ => Vec::new(),
        }
    }

    fn element_index(&self, node: NodeId) -> Option<usize> {
        ElementView::element_index(&*self.tree.read(), node)
    }

    fn query_selector_all(&self, context: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = parse_selector(selector)?;
        let tree = self.tree.read();
        tree.node(context)?;
        Ok(tree.collect_matches(context, &list))
    }

    fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        match self.tree.read().node(host).ok()?.kind {
            NodeKind::Element { shadow, .. } => shadow,
            _ => None,
        }
    }

    fn frame_element(&self, document: NodeId) -> Option<NodeId> {
        match self.tree.read().node(document).ok()?.kind {
            NodeKind::Document { frame, .. } => frame,
            _ => None,
        }
    }

    fn frame_document(&self, frame: NodeId) -> FrameAccess {
        let tree = self.tree.read();
        let Ok(NodeKind::Element {
            content: Some(document),
            ..
        }) = tree.node(frame).map(|n| &n.kind)
        else {
            return FrameAccess::NotLoaded;
        };
        match tree.node(*document).map(|n| &n.kind) {
            Ok(NodeKind::Document { origin, .. }) if origin == tree.top_origin() => {
                FrameAccess::Document(*document)
            }
            Ok(NodeKind::Document { .. }) => FrameAccess::CrossOrigin,
            _ => FrameAccess::NotLoaded,
        }
    }

    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        let tree = self.tree.read();
        if !tree.is_connected(node) {
            return None;
        }
        tree.node(node).ok()?.rect
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.read().is_inclusive_ancestor(ancestor, node)
    }

    fn changes(&self) -> broadcast::Receiver<DomChange> {
        self.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> (MemoryDom, NodeId, NodeId) {
        let dom = MemoryDom::new("https://app.example.com/home");
        let doc = dom.document();
        let body = dom.append_element(doc, "body", &[]).unwrap();
        (dom, doc, body)
    }

    #[test]
    fn queries_follow_document_order() {
        let (dom, doc, body) = page();
        let list = dom.append_element(body, "ul", &[("class", "menu main")]).unwrap();
        let first = dom.append_element(list, "li", &[]).unwrap();
        dom.append_text(list, "gap").unwrap();
        let second = dom.append_element(list, "li", &[("data-step", "2")]).unwrap();

        assert_eq!(dom.query_selector_all(doc, "li").unwrap(), vec![first, second]);
        assert_eq!(dom.query_selector_all(doc, "ul.menu > li:nth-child(2)").unwrap(), vec![second]);
        assert_eq!(dom.query_selector_all(doc, "body li[data-step=\"2\"]").unwrap(), vec![second]);
        assert_eq!(dom.query_selector_all(doc, ".main.menu").unwrap(), vec![list]);
        assert!(dom.query_selector_all(doc, "body > li").unwrap().is_empty());
        assert_eq!(dom.query_selector_all(list, "li, ul").unwrap(), vec![first, second]);
        assert_eq!(DomHost::element_index(&dom, second), Some(2));
    }

    #[test]
    fn shadow_roots_are_separate_trees() {
        let (dom, doc, body) = page();
        let host = dom.append_element(body, "my-widget", &[]).unwrap();
        let shadow = dom.attach_shadow(host).unwrap();
        let button = dom.append_element(shadow, "button", &[]).unwrap();

        assert!(dom.query_selector_all(doc, "button").unwrap().is_empty());
        assert_eq!(dom.query_selector_all(shadow, "button").unwrap(), vec![button]);
        assert!(dom.query_selector_all(shadow, "my-widget button").unwrap().is_empty());
        assert_eq!(
            dom.root_of(button),
            Some(TreeRoot::ShadowRoot { root: shadow, host })
        );
        assert!(dom.is_connected(button));
        dom.remove(host).unwrap();
        assert!(!dom.is_connected(button));
    }

    #[test]
    fn scope_anchors_to_the_query_context() {
        let (dom, doc, body) = page();
        let host = dom.append_element(body, "my-widget", &[]).unwrap();
        let shadow = dom.attach_shadow(host).unwrap();
        let top = dom.append_element(shadow, "div", &[]).unwrap();
        let nested = dom.append_element(top, "div", &[]).unwrap();

        assert_eq!(dom.query_selector_all(shadow, "div").unwrap(), vec![top, nested]);
        assert_eq!(dom.query_selector_all(shadow, ":scope > div").unwrap(), vec![top]);
        assert_eq!(dom.query_selector_all(shadow, ":scope div").unwrap(), vec![top, nested]);
        assert_eq!(dom.query_selector_all(doc, ":scope > body").unwrap(), vec![body]);
        assert_eq!(
            dom.query_selector_all(top, ":scope > div:nth-child(1)").unwrap(),
            vec![nested]
        );
        assert!(dom.query_selector_all(doc, ":scope > div").unwrap().is_empty());
    }

    #[test]
    fn frames_report_cross_origin_access() {
        let (dom, _doc, body) = page();
        let same = dom.append_element(body, "iframe", &[("id", "same")]).unwrap();
        let other = dom.append_element(body, "iframe", &[("id", "other")]).unwrap();
        let empty = dom.append_element(body, "iframe", &[]).unwrap();
        let same_doc = dom.attach_frame(same, "/embedded").unwrap();
        dom.attach_frame(other, "https://widgets.example.net/").unwrap();

        assert_eq!(dom.frame_document(same), FrameAccess::Document(same_doc));
        assert_eq!(dom.frame_document(other), FrameAccess::CrossOrigin);
        assert_eq!(dom.frame_document(empty), FrameAccess::NotLoaded);
        assert_eq!(dom.frame_element(same_doc), Some(same));

        let inner = dom.append_element(same_doc, "div", &[]).unwrap();
        assert!(dom.is_connected(inner));
        assert_eq!(dom.root_of(inner), Some(TreeRoot::Document(same_doc)));
    }

    #[test]
    fn hierarchy_errors() {
        let (dom, doc, body) = page();
        let child = dom.append_element(body, "div", &[]).unwrap();
        assert!(matches!(dom.append_child(child, body), Err(DomError::Hierarchy(_))));
        assert!(matches!(dom.append_child(body, doc), Err(DomError::Hierarchy(_))));
        assert!(matches!(
            dom.append_child(body, NodeId(999)),
            Err(DomError::UnknownNode(NodeId(999)))
        ));
        let text = dom.append_text(body, "hi").unwrap();
        assert!(matches!(dom.set_attribute(text, "id", "x"), Err(DomError::NotAnElement(_))));
        assert_eq!(dom.text(text).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn mutations_publish_changes() {
        let (dom, _doc, body) = page();
        let target = dom.append_element(body, "div", &[]).unwrap();
        let mut changes = dom.changes();

        dom.set_rect(target, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        dom.set_rect(target, Rect::new(5.0, 5.0, 10.0, 10.0)).unwrap();
        dom.set_attribute(target, "class", "on").unwrap();
        dom.remove(target).unwrap();
        dom.navigate("https://app.example.com/next");

        assert_eq!(changes.recv().await.unwrap(), DomChange::Resized { target });
        assert_eq!(
            changes.recv().await.unwrap(),
            DomChange::Attributes {
                target,
                name: "class".into()
            }
        );
        assert_eq!(changes.recv().await.unwrap(), DomChange::ChildList { target: body });
        assert_eq!(changes.recv().await.unwrap(), DomChange::Detached { target });
        assert_eq!(
            changes.recv().await.unwrap(),
            DomChange::Navigated {
                url: "https://app.example.com/next".into()
            }
        );
        assert_eq!(dom.location(), "https://app.example.com/next");
        assert_eq!(dom.bounding_rect(target), None);
    }

    #[test]
    fn replace_swaps_position() {
        let (dom, doc, body) = page();
        let a = dom.append_element(body, "a", &[]).unwrap();
        let b = dom.append_element(body, "b", &[]).unwrap();
        let fresh = dom.create_element("a");
        dom.replace(a, fresh).unwrap();
        assert_eq!(dom.query_selector_all(doc, "body > *").unwrap(), vec![fresh, b]);
        assert!(!dom.is_connected(a));
        assert!(dom.contains(body, fresh));
        assert!(!dom.contains(body, a));
    }
}
