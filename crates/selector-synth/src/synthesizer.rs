use std::sync::Arc;

use page_dom::{DomHost, FrameAccess, NodeId, TreeRoot};
use tourguide_core_types::{BoundaryKind, SelectorDescriptor, SelectorHop};
use tourguide_policy_center::SelectorPolicy;
use tracing::{debug, trace};

use crate::errors::SelectorError;
use crate::fragments::candidates;

/// Bounds on the upward walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthLimits {
    pub max_suffixes: usize,
    pub max_class_fragments: usize,
}

impl Default for SynthLimits {
    fn default() -> Self {
        Self {
            max_suffixes: 100,
            max_class_fragments: 8,
        }
    }
}

impl From<&SelectorPolicy> for SynthLimits {
    fn from(policy: &SelectorPolicy) -> Self {
        Self {
            max_suffixes: policy.max_suffixes.max(1),
            max_class_fragments: policy.max_class_fragments,
        }
    }
}

/// Builds and resolves [`SelectorDescriptor`]s against a [`DomHost`].
///
/// Synthesis and resolution are read-only and deterministic for a given
/// page state.
#[derive(Clone)]
pub struct SelectorSynthesizer {
    pub(crate) host: Arc<dyn DomHost>,
    limits: SynthLimits,
}

impl SelectorSynthesizer {
    pub fn new(host: Arc<dyn DomHost>) -> Self {
        Self::with_limits(host, SynthLimits::default())
    }

    pub fn with_limits(host: Arc<dyn DomHost>, limits: SynthLimits) -> Self {
        Self { host, limits }
    }

    pub fn host(&self) -> &Arc<dyn DomHost> {
        &self.host
    }

    pub fn limits(&self) -> SynthLimits {
        self.limits
    }

    /// Shortest unique selector chain for `node`, outermost hop first.
    pub fn synthesize(&self, node: NodeId) -> Result<SelectorDescriptor, SelectorError> {
        let host = self.host.as_ref();
        if host.tag_name(node).is_none() {
            return Err(SelectorError::NotAnElement(node));
        }
        if !host.is_connected(node) {
            return Err(SelectorError::Detached(node));
        }

        let top = host.top_document();
        let mut hops = Vec::new();
        let mut current = node;
        let mut boundary = BoundaryKind::None;
        loop {
            let root = host.root_of(current).ok_or(SelectorError::Detached(current))?;
            let selector = self.synthesize_in_context(current, root.node())?;
            hops.push(SelectorHop::new(selector, boundary));
            match root {
                TreeRoot::Document(document) if document == top => break,
                TreeRoot::Document(document) => {
                    let frame = host
                        .frame_element(document)
                        .ok_or(SelectorError::Detached(current))?;
                    match host.frame_document(frame) {
                        FrameAccess::Document(loaded) if loaded == document => {}
                        FrameAccess::CrossOrigin => {
                            let boundary = self.describe_frame(frame);
                            debug!(target: "selector-synth", %boundary, "cross-origin frame on path");
                            return Err(SelectorError::CrossOrigin { boundary });
                        }
                        _ => return Err(SelectorError::Detached(current)),
                    }
                    current = frame;
                    boundary = BoundaryKind::Iframe;
                }
                TreeRoot::ShadowRoot { host: shadow_host, .. } => {
                    current = shadow_host;
                    boundary = BoundaryKind::ShadowRoot;
                }
            }
        }
        hops.reverse();
        let descriptor = SelectorDescriptor::new(hops);
        debug!(target: "selector-synth", ?node, %descriptor, "selector synthesized");
        Ok(descriptor)
    }

    /// Walks from `node` towards `context`, returning the first candidate
    /// (or `ancestor > suffix` combination) that matches only `node`.
    /// Once the walk reaches `context` the chains are anchored with
    /// `:scope >`, and the anchored positional chain is always unique.
    fn synthesize_in_context(&self, node: NodeId, context: NodeId) -> Result<String, SelectorError> {
        let host = self.host.as_ref();
        let mut suffixes: Vec<String> = Vec::new();
        let mut current = node;
        loop {
            let tag = host
                .tag_name(current)
                .ok_or(SelectorError::NotAnElement(current))?;
            let fragments = candidates(host, current, &tag, self.limits.max_class_fragments);

            let tried = if suffixes.is_empty() {
                fragments
            } else {
                let mut combined = Vec::with_capacity(fragments.len() * suffixes.len());
                for fragment in &fragments {
                    for suffix in &suffixes {
                        combined.push(format!("{} > {}", fragment, suffix));
                    }
                }
                combined
            };

            for selector in &tried {
                let found = host.query_selector_all(context, selector)?;
                trace!(target: "selector-synth", selector, count = found.len(), "candidate");
                if found.len() == 1 && found[0] == node {
                    return Ok(selector.clone());
                }
            }

            let parent = host
                .parent(current)
                .filter(|parent| *parent != context && host.tag_name(*parent).is_some());
            let Some(parent) = parent else {
                return self.anchor_to_context(node, context, &tried);
            };

            suffixes = tried;
            if suffixes.len() > self.limits.max_suffixes {
                // The positional chain is last and must survive truncation.
                let positional_chain = suffixes.pop();
                suffixes.truncate(self.limits.max_suffixes.saturating_sub(1));
                suffixes.extend(positional_chain);
            }
            current = parent;
        }
    }

    fn anchor_to_context(
        &self,
        node: NodeId,
        context: NodeId,
        chains: &[String],
    ) -> Result<String, SelectorError> {
        for chain in chains {
            let selector = format!(":scope > {}", chain);
            let found = self.host.query_selector_all(context, &selector)?;
            trace!(target: "selector-synth", selector, count = found.len(), "anchored candidate");
            if found.len() == 1 && found[0] == node {
                return Ok(selector);
            }
        }
        // Only reachable when `node` is not a descendant of `context`.
        Err(SelectorError::Detached(node))
    }

    fn describe_frame(&self, frame: NodeId) -> String {
        self.host
            .root_of(frame)
            .and_then(|root| self.synthesize_in_context(frame, root.node()).ok())
            .or_else(|| self.host.tag_name(frame))
            .unwrap_or_else(|| format!("{:?}", frame))
    }
}
