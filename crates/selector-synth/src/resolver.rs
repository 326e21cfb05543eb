//! Descriptor resolution

use page_dom::{FrameAccess, NodeId};
use tourguide_core_types::{BoundaryKind, SelectorDescriptor};
use tracing::debug;

use crate::errors::SelectorError;
use crate::synthesizer::SelectorSynthesizer;

/// Result of evaluating a descriptor hop by hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniqueness {
    Unique(NodeId),
    /// Hop `hop` matched nothing, or its frame/shadow root was missing.
    Missing { hop: usize },
    Ambiguous { hop: usize, count: usize },
    /// Hop `hop` names a frame the top document cannot script.
    CrossOrigin { hop: usize },
}

impl SelectorSynthesizer {
    /// Evaluates every hop in its context and reports the first collision.
    pub fn check_uniqueness(&self, descriptor: &SelectorDescriptor) -> Result<Uniqueness, SelectorError> {
        if !descriptor.is_well_formed() {
            return Err(SelectorError::InvalidDescriptor(descriptor.to_string()));
        }
        let host = self.host.as_ref();
        let mut context = host.top_document();
        for (index, hop) in descriptor.hops().iter().enumerate() {
            let found = host.query_selector_all(context, &hop.selector)?;
            let node = match found.as_slice() {
                [] => return Ok(Uniqueness::Missing { hop: index }),
                [node] => *node,
                many => {
                    return Ok(Uniqueness::Ambiguous {
                        hop: index,
                        count: many.len(),
                    })
                }
            };
            context = match hop.boundary {
                BoundaryKind::None => return Ok(Uniqueness::Unique(node)),
                BoundaryKind::Iframe => match host.frame_document(node) {
                    FrameAccess::Document(document) => document,
                    FrameAccess::CrossOrigin => return Ok(Uniqueness::CrossOrigin { hop: index }),
                    FrameAccess::NotLoaded => return Ok(Uniqueness::Missing { hop: index }),
                },
                BoundaryKind::ShadowRoot => match host.shadow_root(node) {
                    Some(root) => root,
                    None => return Ok(Uniqueness::Missing { hop: index }),
                },
            };
        }
        Err(SelectorError::InvalidDescriptor(descriptor.to_string()))
    }

    /// Live node named by `descriptor`, or `None` when any hop is missing or
    /// ambiguous. Cross-origin hops are errors, detected before entering the
    /// frame.
    pub fn resolve(&self, descriptor: &SelectorDescriptor) -> Result<Option<NodeId>, SelectorError> {
        match self.check_uniqueness(descriptor)? {
            Uniqueness::Unique(node) => Ok(Some(node)),
            Uniqueness::CrossOrigin { hop } => {
                let boundary = descriptor
                    .hops()
                    .get(hop)
                    .map(|h| h.selector.clone())
                    .unwrap_or_default();
                Err(SelectorError::CrossOrigin { boundary })
            }
            outcome => {
                debug!(target: "selector-synth", %descriptor, ?outcome, "descriptor did not resolve");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use page_dom::MemoryDom;
    use tourguide_core_types::SelectorHop;

    use super::*;

    fn setup() -> (MemoryDom, SelectorSynthesizer, NodeId) {
        let dom = MemoryDom::new("https://example.com/");
        let body = dom.append_element(dom.document(), "body", &[]).unwrap();
        let synth = SelectorSynthesizer::new(Arc::new(dom.clone()));
        (dom, synth, body)
    }

    #[test]
    fn reports_missing_and_ambiguous_hops() {
        let (dom, synth, body) = setup();
        dom.append_element(body, "a", &[]).unwrap();
        dom.append_element(body, "a", &[]).unwrap();

        assert_eq!(
            synth.check_uniqueness(&SelectorDescriptor::single("a")).unwrap(),
            Uniqueness::Ambiguous { hop: 0, count: 2 }
        );
        assert_eq!(
            synth.check_uniqueness(&SelectorDescriptor::single("nav")).unwrap(),
            Uniqueness::Missing { hop: 0 }
        );
        assert_eq!(synth.resolve(&SelectorDescriptor::single("a")).unwrap(), None);
    }

    #[test]
    fn missing_shadow_root_fails_the_hop() {
        let (dom, synth, body) = setup();
        dom.append_element(body, "my-widget", &[]).unwrap();
        let descriptor = SelectorDescriptor::new(vec![
            SelectorHop::new("my-widget", BoundaryKind::ShadowRoot),
            SelectorHop::new("button", BoundaryKind::None),
        ]);
        assert_eq!(
            synth.check_uniqueness(&descriptor).unwrap(),
            Uniqueness::Missing { hop: 0 }
        );
    }

    #[test]
    fn cross_origin_hop_is_an_error_on_resolve() {
        let (dom, synth, body) = setup();
        let frame = dom.append_element(body, "iframe", &[]).unwrap();
        dom.attach_frame(frame, "https://third.party/").unwrap();
        let descriptor = SelectorDescriptor::new(vec![
            SelectorHop::new("iframe", BoundaryKind::Iframe),
            SelectorHop::new("button", BoundaryKind::None),
        ]);
        assert_eq!(
            synth.check_uniqueness(&descriptor).unwrap(),
            Uniqueness::CrossOrigin { hop: 0 }
        );
        assert_eq!(
            synth.resolve(&descriptor).unwrap_err(),
            SelectorError::CrossOrigin {
                boundary: "iframe".into()
            }
        );
    }

    #[test]
    fn malformed_descriptors_and_selectors_are_errors() {
        let (_dom, synth, _body) = setup();
        let dangling = SelectorDescriptor::new(vec![SelectorHop::new("iframe", BoundaryKind::Iframe)]);
        assert!(matches!(
            synth.resolve(&dangling),
            Err(SelectorError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            synth.resolve(&SelectorDescriptor::single("a:hover")),
            Err(SelectorError::Dom(_))
        ));
    }

    #[test]
    fn replaced_node_resolves_to_the_new_element() {
        let (dom, synth, body) = setup();
        let old = dom.append_element(body, "main", &[("id", "content")]).unwrap();
        let descriptor = synth.synthesize(old).unwrap();
        assert_eq!(synth.resolve(&descriptor).unwrap(), Some(old));

        let fresh = dom.create_element("main");
        dom.set_attribute(fresh, "id", "content").unwrap();
        dom.replace(old, fresh).unwrap();
        assert_eq!(synth.resolve(&descriptor).unwrap(), Some(fresh));
    }
}
