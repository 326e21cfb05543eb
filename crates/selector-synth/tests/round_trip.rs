use std::sync::Arc;

use page_dom::{DomHost, MemoryDom, NodeId};
use selector_synth::{SelectorSynthesizer, Uniqueness};

/// A page with repeated cards, duplicate classes, generated ids, a shadow
/// widget and a same-origin frame.
fn build_page() -> (MemoryDom, Vec<NodeId>) {
    let dom = MemoryDom::new("https://app.example.com/dashboard");
    let doc = dom.document();
    let html = dom.append_element(doc, "html", &[]).unwrap();
    let body = dom.append_element(html, "body", &[("class", "theme-dark")]).unwrap();
    let mut contexts = vec![doc];

    let grid = dom.append_element(body, "div", &[("class", "grid")]).unwrap();
    for i in 0..4 {
        let generated_id = format!("{i}-card");
        let card = dom
            .append_element(grid, "div", &[("class", "card shadow"), ("id", generated_id.as_str())])
            .unwrap();
        let header = dom.append_element(card, "h2", &[("class", "title")]).unwrap();
        dom.append_text(header, "Card").unwrap();
        let actions = dom.append_element(card, "div", &[("class", "actions")]).unwrap();
        dom.append_element(actions, "button", &[("class", "btn btn-primary")]).unwrap();
        dom.append_element(actions, "button", &[("class", "btn")]).unwrap();
        if i % 2 == 0 {
            dom.append_element(card, "span", &[("data-badge", "new")]).unwrap();
        }
    }

    let widget = dom.append_element(body, "help-widget", &[]).unwrap();
    let shadow = dom.attach_shadow(widget).unwrap();
    contexts.push(shadow);
    let panel = dom.append_element(shadow, "div", &[("class", "panel")]).unwrap();
    dom.append_element(panel, "button", &[("class", "close")]).unwrap();
    dom.append_element(panel, "button", &[("class", "close")]).unwrap();

    let frame = dom.append_element(body, "iframe", &[("class", "preview")]).unwrap();
    let frame_doc = dom.attach_frame(frame, "/preview").unwrap();
    contexts.push(frame_doc);
    let form = dom.append_element(frame_doc, "form", &[]).unwrap();
    for name in ["email", "email", "password"] {
        dom.append_element(form, "input", &[("name", name)]).unwrap();
    }

    (dom, contexts)
}

#[test]
fn every_element_round_trips() {
    let (dom, contexts) = build_page();
    let synth = SelectorSynthesizer::new(Arc::new(dom.clone()));

    let mut checked = 0;
    for context in contexts {
        for node in dom.query_selector_all(context, "*").unwrap() {
            let descriptor = synth
                .synthesize(node)
                .unwrap_or_else(|err| panic!("synthesize {node:?}: {err}"));
            assert!(descriptor.is_well_formed(), "{descriptor}");
            assert_eq!(
                synth.check_uniqueness(&descriptor).unwrap(),
                Uniqueness::Unique(node),
                "{descriptor}"
            );
            assert_eq!(synth.resolve(&descriptor).unwrap(), Some(node), "{descriptor}");
            checked += 1;
        }
    }
    assert!(checked > 30);
}

#[test]
fn synthesis_is_deterministic_and_read_only() {
    let (dom, contexts) = build_page();
    let synth = SelectorSynthesizer::new(Arc::new(dom.clone()));
    let mut changes = dom.changes();

    for node in dom.query_selector_all(contexts[0], "button").unwrap() {
        let first = synth.synthesize(node).unwrap();
        let second = synth.synthesize(node).unwrap();
        assert_eq!(first, second);
    }
    assert!(changes.try_recv().is_err());
}

#[test]
fn nested_repeats_directly_under_a_shadow_root_round_trip() {
    let dom = MemoryDom::new("https://app.example.com/inbox");
    let html = dom.append_element(dom.document(), "html", &[]).unwrap();
    let body = dom.append_element(html, "body", &[]).unwrap();
    let host = dom.append_element(body, "mail-list", &[]).unwrap();
    let shadow = dom.attach_shadow(host).unwrap();

    // Every level repeats the same tag and position one level deeper.
    let outer = dom.append_element(shadow, "div", &[]).unwrap();
    dom.append_element(outer, "span", &[]).unwrap();
    let mut parent = dom.append_element(outer, "div", &[]).unwrap();
    for _ in 0..3 {
        let child = dom.append_element(parent, "div", &[]).unwrap();
        dom.append_element(child, "span", &[]).unwrap();
        parent = child;
    }

    let synth = SelectorSynthesizer::new(Arc::new(dom.clone()));
    let mut checked = 0;
    for node in dom.query_selector_all(shadow, "*").unwrap() {
        let descriptor = synth
            .synthesize(node)
            .unwrap_or_else(|err| panic!("synthesize {node:?}: {err}"));
        assert_eq!(
            synth.check_uniqueness(&descriptor).unwrap(),
            Uniqueness::Unique(node),
            "{descriptor}"
        );
        assert_eq!(synth.resolve(&descriptor).unwrap(), Some(node), "{descriptor}");
        checked += 1;
    }
    assert_eq!(checked, 9);
}
