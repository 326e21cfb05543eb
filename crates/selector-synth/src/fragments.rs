//! Candidate fragments for one element.
//!
//! Every fragment is anchored on the tag name. Order is priority order:
//! stable id, `data-*` pairs, single classes, class pairs, and finally the
//! `:nth-child` position, which is always present.

use page_dom::{DomHost, NodeId};

/// Identifier that can be written without CSS escapes and does not start
/// with a digit (generated ids like `12ab` or `-3` are not stable).
pub(crate) fn is_plain_ident(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if first.is_ascii_digit() {
        return false;
    }
    if first == '-' {
        match value.chars().nth(1) {
            None => return false,
            Some(c) if c.is_ascii_digit() => return false,
            _ => {}
        }
    }
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub(crate) fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub(crate) fn positional(tag: &str, index: usize) -> String {
    format!("{}:nth-child({})", tag, index)
}

/// Tag-anchored candidates for `node`; the last entry is positional.
pub(crate) fn candidates(
    host: &dyn DomHost,
    node: NodeId,
    tag: &str,
    max_classes: usize,
) -> Vec<String> {
    let attributes = host.attributes(node);
    let mut out = Vec::new();

    if let Some((_, id)) = attributes.iter().find(|(name, _)| name == "id") {
        if is_plain_ident(id) {
            out.push(format!("{}#{}", tag, id));
        }
    }

    for (name, value) in &attributes {
        if name.starts_with("data-") && is_plain_ident(name) {
            out.push(format!("{}[{}={}]", tag, name, quote_value(value)));
        }
    }

    let mut classes: Vec<&str> = Vec::new();
    if let Some((_, class_attr)) = attributes.iter().find(|(name, _)| name == "class") {
        for class in class_attr.split_ascii_whitespace() {
            if is_plain_ident(class) && !classes.contains(&class) {
                classes.push(class);
            }
        }
    }
    classes.truncate(max_classes);
    for class in &classes {
        out.push(format!("{}.{}", tag, class));
    }
    if classes.len() >= 2 {
        for (i, first) in classes.iter().enumerate() {
            for second in &classes[i + 1..] {
                out.push(format!("{}.{}.{}", tag, first, second));
            }
        }
    }

    let index = host.element_index(node).unwrap_or(1);
    out.push(positional(tag, index));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_dom::MemoryDom;

    #[test]
    fn stable_ids_only() {
        assert!(is_plain_ident("save-button"));
        assert!(is_plain_ident("_x1"));
        assert!(!is_plain_ident("1abc"));
        assert!(!is_plain_ident("-2"));
        assert!(!is_plain_ident("-"));
        assert!(!is_plain_ident("a:b"));
        assert!(!is_plain_ident(""));
    }

    #[test]
    fn quoting_escapes_quotes_and_backslashes() {
        assert_eq!(quote_value(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn candidates_follow_priority_order() {
        let dom = MemoryDom::new("https://example.com/");
        let doc = dom.document();
        let node = dom
            .append_element(
                doc,
                "button",
                &[
                    ("class", "btn primary btn wide"),
                    ("id", "save"),
                    ("data-step", "2"),
                    ("title", "ignored"),
                ],
            )
            .unwrap();
        let out = candidates(&dom, node, "button", 8);
        assert_eq!(
            out,
            vec![
                "button#save",
                "button[data-step=\"2\"]",
                "button.btn",
                "button.primary",
                "button.wide",
                "button.btn.primary",
                "button.btn.wide",
                "button.primary.wide",
                "button:nth-child(1)",
            ]
        );
    }

    #[test]
    fn class_cap_bounds_combinations() {
        let dom = MemoryDom::new("https://example.com/");
        let doc = dom.document();
        let node = dom
            .append_element(doc, "div", &[("class", "a b c d"), ("id", "9lives")])
            .unwrap();
        let out = candidates(&dom, node, "div", 2);
        assert_eq!(out, vec!["div.a", "div.b", "div.a.b", "div:nth-child(1)"]);
    }
}
