//! Selector parsing and matching.
//!
//! Grammar: type selectors and `*`, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, `:nth-child(n)`, `:scope`, compound selectors,
//! descendant and child (`>`) combinators, and `,` lists.
//!
//! `:scope` is the context node a query runs against, which may be a
//! document or shadow root; `:scope > a` only matches top-level children.

use crate::errors::DomError;
use crate::host::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub(crate) Vec<ComplexSelector>);

impl SelectorList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComplexSelector {
    /// Left to right; the last part matches the subject element.
    parts: Vec<SelectorPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorPart {
    compound: Compound,
    /// Relation to the part on the left; `None` for the first part.
    combinator: Option<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    nth_child: Option<usize>,
    scope: bool,
}

impl Compound {
    /// No element conditions; `*` and a bare `:scope` are empty.
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nth_child.is_none()
    }
}

enum Pseudo {
    NthChild(usize),
    Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    value: Option<String>,
}

/// Read-only element access the matcher needs.
pub(crate) trait ElementView {
    /// Tree parent of any kind, including a document or shadow root.
    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn tag(&self, node: NodeId) -> Option<&str>;
    fn attr(&self, node: NodeId, name: &str) -> Option<&str>;
    fn element_index(&self, node: NodeId) -> Option<usize>;
}

pub fn parse_selector(selector: &str) -> Result<SelectorList, DomError> {
    let mut parser = Parser {
        source: selector,
        chars: selector.chars().collect(),
        pos: 0,
    };
    let mut list = vec![parser.complex()?];
    loop {
        parser.skip_whitespace();
        match parser.peek() {
            None => break,
            Some(',') => {
                parser.pos += 1;
                list.push(parser.complex()?);
            }
            Some(other) => return Err(parser.error(format!("unexpected '{}'", other))),
        }
    }
    Ok(SelectorList(list))
}

impl SelectorList {
    /// True when `node` matches, with `:scope` bound to `scope`.
    pub(crate) fn matches<V: ElementView>(&self, view: &V, node: NodeId, scope: NodeId) -> bool {
        self.0.iter().any(|complex| {
            match_from(view, node, scope, &complex.parts, complex.parts.len() - 1)
        })
    }
}

fn match_from<V: ElementView>(
    view: &V,
    node: NodeId,
    scope: NodeId,
    parts: &[SelectorPart],
    index: usize,
) -> bool {
    let part = &parts[index];
    if !compound_matches(view, node, scope, &part.compound) {
        return false;
    }
    match part.combinator {
        None => true,
        Some(Combinator::Child) => step_up(view, node)
            .is_some_and(|parent| match_from(view, parent, scope, parts, index - 1)),
        Some(Combinator::Descendant) => {
            let mut cursor = step_up(view, node);
            while let Some(ancestor) = cursor {
                if match_from(view, ancestor, scope, parts, index - 1) {
                    return true;
                }
                cursor = step_up(view, ancestor);
            }
            false
        }
    }
}

/// Parent for combinator walks. Roots end the walk, so matching never
/// leaves a shadow tree or frame document.
fn step_up<V: ElementView>(view: &V, node: NodeId) -> Option<NodeId> {
    view.tag(node)?;
    view.parent_node(node)
}

fn compound_matches<V: ElementView>(
    view: &V,
    node: NodeId,
    scope: NodeId,
    compound: &Compound,
) -> bool {
    if compound.scope && node != scope {
        return false;
    }
    let Some(tag) = view.tag(node) else {
        // Documents and shadow roots only match a bare `:scope`.
        return compound.scope && compound.is_empty();
    };
    if let Some(expected) = &compound.tag {
        if !expected.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if view.attr(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let class_attr = view.attr(node, "class").unwrap_or("");
        let has_all = compound
            .classes
            .iter()
            .all(|wanted| class_attr.split_ascii_whitespace().any(|c| c == wanted));
        if !has_all {
            return false;
        }
    }
    for condition in &compound.attrs {
        match (view.attr(node, &condition.name), &condition.value) {
            (None, _) => return false,
            (Some(actual), Some(expected)) if actual != expected => return false,
            _ => {}
        }
    }
    if let Some(n) = compound.nth_child {
        if view.element_index(node) != Some(n) {
            return false;
        }
    }
    true
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::invalid_selector(self.source, reason)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn complex(&mut self) -> Result<ComplexSelector, DomError> {
        let mut parts = Vec::new();
        self.skip_whitespace();
        loop {
            let combinator = if parts.is_empty() {
                None
            } else {
                let spaced = self.skip_whitespace();
                match self.peek() {
                    Some('>') => {
                        self.pos += 1;
                        self.skip_whitespace();
                        Some(Combinator::Child)
                    }
                    None | Some(',') => break,
                    Some(_) if spaced => Some(Combinator::Descendant),
                    Some(other) => return Err(self.error(format!("unexpected '{}'", other))),
                }
            };
            let compound = self.compound()?;
            parts.push(SelectorPart {
                compound,
                combinator,
            });
        }
        if parts.is_empty() {
            return Err(self.error("empty selector"));
        }
        Ok(ComplexSelector { parts })
    }

    fn compound(&mut self) -> Result<Compound, DomError> {
        let mut compound = Compound::default();
        let mut universal = false;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    match self.pseudo()? {
                        Pseudo::NthChild(n) => compound.nth_child = Some(n),
                        Pseudo::Scope => compound.scope = true,
                    }
                }
                _ => break,
            }
        }
        if compound.is_empty() && !compound.scope && !universal {
            return Err(self.error("expected a compound selector"));
        }
        Ok(compound)
    }

    fn ident(&mut self) -> Result<String, DomError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                out.push(escaped);
                self.pos += 1;
            } else if is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(out)
    }

    fn attribute(&mut self) -> Result<AttrCondition, DomError> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let value = match self.peek() {
            Some(']') => None,
            Some('=') => {
                self.pos += 1;
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.pos += 1;
                        self.quoted(quote)?
                    }
                    _ => self.ident()?,
                };
                self.skip_whitespace();
                Some(value)
            }
            _ => return Err(self.error("unsupported attribute operator")),
        };
        if self.peek() != Some(']') {
            return Err(self.error("unterminated attribute selector"));
        }
        self.pos += 1;
        Ok(AttrCondition { name, value })
    }

    fn quoted(&mut self, quote: char) -> Result<String, DomError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn pseudo(&mut self) -> Result<Pseudo, DomError> {
        let name = self.ident()?;
        if name.eq_ignore_ascii_case("scope") {
            return Ok(Pseudo::Scope);
        }
        if !name.eq_ignore_ascii_case("nth-child") || self.peek() != Some('(') {
            return Err(self.error(format!("unsupported pseudo-class ':{}'", name)));
        }
        self.pos += 1;
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(self.error("only integer :nth-child arguments are supported"));
        }
        self.pos += 1;
        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Pseudo::NthChild(n)),
            _ => Err(self.error("invalid :nth-child index")),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
