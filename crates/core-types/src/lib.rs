use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type the component crates convert into at their boundaries.
#[derive(Debug, Error, Clone)]
pub enum GuideError {
    #[error("{message}")]
    Message { message: String },
}

impl GuideError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TourId(pub String);

impl TourId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scope tag a tour was fetched under (environment, workspace, locale...).
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Scope(pub String);

impl Scope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Context a selector hop steps into once its element is resolved.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum BoundaryKind {
    #[default]
    None,
    Iframe,
    ShadowRoot,
}

impl BoundaryKind {
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryKind::None => "none",
            BoundaryKind::Iframe => "iframe",
            BoundaryKind::ShadowRoot => "shadowRoot",
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SelectorHop {
    pub selector: String,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub boundary: BoundaryKind,
}

impl SelectorHop {
    pub fn new(selector: impl Into<String>, boundary: BoundaryKind) -> Self {
        Self {
            selector: selector.into(),
            boundary,
        }
    }
}

/// Chain of selectors locating a step target, outermost context first.
///
/// Every hop but the last names the element whose iframe document or shadow
/// root holds the next hop; the last hop is the target and has
/// `BoundaryKind::None`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SelectorDescriptor(pub Vec<SelectorHop>);

impl SelectorDescriptor {
    pub fn new(hops: Vec<SelectorHop>) -> Self {
        Self(hops)
    }

    /// Descriptor for a target living directly in the top document.
    pub fn single(selector: impl Into<String>) -> Self {
        Self(vec![SelectorHop::new(selector, BoundaryKind::None)])
    }

    pub fn hops(&self) -> &[SelectorHop] {
        &self.0
    }

    pub fn target(&self) -> Option<&SelectorHop> {
        self.0.last()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks the structural invariant: non-empty selectors, boundaries on
    /// every hop except the last.
    pub fn is_well_formed(&self) -> bool {
        let Some((last, outer)) = self.0.split_last() else {
            return false;
        };
        last.boundary == BoundaryKind::None
            && !last.selector.trim().is_empty()
            && outer
                .iter()
                .all(|hop| hop.boundary != BoundaryKind::None && !hop.selector.trim().is_empty())
    }
}

impl fmt::Display for SelectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, hop) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", hop.selector)?;
            if hop.boundary != BoundaryKind::None {
                write!(f, " ::{}", hop.boundary.name())?;
            }
        }
        Ok(())
    }
}

/// Bounding box in CSS pixels relative to the top viewport.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn same_position(&self, other: &Rect) -> bool {
        self.top == other.top && self.left == other.left
    }

    pub fn same_size(&self, other: &Rect) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Per-step overrides of the global validation thresholds.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "camelCase", default))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StepOverrides {
    pub pre_render_interval_ms: Option<u64>,
    pub route_mismatch_ticks: Option<u32>,
    pub element_missing_ticks: Option<u32>,
    pub post_render_interval_ms: Option<u64>,
    pub post_missing_ticks: Option<u32>,
}

/// Opaque rendering data handed to the rendering collaborator.
#[cfg(feature = "serde-full")]
pub type StepPayload = serde_json::Value;

#[cfg(not(feature = "serde-full"))]
pub type StepPayload = ();

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub id: StepId,
    /// Route pattern of the page this step expects.
    pub route: String,
    pub target: SelectorDescriptor,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub overrides: StepOverrides,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub payload: StepPayload,
}

impl Step {
    pub fn new(id: impl Into<String>, route: impl Into<String>, target: SelectorDescriptor) -> Self {
        Self {
            id: StepId::new(id),
            route: route.into(),
            target,
            overrides: StepOverrides::default(),
            payload: StepPayload::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: StepOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Wire shape returned by the flow transport for a single tour.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TourData {
    pub templates: Vec<Step>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub scope: Scope,
}

impl TourData {
    pub fn new(templates: Vec<Step>, scope: Scope) -> Self {
        Self { templates, scope }
    }

    pub fn into_tour(self, id: TourId) -> Tour {
        Tour {
            id,
            scope: self.scope,
            steps: self.templates,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tour {
    pub id: TourId,
    pub scope: Scope,
    pub steps: Vec<Step>,
}

impl Tour {
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position_of(&self, step: &StepId) -> Option<usize> {
        self.steps.iter().position(|candidate| &candidate.id == step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_well_formed_requires_boundaries_on_outer_hops() {
        let ok = SelectorDescriptor::new(vec![
            SelectorHop::new("iframe#app", BoundaryKind::Iframe),
            SelectorHop::new("button.save", BoundaryKind::None),
        ]);
        assert!(ok.is_well_formed());

        let dangling = SelectorDescriptor::new(vec![
            SelectorHop::new("iframe#app", BoundaryKind::None),
            SelectorHop::new("button.save", BoundaryKind::None),
        ]);
        assert!(!dangling.is_well_formed());

        let open_end = SelectorDescriptor::new(vec![SelectorHop::new(
            "my-widget",
            BoundaryKind::ShadowRoot,
        )]);
        assert!(!open_end.is_well_formed());
        assert!(!SelectorDescriptor::default().is_well_formed());
    }

    #[test]
    fn descriptor_display_marks_boundaries() {
        let descriptor = SelectorDescriptor::new(vec![
            SelectorHop::new("my-widget", BoundaryKind::ShadowRoot),
            SelectorHop::new("span", BoundaryKind::None),
        ]);
        assert_eq!(descriptor.to_string(), "my-widget ::shadowRoot | span");
    }

    #[test]
    fn tour_positions_steps_by_id() {
        let tour = TourData::new(
            vec![
                Step::new("a", "/one", SelectorDescriptor::single("#a")),
                Step::new("b", "/two", SelectorDescriptor::single("#b")),
            ],
            Scope::new("prod"),
        )
        .into_tour(TourId::new("t1"));
        assert_eq!(tour.position_of(&StepId::new("b")), Some(1));
        assert_eq!(tour.position_of(&StepId::new("zz")), None);
        assert_eq!(tour.len(), 2);
    }

    #[cfg(feature = "serde-full")]
    #[test]
    fn tour_data_reads_wire_shape() {
        let raw = r#"{
            "templates": [
                {
                    "id": "s1",
                    "route": "/orgs/{{orgId}}/settings",
                    "target": [
                        {"selector": "iframe#app", "boundary": "iframe"},
                        {"selector": "button.save"}
                    ],
                    "overrides": {"elementMissingTicks": 10}
                }
            ],
            "scope": "prod"
        }"#;
        let data: TourData = serde_json::from_str(raw).unwrap();
        let step = &data.templates[0];
        assert_eq!(step.target.hops()[0].boundary, BoundaryKind::Iframe);
        assert_eq!(step.target.hops()[1].boundary, BoundaryKind::None);
        assert_eq!(step.overrides.element_missing_ticks, Some(10));
        assert_eq!(data.scope, Scope::new("prod"));
    }
}
