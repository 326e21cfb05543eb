//! Static checks for tour definition files.

use std::collections::HashSet;
use std::fmt;

use route_matcher::{RoutePattern, RouteParams};
use serde::Serialize;
use tourguide_core_types::{Step, TourData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    InvalidRoute { step: String, reason: String },
    BlankRoute { step: String },
    EmptyTarget { step: String },
    /// Boundary hops out of place, or a hop with no selector.
    MalformedTarget { step: String, target: String },
    DuplicateStepId { step: String },
    /// Two steps whose routes overlap and point at the same target.
    DuplicateStep { first: String, second: String },
    /// Placeholder with no configured value; it matches any single token.
    UnboundPlaceholder { step: String, name: String },
}

impl Finding {
    pub fn is_error(&self) -> bool {
        !matches!(self, Finding::UnboundPlaceholder { .. })
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::InvalidRoute { step, reason } => {
                write!(f, "step '{step}': invalid route ({reason})")
            }
            Finding::BlankRoute { step } => write!(f, "step '{step}': route is empty"),
            Finding::EmptyTarget { step } => write!(f, "step '{step}': target has no selector"),
            Finding::MalformedTarget { step, target } => {
                write!(f, "step '{step}': malformed target '{target}'")
            }
            Finding::DuplicateStepId { step } => write!(f, "step id '{step}' is used twice"),
            Finding::DuplicateStep { first, second } => {
                write!(f, "steps '{first}' and '{second}' share route and target")
            }
            Finding::UnboundPlaceholder { step, name } => {
                write!(f, "step '{step}': placeholder '{{{{{name}}}}}' has no value")
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TourReport {
    pub steps: usize,
    pub findings: Vec<Finding>,
}

impl TourReport {
    pub fn errors(&self) -> usize {
        self.findings.iter().filter(|f| f.is_error()).count()
    }

    pub fn is_ok(&self) -> bool {
        self.errors() == 0
    }
}

pub fn check_tour(data: &TourData, params: &RouteParams) -> TourReport {
    let mut report = TourReport {
        steps: data.templates.len(),
        findings: Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut parsed: Vec<(&Step, RoutePattern)> = Vec::new();
    for step in &data.templates {
        let id = step.id.to_string();
        if !seen.insert(step.id.clone()) {
            report.findings.push(Finding::DuplicateStepId { step: id.clone() });
        }

        if step.target.is_empty() {
            report.findings.push(Finding::EmptyTarget { step: id.clone() });
        } else if !step.target.is_well_formed() {
            report.findings.push(Finding::MalformedTarget {
                step: id.clone(),
                target: step.target.to_string(),
            });
        }

        if step.route.trim().is_empty() {
            report.findings.push(Finding::BlankRoute { step: id });
            continue;
        }
        match RoutePattern::parse(&step.route) {
            Ok(pattern) => {
                for name in pattern.placeholders() {
                    if params.get(name).is_none() {
                        report.findings.push(Finding::UnboundPlaceholder {
                            step: id.clone(),
                            name: name.to_string(),
                        });
                    }
                }
                parsed.push((step, pattern));
            }
            Err(err) => report.findings.push(Finding::InvalidRoute {
                step: id,
                reason: err.to_string(),
            }),
        }
    }

    for (index, (first, first_route)) in parsed.iter().enumerate() {
        for (second, second_route) in &parsed[index + 1..] {
            if first.target == second.target
                && first_route.overlaps(second_route)
                && second_route.overlaps(first_route)
            {
                report.findings.push(Finding::DuplicateStep {
                    first: first.id.to_string(),
                    second: second.id.to_string(),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use tourguide_core_types::{BoundaryKind, Scope, SelectorDescriptor, SelectorHop};

    use super::*;

    fn step(id: &str, route: &str, selector: &str) -> Step {
        Step::new(id, route, SelectorDescriptor::single(selector))
    }

    #[test]
    fn clean_tour_has_no_findings() {
        let data = TourData::new(
            vec![
                step("one", "/orgs/{{orgId}}/settings", "#save"),
                step("two", "/orgs/{{orgId}}/settings", "#cancel"),
            ],
            Scope::default(),
        );
        let report = check_tour(&data, &RouteParams::new().with("orgId", "42"));
        assert!(report.findings.is_empty());
        assert!(report.is_ok());
        assert_eq!(report.steps, 2);
    }

    #[test]
    fn reports_each_problem() {
        let data = TourData::new(
            vec![
                step("one", "/home", "#a"),
                step("one", "/home", "#a"),
                step("three", "", "#b"),
                Step::new("four", "/x", SelectorDescriptor::default()),
                Step::new(
                    "five",
                    "/x",
                    SelectorDescriptor::new(vec![SelectorHop::new("iframe", BoundaryKind::Iframe)]),
                ),
                step("six", "/users/{{userId}}", "#c"),
            ],
            Scope::default(),
        );
        let report = check_tour(&data, &RouteParams::new());
        assert_eq!(
            report.findings,
            vec![
                Finding::DuplicateStepId { step: "one".into() },
                Finding::BlankRoute { step: "three".into() },
                Finding::EmptyTarget { step: "four".into() },
                Finding::MalformedTarget {
                    step: "five".into(),
                    target: data.templates[4].target.to_string(),
                },
                Finding::UnboundPlaceholder {
                    step: "six".into(),
                    name: "userId".into(),
                },
                Finding::DuplicateStep {
                    first: "one".into(),
                    second: "one".into(),
                },
            ]
        );
        assert_eq!(report.errors(), 5);
    }
}
