use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tourguide_core_types::StepOverrides;

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct TourPolicy {
    pub rev: u64,
    pub pre_render: PreRenderPolicy,
    pub post_render: PostRenderPolicy,
    pub observer: ObserverPolicy,
    pub cache: CachePolicy,
    pub selector: SelectorPolicy,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provenance: BTreeMap<String, PolicyProvenance>,
}

/// Polling before a step is shown.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PreRenderPolicy {
    pub interval_ms: u64,
    /// Consecutive ticks with a non-matching route before giving up.
    pub route_mismatch_ticks: u32,
    /// Ticks with a matching route but no target before giving up.
    pub element_missing_ticks: u32,
}

/// Polling while a step is shown.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PostRenderPolicy {
    pub interval_ms: u64,
    /// Ticks with the target gone before asking whether to keep waiting.
    pub missing_ticks: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ObserverPolicy {
    pub position_poll_ms: u64,
    pub debounce_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl_ms: u64,
    pub capacity: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SelectorPolicy {
    /// Remembered child-suffix combinations kept while walking upward.
    pub max_suffixes: usize,
    /// Classes per element considered when building class combinations.
    pub max_class_fragments: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
}

impl TourPolicy {
    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }

    pub fn source_of(&self, path: &str) -> Option<PolicySource> {
        self.provenance.get(path).map(|entry| entry.source)
    }

    /// Validation thresholds for one step, with its overrides applied.
    pub fn validation_for(&self, overrides: &StepOverrides) -> ValidationPolicy {
        ValidationPolicy {
            pre_render_interval: Duration::from_millis(
                overrides
                    .pre_render_interval_ms
                    .unwrap_or(self.pre_render.interval_ms)
                    .max(1),
            ),
            route_mismatch_ticks: overrides
                .route_mismatch_ticks
                .unwrap_or(self.pre_render.route_mismatch_ticks),
            element_missing_ticks: overrides
                .element_missing_ticks
                .unwrap_or(self.pre_render.element_missing_ticks),
            post_render_interval: Duration::from_millis(
                overrides
                    .post_render_interval_ms
                    .unwrap_or(self.post_render.interval_ms)
                    .max(1),
            ),
            post_missing_ticks: overrides
                .post_missing_ticks
                .unwrap_or(self.post_render.missing_ticks),
        }
    }
}

impl ObserverPolicy {
    pub fn position_poll(&self) -> Duration {
        Duration::from_millis(self.position_poll_ms.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl CachePolicy {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Resolved thresholds the controller polls with for a single step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub pre_render_interval: Duration,
    pub route_mismatch_ticks: u32,
    pub element_missing_ticks: u32,
    pub post_render_interval: Duration,
    pub post_missing_ticks: u32,
}
