use crate::model::{
    CachePolicy, ObserverPolicy, PostRenderPolicy, PreRenderPolicy, SelectorPolicy, TourPolicy,
};

pub fn default_policy() -> TourPolicy {
    TourPolicy {
        rev: 1,
        pre_render: PreRenderPolicy {
            interval_ms: 500,
            route_mismatch_ticks: 20,
            element_missing_ticks: 120,
        },
        post_render: PostRenderPolicy {
            interval_ms: 1_000,
            missing_ticks: 60,
        },
        observer: ObserverPolicy {
            position_poll_ms: 500,
            debounce_ms: 10,
        },
        cache: CachePolicy {
            ttl_ms: 15 * 60 * 1_000,
            capacity: 20,
        },
        selector: SelectorPolicy {
            max_suffixes: 100,
            max_class_fragments: 8,
        },
        provenance: Default::default(),
    }
}
