//! Target re-acquisition.
//!
//! [`SelectorSynthesizer::synthesize`] turns a live element into the shortest
//! tag-anchored selector that matches only that element in its tree, plus
//! one boundary hop for every same-origin iframe or shadow root between the
//! element and the top document. [`SelectorSynthesizer::resolve`] walks the
//! hops back to a live node.
//!
//! Candidates are tried in priority order at each ancestor level (stable id,
//! `data-*`, classes, class pairs, `:nth-child`), combined with the child
//! suffixes that were not unique on their own.

pub mod errors;
mod fragments;
pub mod resolver;
pub mod synthesizer;

pub use errors::SelectorError;
pub use resolver::Uniqueness;
pub use synthesizer::{SelectorSynthesizer, SynthLimits};
