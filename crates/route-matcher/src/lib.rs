//! Route matching for tour steps.
//!
//! A route is split into four independently matched segments (path,
//! hash-path, query, fragment). Each segment is a list of tokens that must
//! align one-to-one with the other side:
//! - literals match by equality
//! - `*` and `{{name}}` match exactly one non-empty token
//! - placeholders can be bound to concrete values through [`RouteParams`]
//!
//! There is no prefix or greedy matching.

pub mod errors;
pub mod matcher;
pub mod pattern;

pub use errors::RouteError;
pub use matcher::{RouteMatcher, RouteParams};
pub use pattern::{RoutePattern, Segment, Token};
