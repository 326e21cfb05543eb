//! Flow cache.
//!
//! Tour definitions are fetched through a [`FlowFetcher`] in batches and
//! kept for a fixed time after their last write. The cache is bounded; when
//! a load needs room, the entries closest to expiry go first. Fetch failures
//! are returned to the caller and never retried here.

pub mod cache;
pub mod errors;
pub mod fetcher;

pub use cache::{CacheEntry, FlowCache};
pub use errors::{CacheError, FetchError};
pub use fetcher::{FlowFetcher, HttpFetcherConfig, HttpFlowFetcher};
