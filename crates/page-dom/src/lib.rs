//! Page model used by the tourguide engine.
//!
//! The engine never talks to a browser directly. It works against the
//! [`DomHost`] port:
//! - opaque [`NodeId`] handles whose equality is node identity
//! - selector queries scoped to a document or shadow root
//! - explicit frame access checks so cross-origin frames are detected before
//!   anything tries to enter them
//! - a broadcast stream of [`DomChange`] notifications
//!
//! [`MemoryDom`] is a thread-safe in-memory implementation with its own
//! selector engine, used by tests, tooling and hosts that mirror a page.

pub mod errors;
pub mod host;
pub mod memory;
pub mod selector;

pub use errors::DomError;
pub use host::{DomChange, DomHost, FrameAccess, NodeId, TreeRoot};
pub use memory::MemoryDom;
pub use selector::{parse_selector, SelectorList};
