//! Tourguide command-line support library
//!
//! Configuration, engine wiring and tour file checks shared by the
//! `tourguide` binary and integration tests.

pub mod check;
pub mod config;
pub mod engine;

pub use check::{check_tour, Finding, TourReport};
pub use config::{default_config_path, Config};
pub use engine::Engine;
