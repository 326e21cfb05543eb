//! Tour controller: drives one tour session through its steps.
//!
//! ```text
//! Idle -> PreValidating(i) -> Rendered(i) -> PostValidating(i)
//!      -> PreValidating(i + 1) | Completed | Quit | Failed(code)
//! ```
//!
//! Pre-render polling waits for the route to match and the target to
//! resolve. Post-render polling, nudged by the target observer, checks the
//! route still matches and the descriptor still resolves to the same node.
//! Every outcome is reported through a [`MetricSink`] with an enumerated
//! status code, and state changes are broadcast as [`TourEvent`]s.
//!
//! When the next step lives on another page a resume record is written to
//! the [`ResumeStore`]; [`TourController::resume`] picks it up on the next
//! load.

pub mod controller;
pub mod errors;
pub mod model;
pub mod ports;
pub mod resume;

pub use controller::{Collaborators, TourController};
pub use errors::{ControllerError, StoreError};
pub use model::{ErrorCode, StatusCode, TourEvent, TourIntent, TourMetric, TourSession, TourState};
pub use ports::{
    FixedPrompt, MemoryMetricSink, MetricSink, StepRenderer, TracingMetricSink, TracingRenderer,
    WaitPrompt,
};
pub use resume::{MemoryResumeStore, ResumePointer, ResumeStore, ACTIVE_TOUR_POINTER};
