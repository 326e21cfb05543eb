//! Controller states, metrics and messages

use chrono::{DateTime, Utc};
use page_dom::NodeId;
use serde::{Deserialize, Serialize};
use tourguide_core_types::{Scope, SessionId, Step, StepId, Tour, TourId};

/// Where the controller is. Step indexes are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourState {
    Idle,
    PreValidating(usize),
    Rendered(usize),
    PostValidating(usize),
    Completed,
    Quit,
    Failed(ErrorCode),
}

impl TourState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TourState::Completed | TourState::Quit | TourState::Failed(_)
        )
    }

    /// Step index for the validating states.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            TourState::PreValidating(index)
            | TourState::Rendered(index)
            | TourState::PostValidating(index) => Some(*index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusCode {
    Rendered,
    Advanced,
    Completed,
    Quit,
    NavigationFailure,
    ElementFailure,
    ReferenceFailure,
    BoundaryFailure,
    /// Steps past a resumed step could not be fetched.
    FetchFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NavigationMismatch,
    TargetNotFound,
    TargetReferenceChanged,
    /// Target vanished after rendering and the user stopped waiting.
    TargetDisappeared,
    CrossOriginBoundary,
    FetchFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourMetric {
    pub status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// 1-based.
    pub step_number: usize,
    pub tour_id: TourId,
    pub session_start_time: DateTime<Utc>,
    pub session_id: SessionId,
}

/// Messages the rendering collaborator sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TourIntent {
    Next,
    Previous,
    Quit,
}

/// Published on the controller's event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum TourEvent {
    StateChanged {
        tour_id: Option<TourId>,
        state: TourState,
    },
    Metric(TourMetric),
}

/// Live state of the active tour.
///
/// `step_index` indexes `tour.steps`. A session resumed from a saved step
/// alone holds a one-step tour; `step_offset` is that step's index in the
/// full tour, and [`TourSession::position`] is what states and metrics
/// report.
#[derive(Debug, Clone)]
pub struct TourSession {
    pub id: SessionId,
    pub tour: Tour,
    pub step_index: usize,
    pub step_offset: usize,
    /// The steps after the loaded ones exist but are not available.
    pub partial: bool,
    pub started_at: DateTime<Utc>,
    pub pre_render_polls: u32,
    pub navigation_mismatches: u32,
    /// Node the current step was rendered against.
    pub resolved: Option<NodeId>,
}

impl TourSession {
    pub fn new(tour: Tour, step_index: usize) -> Self {
        Self {
            id: SessionId::new(),
            tour,
            step_index,
            step_offset: 0,
            partial: false,
            started_at: Utc::now(),
            pre_render_polls: 0,
            navigation_mismatches: 0,
            resolved: None,
        }
    }

    /// Session over the single step saved in a resume record, found at
    /// `position` in a tour whose data could not be loaded.
    pub fn from_saved_step(tour_id: TourId, scope: Scope, step: Step, position: usize) -> Self {
        let tour = Tour {
            id: tour_id,
            scope,
            steps: vec![step],
        };
        Self {
            step_offset: position,
            partial: true,
            ..Self::new(tour, 0)
        }
    }

    /// 0-based index of the current step in the full tour.
    pub fn position(&self) -> usize {
        self.step_offset + self.step_index
    }

    pub fn current_step_id(&self) -> Option<&StepId> {
        self.tour.step(self.step_index).map(|step| &step.id)
    }

    /// Last of the loaded steps.
    pub fn is_last_step(&self) -> bool {
        self.step_index + 1 >= self.tour.len()
    }

    /// Finishing here completes the tour.
    pub fn is_final_step(&self) -> bool {
        !self.partial && self.is_last_step()
    }

    pub(crate) fn metric(&self, status_code: StatusCode, error_code: Option<ErrorCode>) -> TourMetric {
        TourMetric {
            status_code,
            error_code,
            step_number: self.position() + 1,
            tour_id: self.tour.id.clone(),
            session_start_time: self.started_at,
            session_id: self.id.clone(),
        }
    }
}
