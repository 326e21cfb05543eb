//! Collaborator ports the controller drives.
//!
//! Rendering, telemetry and the keep-waiting confirmation live outside the
//! engine. The implementations here only log or record.

use async_trait::async_trait;
use page_dom::NodeId;
use parking_lot::Mutex;
use tourguide_core_types::Step;
use tracing::{debug, info};

use crate::model::TourMetric;

/// `renderStep(stepData, resolvedNode)` / `hideStep()`.
pub trait StepRenderer: Send + Sync {
    fn render_step(&self, step: &Step, node: NodeId);
    fn hide_step(&self);
}

/// Renderer for headless hosts: records nothing, logs every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderer;

impl StepRenderer for TracingRenderer {
    fn render_step(&self, step: &Step, node: NodeId) {
        debug!(target: "tour-controller", step = %step.id, ?node, "render step");
    }

    fn hide_step(&self) {
        debug!(target: "tour-controller", "hide step");
    }
}

pub trait MetricSink: Send + Sync {
    fn emit(&self, metric: &TourMetric);
}

/// Writes every metric as a structured log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn emit(&self, metric: &TourMetric) {
        info!(
            target: "tour-controller",
            status = ?metric.status_code,
            error = ?metric.error_code,
            step = metric.step_number,
            tour = %metric.tour_id,
            session = %metric.session_id.0,
            session_start = %metric.session_start_time,
            "tour metric"
        );
    }
}

/// Keeps metrics in memory until drained, for hosts that ship them in
/// batches.
#[derive(Debug, Default)]
pub struct MemoryMetricSink {
    metrics: Mutex<Vec<TourMetric>>,
}

impl MemoryMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<TourMetric> {
        self.metrics.lock().clone()
    }

    pub fn drain(&self) -> Vec<TourMetric> {
        std::mem::take(&mut *self.metrics.lock())
    }
}

impl MetricSink for MemoryMetricSink {
    fn emit(&self, metric: &TourMetric) {
        self.metrics.lock().push(metric.clone());
    }
}

/// Asked once a rendered target has been gone for the whole missing bound.
/// `true` keeps the session waiting.
#[async_trait]
pub trait WaitPrompt: Send + Sync {
    async fn keep_waiting(&self, step: &Step) -> bool;
}

/// Prompt with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub bool);

#[async_trait]
impl WaitPrompt for FixedPrompt {
    async fn keep_waiting(&self, step: &Step) -> bool {
        debug!(target: "tour-controller", step = %step.id, answer = self.0, "keep-waiting prompt");
        self.0
    }
}
