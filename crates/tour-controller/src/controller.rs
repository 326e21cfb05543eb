//! The step state machine.
//!
//! Every validation phase runs as one spawned task owning a
//! [`CancellationToken`]. Phase changes cancel the token, stop the target
//! observer and bump an epoch; a task that wakes up with a stale epoch
//! exits without touching the session. Renderer, metric and bus calls are
//! collected while the state lock is held and applied after it is released.

use std::sync::Arc;

use page_dom::{DomHost, NodeId};
use parking_lot::{Mutex, RwLock};
use route_matcher::{RouteMatcher, RouteParams};
use selector_synth::{SelectorSynthesizer, SynthLimits};
use target_observer::TargetObserver;
use tokio::select;
use tokio::sync::{broadcast, Notify};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tourguide_core_types::{Scope, Step, TourId};
use tourguide_event_bus::{EventBus, InMemoryBus};
use tourguide_policy_center::TourPolicy;
use tracing::{debug, info, trace, warn};

use flow_cache::FlowCache;

use crate::errors::ControllerError;
use crate::model::{ErrorCode, StatusCode, TourEvent, TourIntent, TourSession, TourState};
use crate::ports::{
    FixedPrompt, MetricSink, StepRenderer, TracingMetricSink, TracingRenderer, WaitPrompt,
};
use crate::resume::{self, MemoryResumeStore, ResumeStore};

const EVENT_CAPACITY: usize = 64;

/// External collaborators. Defaults log, record in memory and decline the
/// keep-waiting prompt.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn StepRenderer>,
    pub metrics: Arc<dyn MetricSink>,
    pub prompt: Arc<dyn WaitPrompt>,
    pub store: Arc<dyn ResumeStore>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            renderer: Arc::new(TracingRenderer),
            metrics: Arc::new(TracingMetricSink),
            prompt: Arc::new(FixedPrompt(false)),
            store: Arc::new(MemoryResumeStore::new()),
        }
    }
}

/// Handle to one controller instance. Clones share the same session.
///
/// Methods that start a phase spawn tasks and must run inside a tokio
/// runtime.
#[derive(Clone)]
pub struct TourController {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn DomHost>,
    cache: Arc<FlowCache>,
    synth: SelectorSynthesizer,
    matcher: RwLock<RouteMatcher>,
    policy: TourPolicy,
    renderer: Arc<dyn StepRenderer>,
    metrics: Arc<dyn MetricSink>,
    prompt: Arc<dyn WaitPrompt>,
    store: Arc<dyn ResumeStore>,
    events: Arc<InMemoryBus<TourEvent>>,
    state: Mutex<ControllerState>,
}

struct ControllerState {
    status: TourState,
    session: Option<TourSession>,
    epoch: u64,
    phase: Option<CancellationToken>,
    observer: TargetObserver,
}

impl ControllerState {
    /// Cancels the running phase and hands out the token of the next one.
    fn next_phase(&mut self) -> (u64, CancellationToken) {
        if let Some(token) = self.phase.take() {
            token.cancel();
        }
        self.epoch += 1;
        let token = CancellationToken::new();
        self.phase = Some(token.clone());
        (self.epoch, token)
    }

    fn teardown(&mut self) {
        if let Some(token) = self.phase.take() {
            token.cancel();
        }
        self.observer.stop();
        self.epoch += 1;
    }
}

enum Effect {
    Render(Step, NodeId),
    Hide,
    Metric(crate::model::TourMetric),
    State {
        tour_id: Option<TourId>,
        state: TourState,
    },
}

/// One evaluation of the current step against the live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Found(NodeId),
    RouteMismatch,
    Missing,
    Boundary,
}

impl TourController {
    pub fn new(
        host: Arc<dyn DomHost>,
        cache: Arc<FlowCache>,
        policy: TourPolicy,
        collaborators: Collaborators,
    ) -> Self {
        let synth =
            SelectorSynthesizer::with_limits(Arc::clone(&host), SynthLimits::from(&policy.selector));
        let observer = TargetObserver::new(Arc::clone(&host), &policy.observer);
        let inner = Inner {
            host,
            cache,
            synth,
            matcher: RwLock::new(RouteMatcher::new(RouteParams::new())),
            policy,
            renderer: collaborators.renderer,
            metrics: collaborators.metrics,
            prompt: collaborators.prompt,
            store: collaborators.store,
            events: InMemoryBus::new(EVENT_CAPACITY),
            state: Mutex::new(ControllerState {
                status: TourState::Idle,
                session: None,
                epoch: 0,
                phase: None,
                observer,
            }),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Values substituted into `{{name}}` route placeholders.
    pub fn set_route_params(&self, params: RouteParams) {
        self.inner.matcher.write().set_params(params);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TourEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> TourState {
        self.inner.state.lock().status
    }

    pub fn session(&self) -> Option<TourSession> {
        self.inner.state.lock().session.clone()
    }

    pub fn cache(&self) -> &Arc<FlowCache> {
        &self.inner.cache
    }

    /// Fetches and caches tours ahead of time.
    pub async fn load_flow(&self, ids: &[TourId], scope: &Scope) -> Result<(), ControllerError> {
        self.inner.cache.load(ids, scope).await?;
        Ok(())
    }

    /// Starts `id` at its first step, fetching it when it is not cached.
    pub async fn start_tour(&self, id: TourId, scope: Scope) -> Result<(), ControllerError> {
        self.inner.ensure_idle()?;
        let tour = match self.inner.cache.get_tour(&id) {
            Some(tour) => tour,
            None => {
                self.inner.cache.load(std::slice::from_ref(&id), &scope).await?;
                self.inner
                    .cache
                    .get_tour(&id)
                    .ok_or_else(|| ControllerError::UnknownTour(id.clone()))?
            }
        };
        if tour.is_empty() {
            return Err(ControllerError::EmptyTour(id));
        }
        self.inner.begin(TourSession::new(tour, 0))
    }

    /// Continues a tour recorded before a navigation. Returns the step index
    /// resumed at, or `None` when there was nothing to resume.
    ///
    /// When the tour can be neither read from the cache nor fetched, the step
    /// saved with the record is resumed on its own at its recorded index.
    /// Advancing past it then fails the tour with a fetch failure.
    pub async fn resume(&self) -> Result<Option<usize>, ControllerError> {
        self.inner.ensure_idle()?;
        let Some(pointer) = resume::take_pointer(self.inner.store.as_ref())? else {
            return Ok(None);
        };

        let session = match self.inner.cache.get_tour(&pointer.tour_id) {
            Some(tour) => {
                debug!(target: "tour-controller", tour = %pointer.tour_id, "resuming from cache");
                let index = tour.position_of(&pointer.step_id).unwrap_or(pointer.step_index);
                TourSession::new(tour, index)
            }
            None => {
                let loaded = self
                    .inner
                    .cache
                    .load(std::slice::from_ref(&pointer.tour_id), &pointer.scope)
                    .await;
                match (loaded, self.inner.cache.get_tour(&pointer.tour_id)) {
                    (Ok(()), Some(tour)) => {
                        let index =
                            tour.position_of(&pointer.step_id).unwrap_or(pointer.step_index);
                        TourSession::new(tour, index)
                    }
                    (outcome, _) => {
                        // Fall back to the step saved alongside the pointer.
                        match resume::read_step(self.inner.store.as_ref(), &pointer.step_id)? {
                            Some(step) => {
                                warn!(
                                    target: "tour-controller",
                                    tour = %pointer.tour_id,
                                    step = %step.id,
                                    index = pointer.step_index,
                                    "tour data unavailable, resuming saved step only"
                                );
                                TourSession::from_saved_step(
                                    pointer.tour_id.clone(),
                                    pointer.scope.clone(),
                                    step,
                                    pointer.step_index,
                                )
                            }
                            None => {
                                outcome?;
                                return Err(ControllerError::UnknownTour(pointer.tour_id));
                            }
                        }
                    }
                }
            }
        };

        let index = session.position();
        if session.current_step_id().is_none() {
            warn!(
                target: "tour-controller",
                tour = %session.tour.id,
                index,
                "resume pointer outside the tour, discarding"
            );
            if let Err(err) = resume::clear_record(self.inner.store.as_ref(), &session.tour) {
                warn!(target: "tour-controller", error = %err, "failed to clear resume record");
            }
            return Ok(None);
        }
        self.inner.begin(session)?;
        info!(target: "tour-controller", index, "tour resumed");
        Ok(Some(index))
    }

    /// Advances to the next step, or completes the tour on the last one.
    pub fn next_step(&self) -> Result<TourState, ControllerError> {
        self.inner.next_step()
    }

    /// Goes back one step. No-op on the first step.
    pub fn previous_step(&self) -> Result<TourState, ControllerError> {
        self.inner.previous_step()
    }

    /// Ends the session. On the rendered final step this is a completion,
    /// anywhere else a quit.
    pub fn end_tour(&self) -> Result<TourState, ControllerError> {
        self.inner.end_tour()
    }

    pub fn handle_intent(&self, intent: TourIntent) -> Result<TourState, ControllerError> {
        match intent {
            TourIntent::Next => self.next_step(),
            TourIntent::Previous => self.previous_step(),
            TourIntent::Quit => self.end_tour(),
        }
    }

    /// Stops every timer and observation for a page unload. The resume
    /// record is left in place and no metric is emitted.
    pub fn shutdown(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.inner.state.lock();
            state.teardown();
            if let Some(session) = state.session.take() {
                debug!(target: "tour-controller", tour = %session.tour.id, "controller shut down");
                state.status = TourState::Idle;
                effects.push(Effect::State {
                    tour_id: Some(session.tour.id),
                    state: TourState::Idle,
                });
            }
        }
        self.inner.apply(effects);
    }
}

impl Inner {
    fn ensure_idle(&self) -> Result<(), ControllerError> {
        match &self.state.lock().session {
            Some(session) => Err(ControllerError::TourActive(session.tour.id.clone())),
            None => Ok(()),
        }
    }

    fn begin(self: &Arc<Self>, session: TourSession) -> Result<(), ControllerError> {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if let Some(active) = &state.session {
                return Err(ControllerError::TourActive(active.tour.id.clone()));
            }
            info!(
                target: "tour-controller",
                tour = %session.tour.id,
                steps = session.tour.len(),
                index = session.position(),
                partial = session.partial,
                "starting tour"
            );
            state.teardown();
            state.session = Some(session);
            self.enter_pre_validating(&mut state, &mut effects);
        }
        self.apply(effects);
        Ok(())
    }

    fn next_step(self: &Arc<Self>) -> Result<TourState, ControllerError> {
        let mut effects = Vec::new();
        let status = {
            let mut state = self.state.lock();
            let session = state.session.as_mut().ok_or(ControllerError::NoActiveTour)?;
            if session.is_final_step() {
                info!(target: "tour-controller", tour = %session.tour.id, "tour completed");
                self.finish(&mut state, TourState::Completed, StatusCode::Completed, None, &mut effects);
            } else if session.is_last_step() {
                warn!(
                    target: "tour-controller",
                    tour = %session.tour.id,
                    step = session.position(),
                    "remaining steps unavailable"
                );
                self.finish(
                    &mut state,
                    TourState::Failed(ErrorCode::FetchFailure),
                    StatusCode::FetchFailure,
                    Some(ErrorCode::FetchFailure),
                    &mut effects,
                );
            } else {
                effects.push(Effect::Metric(session.metric(StatusCode::Advanced, None)));
                session.step_index += 1;
                let index = session.step_index;
                if let Some(next) = session.tour.step(index) {
                    let location = self.host.location();
                    if !self.matcher.read().matches(&location, &next.route) {
                        if let Err(err) =
                            resume::write_record(self.store.as_ref(), &session.tour, index)
                        {
                            warn!(target: "tour-controller", error = %err, "failed to write resume record");
                        }
                    }
                }
                effects.push(Effect::Hide);
                self.enter_pre_validating(&mut state, &mut effects);
            }
            state.status
        };
        self.apply(effects);
        Ok(status)
    }

    fn previous_step(self: &Arc<Self>) -> Result<TourState, ControllerError> {
        let mut effects = Vec::new();
        let status = {
            let mut state = self.state.lock();
            let session = state.session.as_mut().ok_or(ControllerError::NoActiveTour)?;
            if session.step_index > 0 {
                session.step_index -= 1;
                effects.push(Effect::Hide);
                self.enter_pre_validating(&mut state, &mut effects);
            }
            state.status
        };
        self.apply(effects);
        Ok(status)
    }

    fn end_tour(self: &Arc<Self>) -> Result<TourState, ControllerError> {
        let mut effects = Vec::new();
        let status = {
            let mut state = self.state.lock();
            let session = state.session.as_ref().ok_or(ControllerError::NoActiveTour)?;
            let shown = matches!(
                state.status,
                TourState::Rendered(_) | TourState::PostValidating(_)
            );
            if shown && session.is_final_step() {
                self.finish(&mut state, TourState::Completed, StatusCode::Completed, None, &mut effects);
            } else {
                info!(target: "tour-controller", tour = %session.tour.id, step = session.position(), "tour quit");
                self.finish(&mut state, TourState::Quit, StatusCode::Quit, None, &mut effects);
            }
            state.status
        };
        self.apply(effects);
        Ok(status)
    }

    fn enter_pre_validating(self: &Arc<Self>, state: &mut ControllerState, effects: &mut Vec<Effect>) {
        state.observer.stop();
        let (epoch, token) = state.next_phase();
        let Some(session) = state.session.as_mut() else {
            return;
        };
        session.pre_render_polls = 0;
        session.navigation_mismatches = 0;
        session.resolved = None;
        let position = session.position();
        let tour_id = session.tour.id.clone();
        let Some(step) = session.tour.step(session.step_index).cloned() else {
            return;
        };
        debug!(target: "tour-controller", tour = %tour_id, step = %step.id, "pre-validating");
        state.status = TourState::PreValidating(position);
        effects.push(Effect::State {
            tour_id: Some(tour_id),
            state: state.status,
        });
        tokio::spawn(Arc::clone(self).pre_validate(epoch, token, step));
    }

    fn enter_post_validating(
        self: &Arc<Self>,
        state: &mut ControllerState,
        node: NodeId,
        effects: &mut Vec<Effect>,
    ) {
        let Some(session) = state.session.as_mut() else {
            return;
        };
        let index = session.position();
        let Some(step) = session.tour.step(session.step_index).cloned() else {
            return;
        };
        session.resolved = Some(node);
        let tour_id = session.tour.id.clone();
        effects.push(Effect::Metric(session.metric(StatusCode::Rendered, None)));

        info!(target: "tour-controller", tour = %tour_id, step = %step.id, ?node, "step rendered");
        state.status = TourState::Rendered(index);
        effects.push(Effect::State {
            tour_id: Some(tour_id.clone()),
            state: state.status,
        });
        effects.push(Effect::Render(step.clone(), node));

        let (epoch, token) = state.next_phase();
        let notify = Arc::new(Notify::new());
        let signal = Arc::clone(&notify);
        state.observer.observe(node, move |change| {
            trace!(target: "tour-controller", kinds = ?change.kinds, "target changed");
            signal.notify_one();
        });

        state.status = TourState::PostValidating(index);
        effects.push(Effect::State {
            tour_id: Some(tour_id),
            state: state.status,
        });
        tokio::spawn(Arc::clone(self).post_validate(epoch, token, step, node, notify));
    }

    /// Ends the session with `outcome`, releasing timers and resume keys.
    fn finish(
        &self,
        state: &mut ControllerState,
        outcome: TourState,
        status_code: StatusCode,
        error_code: Option<ErrorCode>,
        effects: &mut Vec<Effect>,
    ) {
        state.teardown();
        let Some(session) = state.session.take() else {
            return;
        };
        effects.push(Effect::Hide);
        effects.push(Effect::Metric(session.metric(status_code, error_code)));
        if let Err(err) = resume::clear_record(self.store.as_ref(), &session.tour) {
            warn!(target: "tour-controller", error = %err, "failed to clear resume record");
        }
        state.status = outcome;
        effects.push(Effect::State {
            tour_id: Some(session.tour.id),
            state: outcome,
        });
    }

    fn fail(&self, epoch: u64, status_code: StatusCode, error_code: ErrorCode) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            warn!(target: "tour-controller", status = ?status_code, error = ?error_code, "tour failed");
            self.finish(
                &mut state,
                TourState::Failed(error_code),
                status_code,
                Some(error_code),
                &mut effects,
            );
        }
        self.apply(effects);
    }

    fn check_step(&self, step: &Step) -> Check {
        let location = self.host.location();
        if !self.matcher.read().matches(&location, &step.route) {
            return Check::RouteMismatch;
        }
        match self.synth.resolve(&step.target) {
            Ok(Some(node)) => Check::Found(node),
            Ok(None) => Check::Missing,
            Err(err) if err.is_boundary() => {
                warn!(target: "tour-controller", step = %step.id, error = %err, "target behind a boundary");
                Check::Boundary
            }
            Err(err) => {
                debug!(target: "tour-controller", step = %step.id, error = %err, "target did not resolve");
                Check::Missing
            }
        }
    }

    async fn pre_validate(self: Arc<Self>, epoch: u64, token: CancellationToken, step: Step) {
        let validation = self.policy.validation_for(&step.overrides);
        let mut ticker = interval(validation.pre_render_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut route_misses = 0u32;
        let mut element_misses = 0u32;

        loop {
            select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let check = self.check_step(&step);

            let mut effects = Vec::new();
            let done = {
                let mut state = self.state.lock();
                if state.epoch != epoch {
                    return;
                }
                let Some(session) = state.session.as_mut() else {
                    return;
                };
                session.pre_render_polls += 1;
                match check {
                    Check::Found(node) => {
                        self.enter_post_validating(&mut state, node, &mut effects);
                        true
                    }
                    Check::Boundary => {
                        self.finish(
                            &mut state,
                            TourState::Failed(ErrorCode::CrossOriginBoundary),
                            StatusCode::BoundaryFailure,
                            Some(ErrorCode::CrossOriginBoundary),
                            &mut effects,
                        );
                        true
                    }
                    Check::RouteMismatch => {
                        route_misses += 1;
                        session.navigation_mismatches = route_misses;
                        if route_misses >= validation.route_mismatch_ticks {
                            warn!(target: "tour-controller", step = %step.id, ticks = route_misses, "route never matched");
                            self.finish(
                                &mut state,
                                TourState::Failed(ErrorCode::NavigationMismatch),
                                StatusCode::NavigationFailure,
                                Some(ErrorCode::NavigationMismatch),
                                &mut effects,
                            );
                            true
                        } else {
                            false
                        }
                    }
                    Check::Missing => {
                        route_misses = 0;
                        session.navigation_mismatches = 0;
                        element_misses += 1;
                        if element_misses >= validation.element_missing_ticks {
                            warn!(target: "tour-controller", step = %step.id, ticks = element_misses, "target never appeared");
                            self.finish(
                                &mut state,
                                TourState::Failed(ErrorCode::TargetNotFound),
                                StatusCode::ElementFailure,
                                Some(ErrorCode::TargetNotFound),
                                &mut effects,
                            );
                            true
                        } else {
                            false
                        }
                    }
                }
            };
            self.apply(effects);
            if done {
                return;
            }
        }
    }

    async fn post_validate(
        self: Arc<Self>,
        epoch: u64,
        token: CancellationToken,
        step: Step,
        node: NodeId,
        notify: Arc<Notify>,
    ) {
        let validation = self.policy.validation_for(&step.overrides);
        let period = validation.post_render_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut missing = 0u32;

        loop {
            let timed = select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => true,
                _ = notify.notified() => false,
            };

            let failure = match self.check_step(&step) {
                Check::Found(current) if current == node => {
                    missing = 0;
                    None
                }
                Check::Found(current) => {
                    warn!(target: "tour-controller", step = %step.id, ?node, ?current, "target reference changed");
                    Some((StatusCode::ReferenceFailure, ErrorCode::TargetReferenceChanged))
                }
                Check::RouteMismatch => Some((StatusCode::NavigationFailure, ErrorCode::NavigationMismatch)),
                Check::Boundary => Some((StatusCode::BoundaryFailure, ErrorCode::CrossOriginBoundary)),
                Check::Missing => {
                    if timed {
                        missing += 1;
                    }
                    if missing == 0 || missing < validation.post_missing_ticks {
                        None
                    } else {
                        let keep = select! {
                            biased;
                            _ = token.cancelled() => return,
                            keep = self.prompt.keep_waiting(&step) => keep,
                        };
                        if keep {
                            info!(target: "tour-controller", step = %step.id, "still waiting for target");
                            missing = 0;
                            None
                        } else {
                            Some((StatusCode::ElementFailure, ErrorCode::TargetDisappeared))
                        }
                    }
                }
            };

            if let Some((status_code, error_code)) = failure {
                self.fail(epoch, status_code, error_code);
                return;
            }
        }
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Render(step, node) => self.renderer.render_step(&step, node),
                Effect::Hide => self.renderer.hide_step(),
                Effect::Metric(metric) => {
                    self.metrics.emit(&metric);
                    self.events.publish(TourEvent::Metric(metric));
                }
                Effect::State { tour_id, state } => {
                    self.events.publish(TourEvent::StateChanged { tour_id, state });
                }
            }
        }
    }
}
