//! Change tracking for the element a step is pointing at.
//!
//! One [`TargetObserver`] follows one node at a time and combines three
//! detectors:
//! - structural changes anywhere inside the node
//! - size changes of the node
//! - a position poll that reports only when top/left actually moved
//!
//! Mutation and resize notifications are debounced so a burst produces a
//! single callback. Position changes are reported as soon as the poll sees them.

use std::sync::Arc;
use std::time::Duration;

use page_dom::{DomChange, DomHost, NodeId};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tourguide_core_types::Rect;
use tourguide_policy_center::ObserverPolicy;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    /// Children or attributes changed inside the node.
    Mutated,
    Resized,
    /// Top or left differ from the last poll.
    Moved,
    /// The node left the page.
    Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetChange {
    pub node: NodeId,
    /// Distinct kinds coalesced into this notification, sorted.
    pub kinds: Vec<ChangeKind>,
    /// Geometry at notification time, `None` once detached.
    pub rect: Option<Rect>,
}

impl TargetChange {
    pub fn has(&self, kind: ChangeKind) -> bool {
        self.kinds.contains(&kind)
    }
}

pub type ChangeCallback = Arc<dyn Fn(TargetChange) + Send + Sync>;

/// Watches a single node. Dropping the observer stops it.
pub struct TargetObserver {
    host: Arc<dyn DomHost>,
    poll: Duration,
    debounce: Duration,
    target: Option<NodeId>,
    task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl TargetObserver {
    pub fn new(host: Arc<dyn DomHost>, policy: &ObserverPolicy) -> Self {
        Self::with_intervals(host, policy.position_poll(), policy.debounce())
    }

    pub fn with_intervals(host: Arc<dyn DomHost>, poll: Duration, debounce: Duration) -> Self {
        Self {
            host,
            poll: poll.max(Duration::from_millis(1)),
            debounce,
            target: None,
            task: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn is_observing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts watching `node`, tearing down any previous observation first.
    /// Must be called inside a tokio runtime.
    pub fn observe<F>(&mut self, node: NodeId, on_changed: F)
    where
        F: Fn(TargetChange) + Send + Sync + 'static,
    {
        self.stop();
        let shutdown = CancellationToken::new();
        self.shutdown = shutdown.clone();
        self.target = Some(node);

        // Subscribe and sample geometry before returning so no change made
        // after `observe` is missed.
        let host = Arc::clone(&self.host);
        let rx = host.changes();
        let initial = host.bounding_rect(node);
        let watch = Watch {
            host,
            node,
            poll: self.poll,
            debounce: self.debounce,
            on_changed: Arc::new(on_changed),
        };
        self.task = Some(tokio::spawn(watch.run(rx, initial, shutdown)));
        debug!(target: "target-observer", ?node, "observing target");
    }

    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
        if let Some(node) = self.target.take() {
            debug!(target: "target-observer", ?node, "observation stopped");
        }
    }
}

impl Drop for TargetObserver {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

struct Watch {
    host: Arc<dyn DomHost>,
    node: NodeId,
    poll: Duration,
    debounce: Duration,
    on_changed: ChangeCallback,
}

impl Watch {
    async fn run(
        self,
        mut rx: tokio::sync::broadcast::Receiver<DomChange>,
        mut last_rect: Option<Rect>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + self.poll, self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: Vec<ChangeKind> = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let flush_at = deadline;
            let flush = async move {
                match flush_at {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            select! {
                _ = shutdown.cancelled() => break,
                _ = flush => {
                    deadline = None;
                    self.notify(std::mem::take(&mut pending));
                }
                _ = ticker.tick() => {
                    let rect = self.host.bounding_rect(self.node);
                    if let (Some(previous), Some(current)) = (last_rect, rect) {
                        if !previous.same_position(&current) {
                            trace!(target: "target-observer", node = ?self.node, ?current, "target moved");
                            self.notify(vec![ChangeKind::Moved]);
                        }
                    }
                    if rect.is_some() {
                        last_rect = rect;
                    }
                }
                event = rx.recv() => {
                    let kind = match event {
                        Ok(change) => self.classify(&change),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: "target-observer", skipped, "dom change stream lagged");
                            Some(ChangeKind::Mutated)
                        }
                        Err(RecvError::Closed) => {
                            debug!(target: "target-observer", "dom change stream closed");
                            break;
                        }
                    };
                    if let Some(kind) = kind {
                        if !pending.contains(&kind) {
                            pending.push(kind);
                        }
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
            }
        }
    }

    fn classify(&self, change: &DomChange) -> Option<ChangeKind> {
        let host = self.host.as_ref();
        match change {
            DomChange::ChildList { target } | DomChange::Attributes { target, .. }
                if host.contains(self.node, *target) =>
            {
                Some(ChangeKind::Mutated)
            }
            DomChange::Resized { target } if *target == self.node => Some(ChangeKind::Resized),
            DomChange::Detached { target } if host.contains(*target, self.node) => {
                Some(ChangeKind::Detached)
            }
            _ => None,
        }
    }

    fn notify(&self, mut kinds: Vec<ChangeKind>) {
        if kinds.is_empty() {
            return;
        }
        kinds.sort();
        let change = TargetChange {
            node: self.node,
            kinds,
            rect: self.host.bounding_rect(self.node),
        };
        debug!(target: "target-observer", node = ?change.node, kinds = ?change.kinds, "target changed");
        (self.on_changed)(change);
    }
}
