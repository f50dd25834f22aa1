//! Package-level readiness tracking
//!
//! Maintains the current status of a required resource set and exposes three
//! single-subscriber channels: every distinct change, a one-shot readiness
//! signal, and a final report once the change stream ends.

use std::collections::HashMap;

use tokio::sync::mpsc;

use kubepack_model::ResourceRef;

use crate::condition::ConditionStatus;
use crate::emitter::{ResourceStatus, StatusEvent};

/// Status every tracked resource starts out with
pub fn initial_status() -> ConditionStatus {
    ConditionStatus {
        ready: false,
        description: "awaiting status update".to_string(),
    }
}

/// A required resource with its most recently observed status
#[derive(Debug, Clone)]
pub struct TrackedResource {
    pub resource: ResourceRef,
    pub status: ConditionStatus,
    pub required: bool,
}

/// Final whole-package verdict delivered when the change stream ends
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub ready: bool,
    pub resources: Vec<TrackedResource>,
}

/// The tracker's subscriber channels
/// - `changes` forwards every distinct status event, required or not
/// - `ready` delivers a single `true` the moment all required resources are
///   simultaneously ready, then closes
/// - `result` delivers the final report when the input closes
pub struct Tracker<E> {
    pub changes: mpsc::Receiver<StatusEvent<E>>,
    pub ready: mpsc::Receiver<bool>,
    pub result: mpsc::Receiver<StatusReport>,
}

/// Spawns a tracker over the emitter's output
pub fn track<E: Send + 'static>(
    required: Vec<ResourceRef>,
    mut input: mpsc::Receiver<StatusEvent<E>>,
) -> Tracker<E> {
    let (change_tx, changes) = mpsc::channel(1);
    let (ready_tx, ready) = mpsc::channel(1);
    let (result_tx, result) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut state = TrackerState::new(required);
        let mut ready_tx = Some(ready_tx);
        while let Some(event) = input.recv().await {
            let fire = match &event {
                Ok(status) => state.update(status),
                Err(_) => false,
            };
            if change_tx.send(event).await.is_err() {
                return;
            }
            if fire {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(true).await;
                }
            }
        }
        drop(change_tx);
        let _ = result_tx.send(state.report()).await;
    });

    Tracker {
        changes,
        ready,
        result,
    }
}

struct TrackerState {
    resources: HashMap<String, TrackedResource>,
    order: Vec<String>,
    required: usize,
    ready: usize,
    found: usize,
    fired: bool,
}

impl TrackerState {
    fn new(required: Vec<ResourceRef>) -> Self {
        let mut resources = HashMap::new();
        let mut order = Vec::with_capacity(required.len());
        for r in required {
            let key = r.id();
            if !resources.contains_key(&key) {
                order.push(key.clone());
            }
            resources.insert(
                key,
                TrackedResource {
                    resource: r,
                    status: initial_status(),
                    required: true,
                },
            );
        }
        let required = order.len();
        Self {
            resources,
            order,
            required,
            ready: 0,
            found: 0,
            fired: false,
        }
    }

    /// Applies one status event. Returns true when this event made the whole
    /// required set ready for the first time.
    fn update(&mut self, event: &ResourceStatus) -> bool {
        let Some(tracked) = self.resources.get_mut(&event.resource.id()) else {
            // Not part of the required set, forwarded but not aggregated
            return false;
        };
        if tracked.status == initial_status() {
            self.found += 1;
            if self.found == self.required {
                tracing::debug!("observed status of all {} required resources", self.required);
            }
        }
        let was_ready = tracked.status.ready;
        tracked.status = event.status.clone();
        if event.status.ready == was_ready {
            return false;
        }
        if event.status.ready {
            self.ready += 1;
        } else {
            self.ready -= 1;
        }
        if self.ready == self.required && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            ready: self.ready == self.required,
            resources: self
                .order
                .iter()
                .map(|key| self.resources[key].clone())
                .collect(),
        }
    }
}
