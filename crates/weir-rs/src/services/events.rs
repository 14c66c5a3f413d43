use crate::models::decision::DecisionEvent;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Running aggregate over all decisions since startup.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSummary {
    pub total: u64,
    pub allowed: u64,
    pub rejected: u64,
    pub queued: u64,
    /// Admissions granted while the shared store was unreachable.
    pub fail_open: u64,
}

/// Snapshot delivered to a subscriber before live events.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub summary: TrafficSummary,
    /// Most recent decisions, oldest first.
    pub recent: Vec<DecisionEvent>,
}

/// Wire messages on the decision event stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamMessage {
    Snapshot(SnapshotPayload),
    Summary(TrafficSummary),
    Traffic(DecisionEvent),
}

struct HubState {
    recent: VecDeque<DecisionEvent>,
    summary: TrafficSummary,
}

/// Bounded multi-producer, multi-consumer broadcast of decision events.
///
/// Built on `tokio::sync::broadcast`, which already gives the required
/// backpressure shape: every subscriber sees every event unless it lags,
/// in which case its oldest pending events are dropped and delivery
/// continues. Publishing never blocks the request path.
pub struct DecisionHub {
    sender: broadcast::Sender<StreamMessage>,
    state: RwLock<HubState>,
    snapshot_len: usize,
}

impl DecisionHub {
    /// `buffer` is the per-subscriber channel capacity; `snapshot_len` the
    /// number of recent events replayed on subscribe.
    pub fn new(buffer: usize, snapshot_len: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            state: RwLock::new(HubState {
                recent: VecDeque::with_capacity(snapshot_len),
                summary: TrafficSummary::default(),
            }),
            snapshot_len: snapshot_len.max(1),
        }
    }

    /// Publishes one decision to all subscribers and folds it into the
    /// snapshot state. Lock scope is a few field updates; no I/O.
    pub fn publish(&self, event: DecisionEvent) {
        {
            let mut state = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.summary.total += 1;
            if event.allowed {
                state.summary.allowed += 1;
            } else {
                state.summary.rejected += 1;
            }
            if event.queued {
                state.summary.queued += 1;
            }

            if state.recent.len() == self.snapshot_len {
                state.recent.pop_front();
            }
            state.recent.push_back(event.clone());
        }

        // No receivers is not an error; the stream is best-effort.
        if self.sender.send(StreamMessage::Traffic(event)).is_err() {
            trace!("decision event dropped: no subscribers");
        }
    }

    /// Records a fail-open admission in the aggregate.
    pub fn record_fail_open(&self) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.summary.fail_open += 1;
    }

    /// Registers a subscriber: returns the snapshot to deliver first and
    /// the live receiver.
    pub fn subscribe(&self) -> (StreamMessage, broadcast::Receiver<StreamMessage>) {
        let receiver = self.sender.subscribe();
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let snapshot = StreamMessage::Snapshot(SnapshotPayload {
            summary: state.summary.clone(),
            recent: state.recent.iter().cloned().collect(),
        });
        (snapshot, receiver)
    }

    /// Current aggregate, for the periodic summary push.
    pub fn summary(&self) -> TrafficSummary {
        match self.state.read() {
            Ok(guard) => guard.summary.clone(),
            Err(poisoned) => poisoned.into_inner().summary.clone(),
        }
    }
}
