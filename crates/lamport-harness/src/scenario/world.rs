//! Final state of a scenario run.

use std::collections::BTreeMap;

use lamport_core::{
    event::{EventKind, EventRecord, Interval, intervals},
    node::NodeSnapshot,
};
use lamport_proto::{MessageKind, NodeId};

use crate::tap::{MessageLog, SentMessage};

/// Everything an oracle can inspect after a run.
pub struct World {
    events: Vec<EventRecord>,
    snapshots: BTreeMap<NodeId, NodeSnapshot>,
    log: MessageLog,
}

impl World {
    /// Assemble a world from the shared event history, per-node snapshots
    /// and the outbound message log.
    pub fn new(
        events: Vec<EventRecord>,
        snapshots: BTreeMap<NodeId, NodeSnapshot>,
        log: MessageLog,
    ) -> Self {
        Self { events, snapshots, log }
    }

    /// Shared critical-section history in append order.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Completed critical sections in exit order.
    pub fn intervals(&self) -> Vec<Interval> {
        intervals(&self.events)
    }

    /// Nodes in the order they entered, one entry per critical section.
    pub fn entry_order(&self) -> Vec<NodeId> {
        self.events
            .iter()
            .filter(|record| record.kind == EventKind::Entered)
            .map(|record| record.node)
            .collect()
    }

    /// Final snapshot of `node`.
    pub fn snapshot(&self, node: NodeId) -> Option<&NodeSnapshot> {
        self.snapshots.get(&node)
    }

    /// All final snapshots.
    pub fn snapshots(&self) -> impl Iterator<Item = &NodeSnapshot> {
        self.snapshots.values()
    }

    /// Every send attempt, in order.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.log.entries()
    }

    /// Send attempts by `node`.
    pub fn sent_by(&self, node: NodeId) -> Vec<SentMessage> {
        self.log.sent_by(node)
    }

    /// Number of `kind` messages `node` tried to send.
    pub fn sent_count(&self, node: NodeId, kind: MessageKind) -> usize {
        self.log.count(node, kind)
    }
}
