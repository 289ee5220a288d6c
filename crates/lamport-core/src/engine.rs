//! Per-node protocol state machine.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods never perform I/O; they return `Vec<NodeAction>`
//! - The caller sends messages and wakes waiters as instructed
//! - One instance per node, accessed behind one lock by the runtime
//!
//! # State Machine
//!
//! ```text
//!            request()                try_enter() == true
//! ┌──────┐ ───────────> ┌────────────┐ ─────────────────> ┌───────────────────┐
//! │ Idle │              │ Requesting │                    │ InCriticalSection │
//! └──────┘ <─────────────────────────────────────────────── └───────────────────┘
//!                                 release()
//! ```
//!
//! Inbound REQUEST, REPLY and RELEASE are accepted in every state. While
//! `Requesting`, a REQUEST ordered after the local one is deferred until the
//! local release; every other REQUEST is granted immediately.
//!
//! # Entry predicate
//!
//! `Requesting`, every peer has replied, and the ledger's minimum record is
//! the local request. Replies prove every peer saw the request; ledger order
//! proves no earlier request is still outstanding.

use std::collections::BTreeSet;

use lamport_proto::{Message, MessageKind, NodeId, Timestamp};
use tracing::{debug, info, warn};

use crate::{
    clock::LamportClock,
    error::EngineError,
    ledger::{RequestLedger, RequestRecord},
    replies::{DeferredReplies, ReplyTracker},
};

/// Where the node is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Not interested in the critical section
    Idle,
    /// REQUEST broadcast, waiting for the entry predicate
    Requesting,
    /// Inside the critical section
    InCriticalSection,
}

/// Effect the runtime must carry out on behalf of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Send `message` to peer `to`
    Send {
        /// Destination peer
        to: NodeId,
        /// Message to deliver
        message: Message,
    },

    /// State relevant to the entry predicate changed; re-evaluate it
    Wake,
}

/// Protocol engine for one node.
#[derive(Debug, Clone)]
pub struct Engine {
    id: NodeId,
    peers: BTreeSet<NodeId>,
    clock: LamportClock,
    ledger: RequestLedger,
    replies: ReplyTracker,
    deferred: DeferredReplies,
    state: NodeState,
    own_request: Option<RequestRecord>,
}

impl Engine {
    /// Create an idle engine with clock zero.
    ///
    /// `peers` is every other node in the cluster.
    ///
    /// # Errors
    ///
    /// `SelfPeer` if `peers` contains `id`.
    pub fn new(id: NodeId, peers: impl IntoIterator<Item = NodeId>) -> Result<Self, EngineError> {
        let peers: BTreeSet<NodeId> = peers.into_iter().collect();
        if peers.contains(&id) {
            return Err(EngineError::SelfPeer(id));
        }

        Ok(Self {
            id,
            replies: ReplyTracker::new(peers.clone()),
            peers,
            clock: LamportClock::new(),
            ledger: RequestLedger::new(),
            deferred: DeferredReplies::new(),
            state: NodeState::Idle,
            own_request: None,
        })
    }

    /// Local node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Every other node.
    pub fn peers(&self) -> &BTreeSet<NodeId> {
        &self.peers
    }

    /// Current state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Current clock value.
    pub fn clock(&self) -> Timestamp {
        self.clock.value()
    }

    /// The local request of the current cycle.
    pub fn own_request(&self) -> Option<RequestRecord> {
        self.own_request
    }

    /// Outstanding requests known to this node.
    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    /// Peers that granted the current request.
    pub fn replies(&self) -> &ReplyTracker {
        &self.replies
    }

    /// Peers whose reply is withheld.
    pub fn deferred(&self) -> &DeferredReplies {
        &self.deferred
    }

    /// Start a request cycle: `Idle -> Requesting`.
    ///
    /// Returns one REQUEST per peer.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Idle`.
    pub fn request(&mut self) -> Result<Vec<NodeAction>, EngineError> {
        if self.state != NodeState::Idle {
            return Err(EngineError::InvalidState { state: self.state, operation: "request" });
        }

        let timestamp = self.clock.tick();
        let record = RequestRecord::new(timestamp, self.id);
        self.own_request = Some(record);
        self.ledger.insert(record);
        self.replies.clear();
        self.deferred.clear();
        self.state = NodeState::Requesting;

        info!(node = %self.id, clock = %self.clock.value(), ledger = %self.ledger, "broadcasting REQUEST");

        Ok(self.broadcast(Message::request(timestamp, self.id)))
    }

    /// Apply an inbound message.
    ///
    /// The clock observes the timestamp before anything else. Messages from
    /// the local id or from outside the peer set are then dropped. A message
    /// stamped [`Timestamp::MAX`] is dropped without touching the clock.
    pub fn handle_message(&mut self, message: &Message) -> Vec<NodeAction> {
        if message.timestamp == Timestamp::MAX {
            warn!(node = %self.id, clock = %self.clock.value(), %message, "dropping message with exhausted timestamp");
            return Vec::new();
        }
        self.clock.observe(message.timestamp);

        let from = message.sender;
        if from == self.id || !self.peers.contains(&from) {
            warn!(node = %self.id, clock = %self.clock.value(), %message, "ignoring message from unknown peer");
            return Vec::new();
        }

        match message.kind {
            MessageKind::Request => self.on_request(message.timestamp, from),
            MessageKind::Reply => self.on_reply(from),
            MessageKind::Release => self.on_release(message.timestamp, from),
        }
    }

    fn on_request(&mut self, timestamp: Timestamp, from: NodeId) -> Vec<NodeAction> {
        let theirs = RequestRecord::new(timestamp, from);
        self.ledger.insert(theirs);

        info!(
            node = %self.id,
            clock = %self.clock.value(),
            ledger = %self.ledger,
            "received REQUEST from node {from} (ts={timestamp})"
        );

        let grant_now = match (self.state, self.own_request) {
            (NodeState::Requesting, Some(mine)) => theirs.precedes(&mine),
            _ => true,
        };

        let mut actions = Vec::with_capacity(2);
        if grant_now {
            info!(node = %self.id, clock = %self.clock.value(), "sending REPLY to node {from}");
            actions.push(NodeAction::Send { to: from, message: Message::reply(self.clock.value(), self.id) });
        } else {
            self.deferred.defer(from);
            info!(node = %self.id, clock = %self.clock.value(), "deferring REPLY to node {from}");
        }

        // A replaced record may have been the one ahead of ours.
        if self.state == NodeState::Requesting {
            actions.push(NodeAction::Wake);
        }
        actions
    }

    fn on_reply(&mut self, from: NodeId) -> Vec<NodeAction> {
        self.replies.record(from);

        info!(
            node = %self.id,
            clock = %self.clock.value(),
            replies = self.replies.len(),
            peers = self.peers.len(),
            "received REPLY from node {from}"
        );

        self.wake_if_requesting()
    }

    fn on_release(&mut self, timestamp: Timestamp, from: NodeId) -> Vec<NodeAction> {
        // A RELEASE only retires a request issued before it. A late RELEASE
        // must not drop the sender's next request.
        if self.ledger.get(from).is_some_and(|record| record.timestamp < timestamp) {
            self.ledger.remove(from);
        } else {
            debug!(node = %self.id, clock = %self.clock.value(), "RELEASE from node {from} (ts={timestamp}) matched no request");
        }

        info!(node = %self.id, clock = %self.clock.value(), ledger = %self.ledger, "received RELEASE from node {from}");

        self.wake_if_requesting()
    }

    fn wake_if_requesting(&self) -> Vec<NodeAction> {
        if self.state == NodeState::Requesting { vec![NodeAction::Wake] } else { Vec::new() }
    }

    /// The entry predicate.
    pub fn can_enter(&self) -> bool {
        self.state == NodeState::Requesting
            && self.replies.is_complete()
            && self.own_request.is_some()
            && self.ledger.peek_min().copied() == self.own_request
    }

    /// `Requesting -> InCriticalSection` if the entry predicate holds.
    ///
    /// Returns whether the transition happened.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Requesting`.
    pub fn try_enter(&mut self) -> Result<bool, EngineError> {
        if self.state != NodeState::Requesting {
            return Err(EngineError::InvalidState { state: self.state, operation: "enter" });
        }
        if !self.can_enter() {
            return Ok(false);
        }

        self.state = NodeState::InCriticalSection;
        info!(node = %self.id, clock = %self.clock.value(), ">>> entering critical section <<<");
        Ok(true)
    }

    /// Leave the critical section: `InCriticalSection -> Idle`.
    ///
    /// Returns one RELEASE per peer followed by every deferred REPLY.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `InCriticalSection`.
    pub fn release(&mut self) -> Result<Vec<NodeAction>, EngineError> {
        if self.state != NodeState::InCriticalSection {
            return Err(EngineError::InvalidState { state: self.state, operation: "release" });
        }

        let timestamp = self.clock.tick();
        self.ledger.remove(self.id);
        self.own_request = None;

        info!(node = %self.id, clock = %self.clock.value(), ledger = %self.ledger, "<<< exiting critical section >>>, broadcasting RELEASE");

        let mut actions = self.broadcast(Message::release(timestamp, self.id));
        for peer in self.deferred.drain() {
            info!(node = %self.id, clock = %self.clock.value(), "sending deferred REPLY to node {peer}");
            actions.push(NodeAction::Send {
                to: peer,
                message: Message::reply(self.clock.value(), self.id),
            });
        }

        self.replies.clear();
        self.state = NodeState::Idle;
        Ok(actions)
    }

    fn broadcast(&self, message: Message) -> Vec<NodeAction> {
        self.peers.iter().map(|&to| NodeAction::Send { to, message }).collect()
    }
}
