//! Concurrent node runtime.
//!
//! A [`Node`] owns exactly one [`Engine`] behind one lock. Inbound handlers
//! and the local acquisition cycle take the lock only to mutate the engine;
//! every network send happens after the lock is released.
//!
//! The acquiring task sleeps on a [`Notify`] that handlers fire whenever a
//! REPLY, RELEASE or REQUEST changed what the entry predicate sees. The
//! waiter registers for the signal before it evaluates the predicate, so a
//! signal fired between the check and the sleep is never lost.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use lamport_proto::{Message, NodeId, Timestamp};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::{
    engine::{Engine, NodeAction, NodeState},
    env::Environment,
    error::NodeError,
    event::{EventKind, EventRecord, EventSink},
    ledger::RequestRecord,
    transport::MessageTransport,
};

/// Point-in-time copy of a node's protocol state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// Node id
    pub id: NodeId,
    /// Cycle state
    pub state: NodeState,
    /// Clock value
    pub clock: Timestamp,
    /// Local request of the current cycle
    pub own_request: Option<RequestRecord>,
    /// Ledger in priority order
    pub ledger: Vec<RequestRecord>,
    /// Peers that granted the current request
    pub replies: Vec<NodeId>,
    /// Peers whose reply is withheld
    pub deferred: Vec<NodeId>,
}

/// One peer of the cluster.
pub struct Node<T, E> {
    id: NodeId,
    engine: Mutex<Engine>,
    wake: Notify,
    transport: T,
    env: E,
    events: Arc<dyn EventSink>,
}

impl<T, E> Node<T, E>
where
    T: MessageTransport,
    E: Environment,
{
    /// Wrap `engine`, sending through `transport` and recording entries and
    /// exits in `events`.
    pub fn new(engine: Engine, transport: T, env: E, events: Arc<dyn EventSink>) -> Self {
        Self { id: engine.id(), engine: Mutex::new(engine), wake: Notify::new(), transport, env, events }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Environment the node runs in.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Outbound transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn engine(&self) -> Result<MutexGuard<'_, Engine>, NodeError> {
        self.engine.lock().map_err(|_| NodeError::Poisoned)
    }

    /// Current cycle state.
    pub fn state(&self) -> Result<NodeState, NodeError> {
        Ok(self.engine()?.state())
    }

    /// Current clock value.
    pub fn clock(&self) -> Result<Timestamp, NodeError> {
        Ok(self.engine()?.clock())
    }

    /// Consistent copy of the protocol state.
    pub fn snapshot(&self) -> Result<NodeSnapshot, NodeError> {
        let engine = self.engine()?;
        Ok(NodeSnapshot {
            id: self.id,
            state: engine.state(),
            clock: engine.clock(),
            own_request: engine.own_request(),
            ledger: engine.ledger().iter().copied().collect(),
            replies: engine.replies().iter().collect(),
            deferred: engine.deferred().iter().collect(),
        })
    }

    /// Apply an inbound message and carry out the resulting sends.
    ///
    /// Returns the clock value right after the message was applied.
    pub async fn handle_message(&self, message: Message) -> Result<Timestamp, NodeError> {
        let (actions, clock) = {
            let mut engine = self.engine()?;
            let actions = engine.handle_message(&message);
            (actions, engine.clock())
        };

        self.execute(actions).await;
        Ok(clock)
    }

    /// Broadcast REQUEST and wait until the entry predicate holds.
    ///
    /// Blocks indefinitely if a peer never replies: there is no timeout and
    /// no way to withdraw a request.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Idle`.
    pub async fn acquire(&self) -> Result<(), NodeError> {
        let actions = self.engine()?.request()?;
        self.execute(actions).await;

        info!(node = %self.id, clock = %self.clock()?, "waiting for all REPLIES and ledger order");

        loop {
            let notified = self.wake.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            let entered = {
                let mut engine = self.engine()?;
                if engine.try_enter()? { Some(engine.clock()) } else { None }
            };

            if let Some(clock) = entered {
                self.record(EventKind::Entered, clock);
                return Ok(());
            }

            notified.await;
        }
    }

    /// Leave the critical section: record the exit, broadcast RELEASE, then
    /// send every deferred REPLY.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `InCriticalSection`.
    pub async fn release(&self) -> Result<(), NodeError> {
        let (actions, clock) = {
            let mut engine = self.engine()?;
            let actions = engine.release()?;
            (actions, engine.clock())
        };

        self.record(EventKind::Exited, clock);
        self.execute(actions).await;
        Ok(())
    }

    /// Acquire, run `section` exactly once, release.
    ///
    /// `section` must not start another cycle on this node; doing so fails
    /// with `InvalidState`.
    pub async fn run_critical_section<F, Fut>(&self, section: F) -> Result<Fut::Output, NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.acquire().await?;
        let output = section().await;
        self.release().await?;
        Ok(output)
    }

    fn record(&self, kind: EventKind, clock: Timestamp) {
        self.events.record(EventRecord { node: self.id, kind, clock, at: self.env.wall_clock() });
    }

    async fn execute(&self, actions: Vec<NodeAction>) {
        if actions.contains(&NodeAction::Wake) {
            self.wake.notify_waiters();
        }

        for action in actions {
            let NodeAction::Send { to, message } = action else {
                continue;
            };
            if let Err(error) = self.transport.send(to, message).await {
                warn!(node = %self.id, peer = %to, %message, %error, "send failed, message dropped");
            }
        }
    }
}
