//! In-process network of real nodes.
//!
//! Every [`LoopbackTransport`] send calls the target node's
//! `handle_message` directly, so a send completes only after the receiver
//! has applied the message and issued its own sends. Links can be delayed
//! by random jitter, paused (messages wait until resumed) or cut (sends
//! fail).

use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use async_trait::async_trait;
use lamport_core::{
    engine::Engine,
    env::Environment,
    error::{EngineError, TransportError},
    event::EventSink,
    node::Node,
    transport::MessageTransport,
};
use lamport_proto::{Message, NodeId};
use tokio::sync::Notify;
use tracing::trace;

/// Node type hosted by a [`LoopbackNetwork`].
pub type LoopbackNode<E> = Node<LoopbackTransport<E>, E>;

type Link = (NodeId, NodeId);

#[derive(Default)]
struct Links {
    paused: BTreeSet<Link>,
    cut: BTreeSet<Link>,
}

struct Registry<E: Environment> {
    nodes: Mutex<BTreeMap<NodeId, Weak<LoopbackNode<E>>>>,
    links: Mutex<Links>,
    resumed: Notify,
    jitter: Duration,
    env: E,
}

impl<E: Environment> Registry<E> {
    fn links(&self) -> MutexGuard<'_, Links> {
        match self.links.lock() {
            Ok(links) => links,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lookup(&self, id: NodeId) -> Option<Arc<LoopbackNode<E>>> {
        let nodes = match self.nodes.lock() {
            Ok(nodes) => nodes,
            Err(poisoned) => poisoned.into_inner(),
        };
        nodes.get(&id).and_then(Weak::upgrade)
    }

    async fn wait_while_paused(&self, link: Link) {
        loop {
            let resumed = self.resumed.notified();
            let mut resumed = std::pin::pin!(resumed);
            resumed.as_mut().enable();

            if !self.links().paused.contains(&link) {
                return;
            }
            resumed.await;
        }
    }
}

/// Shared registry and fault controls for a set of loopback nodes.
pub struct LoopbackNetwork<E: Environment> {
    registry: Arc<Registry<E>>,
}

impl<E: Environment> LoopbackNetwork<E> {
    /// Network without delivery jitter.
    pub fn new(env: E) -> Self {
        Self::with_jitter(env, Duration::ZERO)
    }

    /// Network delaying each delivery by a random duration up to `jitter`.
    pub fn with_jitter(env: E, jitter: Duration) -> Self {
        Self {
            registry: Arc::new(Registry {
                nodes: Mutex::new(BTreeMap::new()),
                links: Mutex::new(Links::default()),
                resumed: Notify::new(),
                jitter,
                env,
            }),
        }
    }

    /// Create and register node `id` with the given peers.
    ///
    /// The network keeps only a weak reference; the caller owns the node.
    pub fn add_node(
        &self,
        id: NodeId,
        peers: impl IntoIterator<Item = NodeId>,
        events: Arc<dyn EventSink>,
    ) -> Result<Arc<LoopbackNode<E>>, EngineError> {
        let engine = Engine::new(id, peers)?;
        let transport = LoopbackTransport { from: id, registry: Arc::clone(&self.registry) };
        let node = Arc::new(Node::new(engine, transport, self.registry.env.clone(), events));

        let mut nodes = match self.registry.nodes.lock() {
            Ok(nodes) => nodes,
            Err(poisoned) => poisoned.into_inner(),
        };
        nodes.insert(id, Arc::downgrade(&node));
        Ok(node)
    }

    /// Fully connected cluster of nodes `1..=size`, all sharing `events`.
    pub fn cluster(
        &self,
        size: u64,
        events: Arc<dyn EventSink>,
    ) -> Result<Vec<Arc<LoopbackNode<E>>>, EngineError> {
        let ids: Vec<NodeId> = (1..=size).map(NodeId::new).collect();
        ids.iter()
            .map(|&id| {
                let peers = ids.iter().copied().filter(|&peer| peer != id);
                self.add_node(id, peers, Arc::clone(&events))
            })
            .collect()
    }

    /// Hold messages from `from` to `to` until [`Self::resume`].
    pub fn pause(&self, from: NodeId, to: NodeId) {
        self.registry.links().paused.insert((from, to));
    }

    /// Release held messages on the link.
    pub fn resume(&self, from: NodeId, to: NodeId) {
        self.registry.links().paused.remove(&(from, to));
        self.registry.resumed.notify_waiters();
    }

    /// Make every send from `from` to `to` fail.
    pub fn cut(&self, from: NodeId, to: NodeId) {
        self.registry.links().cut.insert((from, to));
    }

    /// Undo [`Self::cut`].
    pub fn heal(&self, from: NodeId, to: NodeId) {
        self.registry.links().cut.remove(&(from, to));
    }
}

/// Outbound side of a loopback node.
pub struct LoopbackTransport<E: Environment> {
    from: NodeId,
    registry: Arc<Registry<E>>,
}

#[async_trait]
impl<E: Environment> MessageTransport for LoopbackTransport<E> {
    async fn send(&self, peer: NodeId, message: Message) -> Result<(), TransportError> {
        let link = (self.from, peer);
        self.registry.wait_while_paused(link).await;

        if self.registry.links().cut.contains(&link) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("link {} -> {} is cut", self.from, peer),
            )));
        }

        let target = self.registry.lookup(peer).ok_or(TransportError::UnknownPeer(peer))?;

        let delay = self.registry.env.random_duration(Duration::ZERO, self.registry.jitter);
        if !delay.is_zero() {
            self.registry.env.sleep(delay).await;
        }

        trace!(from = %self.from, to = %peer, %message, "loopback delivery");
        target
            .handle_message(message)
            .await
            .map_err(|error| TransportError::Io(io::Error::other(error.to_string())))?;
        Ok(())
    }
}
