//! Sans-IO cluster with an explicit in-flight pool.
//!
//! Engines never talk to each other directly: every send lands in a pool
//! and stays there until a test delivers it. [`EngineCluster::deliver`]
//! keeps messages on one link in order; [`EngineCluster::deliver_exact`]
//! delivers any message at any time.

use std::collections::BTreeMap;

use lamport_core::{
    engine::{Engine, NodeAction, NodeState},
    error::EngineError,
};
use lamport_proto::{Message, NodeId};

/// A sent but not yet delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    /// Sender
    pub from: NodeId,
    /// Recipient
    pub to: NodeId,
    /// Message body
    pub message: Message,
}

/// Fully connected set of engines plus the messages between them.
#[derive(Debug, Clone)]
pub struct EngineCluster {
    engines: BTreeMap<NodeId, Engine>,
    in_flight: Vec<InFlight>,
    entries: Vec<NodeId>,
}

impl EngineCluster {
    /// Cluster of nodes `1..=size`.
    pub fn new(size: u64) -> Self {
        let ids: Vec<NodeId> = (1..=size).map(NodeId::new).collect();
        let engines = ids
            .iter()
            .filter_map(|&id| {
                let peers = ids.iter().copied().filter(move |&peer| peer != id);
                Engine::new(id, peers).ok().map(|engine| (id, engine))
            })
            .collect();
        Self { engines, in_flight: Vec::new(), entries: Vec::new() }
    }

    /// Node ids in ascending order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.engines.keys().copied().collect()
    }

    /// Engine of `id`.
    pub fn engine(&self, id: NodeId) -> Option<&Engine> {
        self.engines.get(&id)
    }

    /// State of `id`, `Idle` for unknown ids.
    pub fn state(&self, id: NodeId) -> NodeState {
        self.engine(id).map_or(NodeState::Idle, Engine::state)
    }

    /// Messages waiting for delivery, oldest first.
    pub fn in_flight(&self) -> &[InFlight] {
        &self.in_flight
    }

    /// Nodes in the order they entered the critical section.
    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    fn enqueue(&mut self, from: NodeId, actions: Vec<NodeAction>) {
        for action in actions {
            if let NodeAction::Send { to, message } = action {
                self.in_flight.push(InFlight { from, to, message });
            }
        }
    }

    /// Start a request cycle on `id`. Unknown ids are ignored.
    pub fn request(&mut self, id: NodeId) -> Result<(), EngineError> {
        let Some(engine) = self.engines.get_mut(&id) else {
            return Ok(());
        };
        let actions = engine.request()?;
        self.enqueue(id, actions);
        Ok(())
    }

    /// Enter the critical section on `id` if its predicate holds.
    pub fn try_enter(&mut self, id: NodeId) -> Result<bool, EngineError> {
        let Some(engine) = self.engines.get_mut(&id) else {
            return Ok(false);
        };
        let entered = engine.try_enter()?;
        if entered {
            self.entries.push(id);
        }
        Ok(entered)
    }

    /// Leave the critical section on `id`. Unknown ids are ignored.
    pub fn release(&mut self, id: NodeId) -> Result<(), EngineError> {
        let Some(engine) = self.engines.get_mut(&id) else {
            return Ok(());
        };
        let actions = engine.release()?;
        self.enqueue(id, actions);
        Ok(())
    }

    /// Deliver the message at `index` in the pool.
    ///
    /// If an older message on the same link is still in flight, that one is
    /// delivered instead. Returns the delivered message, or `None` if the
    /// index is out of range.
    pub fn deliver(&mut self, index: usize) -> Option<InFlight> {
        let chosen = *self.in_flight.get(index)?;
        let position = self
            .in_flight
            .iter()
            .position(|entry| entry.from == chosen.from && entry.to == chosen.to)?;
        self.deliver_exact(position)
    }

    /// Deliver the message at `index`, ignoring older messages on its link.
    ///
    /// Returns `None` if the index is out of range.
    pub fn deliver_exact(&mut self, index: usize) -> Option<InFlight> {
        if index >= self.in_flight.len() {
            return None;
        }
        let entry = self.in_flight.remove(index);

        if let Some(engine) = self.engines.get_mut(&entry.to) {
            let actions = engine.handle_message(&entry.message);
            self.enqueue(entry.to, actions);
        }
        Some(entry)
    }

    /// Deliver every in-flight message on the link `from -> to`.
    pub fn deliver_link(&mut self, from: NodeId, to: NodeId) -> usize {
        let mut delivered = 0;
        while let Some(index) =
            self.in_flight.iter().position(|entry| entry.from == from && entry.to == to)
        {
            self.deliver(index);
            delivered += 1;
        }
        delivered
    }

    /// Deliver every in-flight message sent by `from`.
    pub fn deliver_from(&mut self, from: NodeId) -> usize {
        let mut delivered = 0;
        while let Some(index) = self.in_flight.iter().position(|entry| entry.from == from) {
            self.deliver(index);
            delivered += 1;
        }
        delivered
    }

    /// Drop every in-flight message to `to`.
    pub fn drop_to(&mut self, to: NodeId) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|entry| entry.to != to);
        before - self.in_flight.len()
    }

    /// Run the cluster to quiescence: deliver in FIFO order, let every
    /// eligible node enter and immediately release.
    ///
    /// Checks [`Self::check_invariants`] after every step.
    pub fn settle(&mut self) -> Result<(), String> {
        loop {
            let mut progressed = false;

            if self.deliver(0).is_some() {
                progressed = true;
                self.check_invariants()?;
            }

            for id in self.ids() {
                if self.state(id) == NodeState::Requesting
                    && self.try_enter(id).map_err(|error| error.to_string())?
                {
                    self.check_invariants()?;
                    self.release(id).map_err(|error| error.to_string())?;
                    progressed = true;
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    /// Safety checks on the global state.
    ///
    /// At most one node is inside the critical section, and its request has
    /// priority over every other outstanding request.
    pub fn check_invariants(&self) -> Result<(), String> {
        let holders: Vec<&Engine> = self
            .engines
            .values()
            .filter(|engine| engine.state() == NodeState::InCriticalSection)
            .collect();

        match holders.as_slice() {
            [] => Ok(()),
            [holder] => {
                let Some(held) = holder.own_request() else {
                    return Err(format!("node {} holds the section without a request", holder.id()));
                };
                for other in self.engines.values().filter(|engine| engine.id() != holder.id()) {
                    if let Some(pending) = other.own_request()
                        && pending.precedes(&held)
                    {
                        return Err(format!(
                            "node {} entered with {held} while {pending} was outstanding",
                            holder.id()
                        ));
                    }
                }
                Ok(())
            },
            many => {
                let ids: Vec<String> = many.iter().map(|engine| engine.id().to_string()).collect();
                Err(format!("nodes {} are in the critical section together", ids.join(", ")))
            },
        }
    }
}
