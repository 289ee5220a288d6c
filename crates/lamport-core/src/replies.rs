//! Per-cycle reply bookkeeping.

use std::collections::BTreeSet;

use lamport_proto::NodeId;

/// Peers that granted the current request.
///
/// Bounded by the peer set given at construction; ids outside it are
/// refused, so the tracker can never reach completeness through unknown or
/// self-addressed replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTracker {
    peers: BTreeSet<NodeId>,
    granted: BTreeSet<NodeId>,
}

impl ReplyTracker {
    /// Empty tracker for the given peer set.
    pub fn new(peers: BTreeSet<NodeId>) -> Self {
        Self { peers, granted: BTreeSet::new() }
    }

    /// Record a grant from `peer`.
    ///
    /// Returns `false` if `peer` is not a known peer. Duplicate grants are
    /// accepted and change nothing.
    pub fn record(&mut self, peer: NodeId) -> bool {
        if !self.peers.contains(&peer) {
            return false;
        }
        self.granted.insert(peer);
        true
    }

    /// Whether `peer` has granted.
    pub fn contains(&self, peer: NodeId) -> bool {
        self.granted.contains(&peer)
    }

    /// Number of peers that granted.
    pub fn len(&self) -> usize {
        self.granted.len()
    }

    /// Whether nobody granted yet.
    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }

    /// Every peer has granted.
    pub fn is_complete(&self) -> bool {
        self.granted.len() == self.peers.len()
    }

    /// Forget all grants.
    pub fn clear(&mut self) {
        self.granted.clear();
    }

    /// Granting peers in id order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.granted.iter().copied()
    }
}

/// Peers whose REPLY is withheld until the local release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredReplies {
    pending: BTreeSet<NodeId>,
}

impl DeferredReplies {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Withhold the reply to `peer`.
    pub fn defer(&mut self, peer: NodeId) {
        self.pending.insert(peer);
    }

    /// Whether the reply to `peer` is withheld.
    pub fn contains(&self, peer: NodeId) -> bool {
        self.pending.contains(&peer)
    }

    /// Number of withheld replies.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is withheld.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every withheld peer in id order, leaving the set empty.
    pub fn drain(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Forget all withheld replies.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Withheld peers in id order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pending.iter().copied()
    }
}
