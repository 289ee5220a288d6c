//! Pending-request ledger.
//!
//! Holds at most one outstanding request per node, ordered by the protocol's
//! total order on `(timestamp, node)`. The ledger outlives individual request
//! cycles: peers' requests are independent of the local cycle count.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use lamport_proto::{NodeId, Timestamp};
use serde::{Deserialize, Serialize};

/// One node's outstanding request.
///
/// Ordered by timestamp first, node id second. The node id only matters for
/// equal timestamps, which reach the tie-break deterministically regardless
/// of clock skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Lamport timestamp the request was sent with
    pub timestamp: Timestamp,
    /// Requesting node
    pub node: NodeId,
}

impl RequestRecord {
    /// Build a record.
    pub fn new(timestamp: Timestamp, node: NodeId) -> Self {
        Self { timestamp, node }
    }

    /// Whether this request has priority over `other`.
    pub fn precedes(&self, other: &Self) -> bool {
        self < other
    }
}

impl Ord for RequestRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp).then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for RequestRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.timestamp, self.node)
    }
}

/// Ordered set of outstanding requests, one per node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLedger {
    ordered: BTreeSet<RequestRecord>,
    by_node: BTreeMap<NodeId, RequestRecord>,
}

impl RequestLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any earlier record for the same node.
    ///
    /// Returns the replaced record.
    pub fn insert(&mut self, record: RequestRecord) -> Option<RequestRecord> {
        let replaced = self.by_node.insert(record.node, record);
        if let Some(old) = replaced {
            self.ordered.remove(&old);
        }
        self.ordered.insert(record);
        replaced
    }

    /// Remove the record for `node`, if any.
    pub fn remove(&mut self, node: NodeId) -> Option<RequestRecord> {
        let removed = self.by_node.remove(&node)?;
        self.ordered.remove(&removed);
        Some(removed)
    }

    /// Request with the highest priority.
    pub fn peek_min(&self) -> Option<&RequestRecord> {
        self.ordered.first()
    }

    /// Whether `node` has an outstanding request.
    pub fn contains(&self, node: NodeId) -> bool {
        self.by_node.contains_key(&node)
    }

    /// Outstanding request of `node`.
    pub fn get(&self, node: NodeId) -> Option<&RequestRecord> {
        self.by_node.get(&node)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Records in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &RequestRecord> {
        self.ordered.iter()
    }
}

impl fmt::Display for RequestLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, record) in self.ordered.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{record}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rec(ts: u64, node: u64) -> RequestRecord {
        RequestRecord::new(Timestamp::new(ts), NodeId::new(node))
    }

    #[test]
    fn timestamp_orders_first() {
        assert!(rec(1, 9).precedes(&rec(2, 1)));
        assert!(!rec(2, 1).precedes(&rec(1, 9)));
    }

    #[test]
    fn node_id_breaks_ties() {
        assert!(rec(5, 1).precedes(&rec(5, 2)));
        assert!(!rec(5, 2).precedes(&rec(5, 1)));
    }

    #[test]
    fn record_does_not_precede_itself() {
        assert!(!rec(3, 3).precedes(&rec(3, 3)));
        assert_eq!(rec(3, 3).cmp(&rec(3, 3)), Ordering::Equal);
    }

    #[test]
    fn insert_replaces_existing_record_for_node() {
        let mut ledger = RequestLedger::new();
        assert_eq!(ledger.insert(rec(1, 2)), None);
        assert_eq!(ledger.insert(rec(7, 2)), Some(rec(1, 2)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(NodeId::new(2)), Some(&rec(7, 2)));
        assert_eq!(ledger.peek_min(), Some(&rec(7, 2)));
    }

    #[test]
    fn remove_unknown_node_is_noop() {
        let mut ledger = RequestLedger::new();
        ledger.insert(rec(1, 1));
        assert_eq!(ledger.remove(NodeId::new(4)), None);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn peek_min_follows_removals() {
        let mut ledger = RequestLedger::new();
        ledger.insert(rec(4, 3));
        ledger.insert(rec(2, 1));
        ledger.insert(rec(2, 2));
        assert_eq!(ledger.peek_min(), Some(&rec(2, 1)));
        ledger.remove(NodeId::new(1));
        assert_eq!(ledger.peek_min(), Some(&rec(2, 2)));
        ledger.remove(NodeId::new(2));
        assert_eq!(ledger.peek_min(), Some(&rec(4, 3)));
        ledger.remove(NodeId::new(3));
        assert!(ledger.is_empty());
        assert_eq!(ledger.peek_min(), None);
    }

    #[test]
    fn display_lists_records_in_order() {
        let mut ledger = RequestLedger::new();
        ledger.insert(rec(3, 1));
        ledger.insert(rec(1, 2));
        assert_eq!(ledger.to_string(), "[(1, 2), (3, 1)]");
    }

    proptest! {
        #[test]
        fn one_sorted_record_per_node(
            ops in proptest::collection::vec((0u64..20, 0u64..5, any::<bool>()), 0..100)
        ) {
            let mut ledger = RequestLedger::new();
            let mut model = BTreeMap::new();
            for (ts, node, insert) in ops {
                if insert {
                    ledger.insert(rec(ts, node));
                    model.insert(node, ts);
                } else {
                    ledger.remove(NodeId::new(node));
                    model.remove(&node);
                }

                prop_assert_eq!(ledger.len(), model.len());
                let records: Vec<_> = ledger.iter().copied().collect();
                prop_assert!(records.windows(2).all(|w| w[0] < w[1]));
                let expected_min = model.iter().map(|(&n, &t)| rec(t, n)).min();
                prop_assert_eq!(ledger.peek_min().copied(), expected_min);
            }
        }
    }
}
