//! Reusable oracles.

use lamport_core::{engine::NodeState, event::check_mutual_exclusion};
use lamport_proto::{MessageKind, NodeId};

use super::OracleFn;

/// No two critical sections overlap.
pub fn mutual_exclusion() -> OracleFn {
    Box::new(|world| check_mutual_exclusion(world.events()).map_err(|violation| violation.to_string()))
}

/// Exactly `expected` critical sections completed.
pub fn completed(expected: usize) -> OracleFn {
    Box::new(move |world| {
        let actual = world.intervals().len();
        if actual == expected {
            Ok(())
        } else {
            Err(format!("expected {expected} completed critical sections, got {actual}"))
        }
    })
}

/// Every node ended idle with an empty ledger and nothing deferred.
pub fn all_idle() -> OracleFn {
    Box::new(|world| {
        for snapshot in world.snapshots() {
            if snapshot.state != NodeState::Idle {
                return Err(format!("node {} ended in {:?}", snapshot.id, snapshot.state));
            }
            if !snapshot.ledger.is_empty() {
                return Err(format!("node {} ended with ledger {:?}", snapshot.id, snapshot.ledger));
            }
            if !snapshot.deferred.is_empty() {
                return Err(format!("node {} ended with deferred {:?}", snapshot.id, snapshot.deferred));
            }
        }
        Ok(())
    })
}

/// Critical sections were entered in exactly this order.
pub fn entry_order(expected: Vec<u64>) -> OracleFn {
    let expected: Vec<NodeId> = expected.into_iter().map(NodeId::new).collect();
    Box::new(move |world| {
        let actual = world.entry_order();
        if actual == expected {
            Ok(())
        } else {
            Err(format!("expected entry order {expected:?}, got {actual:?}"))
        }
    })
}

/// `node` sent nothing but REPLY messages.
pub fn only_replies_from(node: u64) -> OracleFn {
    let node = NodeId::new(node);
    Box::new(move |world| {
        let sent = world.sent_by(node);
        match sent.iter().find(|entry| entry.message.kind != MessageKind::Reply) {
            Some(entry) => Err(format!("node {node} sent {} to {}", entry.message, entry.to)),
            None => Ok(()),
        }
    })
}

/// Every oracle in `oracles` passes; the first failure is reported.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}
