//! Critical-section event sink.
//!
//! Nodes append an `Entered` record right after the entry predicate fires
//! and an `Exited` record right before broadcasting RELEASE. A sink shared by
//! every node of a cluster is therefore an append-ordered history in which
//! no two intervals may overlap; [`check_mutual_exclusion`] verifies that.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use lamport_proto::{NodeId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Node entered the critical section
    Entered,
    /// Node left the critical section
    Exited,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Entered => "ENTERED",
            Self::Exited => "EXITING",
        })
    }
}

/// One entry or exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Node the event belongs to
    pub node: NodeId,
    /// Entry or exit
    pub kind: EventKind,
    /// Node's Lamport clock when the event was recorded
    pub clock: Timestamp,
    /// Wall-clock time from the node's environment
    pub at: SystemTime,
}

/// Append-only destination for critical-section events.
///
/// Implementations handle their own failures; a sink that cannot persist a
/// record logs it and moves on.
pub trait EventSink: Send + Sync + 'static {
    /// Append one record.
    fn record(&self, record: EventRecord);
}

/// In-memory sink, cheap to clone and share between nodes.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemoryEventSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in append order.
    pub fn records(&self) -> Vec<EventRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of `Exited` records, i.e. completed critical sections.
    pub fn completed(&self) -> usize {
        self.records().iter().filter(|r| r.kind == EventKind::Exited).count()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, record: EventRecord) {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push(record);
    }
}

/// Broken mutual exclusion, or a malformed history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExclusionViolation {
    /// `intruder` entered while `holder` was inside
    #[error("node {intruder} entered while node {holder} held the critical section (record {index})")]
    Overlap {
        /// Node inside the critical section
        holder: NodeId,
        /// Node that entered anyway
        intruder: NodeId,
        /// Position of the offending record
        index: usize,
    },

    /// Exit with nobody inside
    #[error("node {node} exited without entering (record {index})")]
    ExitWithoutEntry {
        /// Exiting node
        node: NodeId,
        /// Position of the offending record
        index: usize,
    },

    /// Exit by a node other than the holder
    #[error("node {node} exited while node {holder} held the critical section (record {index})")]
    ExitByNonHolder {
        /// Exiting node
        node: NodeId,
        /// Node inside the critical section
        holder: NodeId,
        /// Position of the offending record
        index: usize,
    },
}

/// Verify that no two critical sections overlap.
///
/// Walks `records` in append order. A trailing entry without exit is
/// accepted: the history may have been captured mid-section.
pub fn check_mutual_exclusion(records: &[EventRecord]) -> Result<(), ExclusionViolation> {
    let mut holder: Option<NodeId> = None;

    for (index, record) in records.iter().enumerate() {
        match (record.kind, holder) {
            (EventKind::Entered, None) => holder = Some(record.node),
            (EventKind::Entered, Some(holder)) => {
                return Err(ExclusionViolation::Overlap { holder, intruder: record.node, index });
            },
            (EventKind::Exited, None) => {
                return Err(ExclusionViolation::ExitWithoutEntry { node: record.node, index });
            },
            (EventKind::Exited, Some(current)) if current == record.node => holder = None,
            (EventKind::Exited, Some(current)) => {
                return Err(ExclusionViolation::ExitByNonHolder {
                    node: record.node,
                    holder: current,
                    index,
                });
            },
        }
    }

    Ok(())
}

/// One completed critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// Node that held the critical section
    pub node: NodeId,
    /// Entry record
    pub entered: EventRecord,
    /// Exit record
    pub exited: EventRecord,
}

/// Pair every node's entries with its exits, in append order.
///
/// Unmatched records are skipped.
pub fn intervals(records: &[EventRecord]) -> Vec<Interval> {
    let mut open: BTreeMap<NodeId, EventRecord> = BTreeMap::new();
    let mut done = Vec::new();

    for record in records {
        match record.kind {
            EventKind::Entered => {
                open.insert(record.node, *record);
            },
            EventKind::Exited => {
                if let Some(entered) = open.remove(&record.node) {
                    done.push(Interval { node: record.node, entered, exited: *record });
                }
            },
        }
    }

    done
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn ev(node: u64, kind: EventKind, secs: u64) -> EventRecord {
        EventRecord {
            node: NodeId::new(node),
            kind,
            clock: Timestamp::new(secs),
            at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn sequential_sections_pass() {
        let history = [
            ev(1, EventKind::Entered, 1),
            ev(1, EventKind::Exited, 2),
            ev(2, EventKind::Entered, 3),
            ev(2, EventKind::Exited, 4),
            ev(1, EventKind::Entered, 5),
        ];
        assert_eq!(check_mutual_exclusion(&history), Ok(()));
    }

    #[test]
    fn overlap_is_reported() {
        let history = [
            ev(1, EventKind::Entered, 1),
            ev(2, EventKind::Entered, 2),
            ev(1, EventKind::Exited, 3),
        ];
        assert_eq!(
            check_mutual_exclusion(&history),
            Err(ExclusionViolation::Overlap {
                holder: NodeId::new(1),
                intruder: NodeId::new(2),
                index: 1
            })
        );
    }

    #[test]
    fn stray_exits_are_reported() {
        let history = [ev(3, EventKind::Exited, 1)];
        assert!(matches!(
            check_mutual_exclusion(&history),
            Err(ExclusionViolation::ExitWithoutEntry { .. })
        ));

        let history = [ev(1, EventKind::Entered, 1), ev(2, EventKind::Exited, 2)];
        assert!(matches!(
            check_mutual_exclusion(&history),
            Err(ExclusionViolation::ExitByNonHolder { .. })
        ));
    }

    #[test]
    fn intervals_pair_entries_with_exits() {
        let history = [
            ev(1, EventKind::Entered, 1),
            ev(1, EventKind::Exited, 2),
            ev(2, EventKind::Entered, 3),
        ];
        let done = intervals(&history);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].node, NodeId::new(1));
        assert!(done[0].entered.at < done[0].exited.at);
    }

    #[test]
    fn memory_sink_is_shared_between_clones() {
        let sink = MemoryEventSink::new();
        let other = sink.clone();
        other.record(ev(1, EventKind::Entered, 1));
        other.record(ev(1, EventKind::Exited, 2));
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.completed(), 1);
    }
}
