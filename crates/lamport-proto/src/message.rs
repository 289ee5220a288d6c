//! Protocol messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{NodeId, Timestamp};

/// The three messages of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Sender wants the critical section
    Request,
    /// Sender grants permission to the receiver
    Reply,
    /// Sender has left the critical section
    Release,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
            Self::Release => "RELEASE",
        };
        f.write_str(name)
    }
}

/// A protocol message as seen by the engine.
///
/// The timestamp is always the sender's clock value after the event that
/// produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Which message this is
    pub kind: MessageKind,
    /// Sender's Lamport timestamp
    pub timestamp: Timestamp,
    /// Sender's node id
    pub sender: NodeId,
}

impl Message {
    /// `REQUEST(timestamp, sender)`
    pub fn request(timestamp: Timestamp, sender: NodeId) -> Self {
        Self { kind: MessageKind::Request, timestamp, sender }
    }

    /// `REPLY(timestamp, sender)`
    pub fn reply(timestamp: Timestamp, sender: NodeId) -> Self {
        Self { kind: MessageKind::Reply, timestamp, sender }
    }

    /// `RELEASE(timestamp, sender)`
    pub fn release(timestamp: Timestamp, sender: NodeId) -> Self {
        Self { kind: MessageKind::Release, timestamp, sender }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(ts={}, from={})", self.kind, self.timestamp, self.sender)
    }
}
