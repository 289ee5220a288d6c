//! Error types for the engine, node runtime, transport and configuration.

use std::io;

use lamport_proto::{NodeId, ProtocolError};
use thiserror::Error;

use crate::engine::NodeState;

/// Protocol engine errors.
///
/// Only local misuse produces these. Inbound messages never fail: anything
/// unexpected from the network is logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Operation not valid in the current state
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// Current state
        state: NodeState,
        /// Attempted operation
        operation: &'static str,
    },

    /// The local id was listed among its own peers
    #[error("node {0} cannot be its own peer")]
    SelfPeer(NodeId),
}

/// Node runtime errors.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Engine rejected the operation
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A task panicked while holding the engine lock
    #[error("engine lock poisoned")]
    Poisoned,
}

/// Failure to deliver one message to one peer.
///
/// Sends are fire-and-forget: the node logs these and carries on.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No address for this peer in the directory
    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    /// Connect, write or read failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Peer did not acknowledge in time
    #[error("timed out sending to peer {0}")]
    Timeout(NodeId),

    /// Peer answered with a malformed frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Peer answered with something other than an ACK
    #[error("unexpected response from peer {peer}: {detail}")]
    UnexpectedResponse {
        /// Peer that answered
        peer: NodeId,
        /// What arrived instead
        detail: String,
    },
}

/// Cluster configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    /// Config is not a JSON object of strings
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Key is not a node id
    #[error("invalid node id {0:?}")]
    InvalidNodeId(String),

    /// Value is not `host:port`
    #[error("invalid address {address:?} for node {node}")]
    InvalidAddress {
        /// Node the address belongs to
        node: NodeId,
        /// Offending value
        address: String,
    },

    /// Local id missing from the config
    #[error("node {0} not found in config")]
    UnknownNode(NodeId),
}

/// Failure while serving one inbound connection.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Reading the frame or writing the ACK failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The node could not apply the message
    #[error(transparent)]
    Node(#[from] NodeError),
}
