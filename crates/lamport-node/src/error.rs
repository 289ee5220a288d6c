//! Peer process errors.

use std::io;

use lamport_core::error::{ConfigError, EngineError, NodeError};
use thiserror::Error;

/// Fatal errors of the peer process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded or does not name this node
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Listener or ledger file failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Engine could not be built from the configuration
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Node runtime failure
    #[error(transparent)]
    Node(#[from] NodeError),
}
