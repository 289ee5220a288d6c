//! Outbound message log.
//!
//! Wraps any [`MessageTransport`] and records every send attempt, so oracles
//! can check what a node put on the wire and not only what it did.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lamport_core::{error::TransportError, transport::MessageTransport};
use lamport_proto::{Message, MessageKind, NodeId};

/// One send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    /// Sending node
    pub from: NodeId,
    /// Destination node
    pub to: NodeId,
    /// Message body
    pub message: Message,
    /// Whether the transport reported success
    pub delivered: bool,
}

/// Shared, append-only record of send attempts.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: SentMessage) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    /// Every attempt so far, in order.
    pub fn entries(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Attempts made by `node`.
    pub fn sent_by(&self, node: NodeId) -> Vec<SentMessage> {
        self.entries().into_iter().filter(|entry| entry.from == node).collect()
    }

    /// Number of attempts of `kind` made by `node`.
    pub fn count(&self, node: NodeId, kind: MessageKind) -> usize {
        self.sent_by(node).iter().filter(|entry| entry.message.kind == kind).count()
    }
}

/// Transport wrapper that logs every send.
pub struct TappedTransport<T> {
    node: NodeId,
    inner: T,
    log: MessageLog,
}

impl<T> TappedTransport<T> {
    /// Log sends by `node` through `inner` into `log`.
    pub fn new(node: NodeId, inner: T, log: MessageLog) -> Self {
        Self { node, inner, log }
    }

    /// Wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: MessageTransport> MessageTransport for TappedTransport<T> {
    async fn send(&self, peer: NodeId, message: Message) -> Result<(), TransportError> {
        let result = self.inner.send(peer, message).await;
        self.log.push(SentMessage { from: self.node, to: peer, message, delivered: result.is_ok() });
        result
    }
}
