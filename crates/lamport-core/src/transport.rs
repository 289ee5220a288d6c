//! Transport abstractions.
//!
//! Two layers:
//!
//! - [`MessageTransport`] delivers one protocol message to one named peer.
//!   This is the only transport the node runtime knows about.
//! - [`Transport`] and [`Listener`] open and accept byte streams. Production
//!   uses tokio TCP, tests use turmoil's simulated TCP.
//!
//! [`FramedTransport`] bridges the two: every message is one connection
//! carrying one frame each way. The callee acknowledges only after the
//! message has been fully processed, so a successful send means the peer
//! has applied it.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use lamport_proto::{Frame, FrameHeader, Message, NodeId, Opcode, Timestamp};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::{
    config::PeerDirectory,
    env::Environment,
    error::{ServeError, TransportError},
    node::Node,
};

/// Point-to-point delivery of protocol messages.
///
/// Sends are attempted once. Failures are reported, never retried here.
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Deliver `message` to `peer`.
    async fn send(&self, peer: NodeId, message: Message) -> Result<(), TransportError>;

    /// Deliver `REQUEST(timestamp, sender)` to `peer`.
    async fn send_request(
        &self,
        peer: NodeId,
        timestamp: Timestamp,
        sender: NodeId,
    ) -> Result<(), TransportError> {
        self.send(peer, Message::request(timestamp, sender)).await
    }

    /// Deliver `REPLY(timestamp, sender)` to `peer`.
    async fn send_reply(
        &self,
        peer: NodeId,
        timestamp: Timestamp,
        sender: NodeId,
    ) -> Result<(), TransportError> {
        self.send(peer, Message::reply(timestamp, sender)).await
    }

    /// Deliver `RELEASE(timestamp, sender)` to `peer`.
    async fn send_release(
        &self,
        peer: NodeId,
        timestamp: Timestamp,
        sender: NodeId,
    ) -> Result<(), TransportError> {
        self.send(peer, Message::release(timestamp, sender)).await
    }
}

/// Opens outbound byte streams.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Stream type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `address` (`host:port`).
    async fn connect(&self, address: &str) -> io::Result<Self::Stream>;
}

/// Accepts inbound byte streams.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Stream type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection. Returns the stream and the remote
    /// address for logging.
    async fn accept(&self) -> io::Result<(Self::Stream, String)>;
}

/// Framed transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on connect + write + ACK for a single message
    pub send_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { send_timeout: Duration::from_secs(5) }
    }
}

/// [`MessageTransport`] over any stream [`Transport`].
#[derive(Debug, Clone)]
pub struct FramedTransport<T> {
    transport: T,
    directory: PeerDirectory,
    config: TransportConfig,
}

impl<T: Transport> FramedTransport<T> {
    /// Send through `transport` to the addresses in `directory`.
    pub fn new(transport: T, directory: PeerDirectory, config: TransportConfig) -> Self {
        Self { transport, directory, config }
    }

    /// Peer directory in use.
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    async fn exchange(
        &self,
        address: &str,
        peer: NodeId,
        message: &Message,
    ) -> Result<(), TransportError> {
        let mut stream = self.transport.connect(address).await?;
        write_frame(&mut stream, &Frame::from_message(message)).await?;

        let response = read_frame(&mut stream).await?;
        let opcode = response.opcode()?;
        if opcode != Opcode::Ack {
            return Err(TransportError::UnexpectedResponse {
                peer,
                detail: format!("{opcode:?} instead of Ack"),
            });
        }
        if response.header.sender() != peer {
            return Err(TransportError::UnexpectedResponse {
                peer,
                detail: format!("Ack signed by node {}", response.header.sender()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> MessageTransport for FramedTransport<T> {
    async fn send(&self, peer: NodeId, message: Message) -> Result<(), TransportError> {
        let address = self.directory.address(peer).ok_or(TransportError::UnknownPeer(peer))?;

        match tokio::time::timeout(self.config.send_timeout, self.exchange(address, peer, &message))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::Timeout(peer)),
        }
    }
}

/// Read exactly one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut buf).await?;
    Ok(Frame::decode(&buf)?)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle one inbound connection: read a message, apply it, ACK it.
pub async fn serve_connection<S, T, E>(mut stream: S, node: &Node<T, E>) -> Result<(), ServeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    T: MessageTransport,
    E: Environment,
{
    let frame = read_frame(&mut stream).await?;
    let message = frame.into_message().map_err(TransportError::from)?;
    debug!(node = %node.id(), %message, "inbound");

    let clock = node.handle_message(message).await?;

    write_frame(&mut stream, &Frame::ack(clock, node.id())).await?;
    stream.shutdown().await.map_err(TransportError::from)?;
    Ok(())
}

/// Accept connections forever, serving each on its own task.
///
/// Returns only if `accept` fails.
pub async fn serve<L, T, E>(listener: L, node: Arc<Node<T, E>>) -> io::Result<()>
where
    L: Listener,
    T: MessageTransport,
    E: Environment,
{
    loop {
        let (stream, remote) = listener.accept().await?;
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(error) = serve_connection(stream, &node).await {
                warn!(node = %node.id(), %remote, %error, "dropping inbound connection");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::DuplexStream;

    use super::*;

    /// Connects to an in-memory peer that answers with a fixed frame.
    struct CannedPeer {
        answer: Frame,
        received: Arc<Mutex<Vec<Frame>>>,
    }

    #[async_trait]
    impl Transport for CannedPeer {
        type Stream = DuplexStream;

        async fn connect(&self, _address: &str) -> io::Result<Self::Stream> {
            let (client, mut server) = tokio::io::duplex(256);
            let answer = self.answer;
            let received = Arc::clone(&self.received);
            tokio::spawn(async move {
                if let Ok(frame) = read_frame(&mut server).await {
                    received.lock().unwrap().push(frame);
                    let _ = write_frame(&mut server, &answer).await;
                }
            });
            Ok(client)
        }
    }

    fn directory() -> PeerDirectory {
        PeerDirectory::new([(NodeId::new(2), "peer-2:9000".to_string())])
    }

    #[tokio::test]
    async fn acked_send_succeeds() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let peer = CannedPeer {
            answer: Frame::ack(Timestamp::new(3), NodeId::new(2)),
            received: Arc::clone(&received),
        };
        let transport = FramedTransport::new(peer, directory(), TransportConfig::default());

        transport.send_request(NodeId::new(2), Timestamp::new(1), NodeId::new(1)).await.unwrap();

        let frames = received.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].into_message().unwrap(),
            Message::request(Timestamp::new(1), NodeId::new(1))
        );
    }

    #[tokio::test]
    async fn unknown_peer_fails_without_connecting() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let peer = CannedPeer {
            answer: Frame::ack(Timestamp::ZERO, NodeId::new(2)),
            received: Arc::clone(&received),
        };
        let transport = FramedTransport::new(peer, directory(), TransportConfig::default());

        let err = transport.send_reply(NodeId::new(5), Timestamp::new(1), NodeId::new(1)).await;
        assert!(matches!(err, Err(TransportError::UnknownPeer(id)) if id == NodeId::new(5)));
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_ack_answer_is_rejected() {
        let peer = CannedPeer {
            answer: Frame::from_message(&Message::reply(Timestamp::new(2), NodeId::new(2))),
            received: Arc::new(Mutex::new(Vec::new())),
        };
        let transport = FramedTransport::new(peer, directory(), TransportConfig::default());

        let err = transport.send_release(NodeId::new(2), Timestamp::new(1), NodeId::new(1)).await;
        assert!(matches!(err, Err(TransportError::UnexpectedResponse { .. })));
    }

    #[tokio::test]
    async fn ack_from_wrong_node_is_rejected() {
        let peer = CannedPeer {
            answer: Frame::ack(Timestamp::new(2), NodeId::new(7)),
            received: Arc::new(Mutex::new(Vec::new())),
        };
        let transport = FramedTransport::new(peer, directory(), TransportConfig::default());

        let err = transport.send(NodeId::new(2), Message::reply(Timestamp::new(1), NodeId::new(1)));
        assert!(matches!(err.await, Err(TransportError::UnexpectedResponse { .. })));
    }

    /// Accepts the connection and never answers.
    struct SilentPeer;

    #[async_trait]
    impl Transport for SilentPeer {
        type Stream = DuplexStream;

        async fn connect(&self, _address: &str) -> io::Result<Self::Stream> {
            let (client, server) = tokio::io::duplex(256);
            tokio::spawn(async move {
                let _server = server;
                std::future::pending::<()>().await;
            });
            Ok(client)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let config = TransportConfig { send_timeout: Duration::from_millis(100) };
        let transport = FramedTransport::new(SilentPeer, directory(), config);

        let err = transport.send(NodeId::new(2), Message::reply(Timestamp::new(1), NodeId::new(1)));
        assert!(matches!(err.await, Err(TransportError::Timeout(id)) if id == NodeId::new(2)));
    }
}
