//! Turmoil-backed stream transport.

use std::io;

use async_trait::async_trait;
use lamport_core::transport::{Listener, Transport};
use turmoil::net::{TcpListener, TcpStream};

/// Outbound connections over turmoil's simulated TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimTransport;

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    async fn connect(&self, address: &str) -> io::Result<Self::Stream> {
        TcpStream::connect(address).await
    }
}

/// Inbound connections over turmoil's simulated TCP.
pub struct SimListener {
    listener: TcpListener,
}

impl SimListener {
    /// Bind on `address`, e.g. `0.0.0.0:7000`.
    pub async fn bind(address: &str) -> io::Result<Self> {
        Ok(Self { listener: TcpListener::bind(address).await? })
    }
}

#[async_trait]
impl Listener for SimListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, String)> {
        let (stream, remote) = self.listener.accept().await?;
        Ok((stream, remote.to_string()))
    }
}
