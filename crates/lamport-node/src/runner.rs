//! Node startup and lifecycle.

use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use lamport_core::{
    config::ClusterConfig,
    driver::{SimulationConfig, run_simulation},
    engine::Engine,
    node::Node,
    transport::{FramedTransport, TransportConfig, serve},
};
use lamport_proto::NodeId;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    env::SystemEnv,
    error::ServerError,
    ledger_file::FileEventSink,
    tcp::{TcpAcceptor, TcpTransport},
};

/// Production node type.
pub type TcpNode = Node<FramedTransport<TcpTransport>, SystemEnv>;

/// Everything a peer process needs to run.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// This node's id
    pub id: NodeId,
    /// Whole-cluster address map
    pub cluster: ClusterConfig,
    /// Request driver parameters
    pub simulation: SimulationConfig,
    /// Transport parameters
    pub transport: TransportConfig,
    /// Wait between binding and the first request
    pub startup_delay: Duration,
    /// Shared ledger file
    pub ledger: PathBuf,
}

/// A node that is accepting peer connections.
pub struct RunningNode {
    node: Arc<TcpNode>,
    local_addr: SocketAddr,
    server: JoinHandle<std::io::Result<()>>,
}

impl RunningNode {
    /// Bind the configured listen address and start serving.
    pub async fn start(options: &NodeOptions) -> Result<Self, ServerError> {
        let (listen, _) = options.cluster.directory_for(options.id)?;
        let acceptor = TcpAcceptor::bind(&listen).await?;
        Self::start_with(options, acceptor)
    }

    /// Start serving on an already bound acceptor.
    pub fn start_with(options: &NodeOptions, acceptor: TcpAcceptor) -> Result<Self, ServerError> {
        let (_, directory) = options.cluster.directory_for(options.id)?;
        let peers: Vec<NodeId> = directory.ids().collect();
        let engine = Engine::new(options.id, peers)?;
        let events = Arc::new(FileEventSink::open(&options.ledger)?);
        let transport = FramedTransport::new(TcpTransport, directory, options.transport.clone());
        let node = Arc::new(Node::new(engine, transport, SystemEnv, events));

        let local_addr = acceptor.local_addr()?;
        info!(node = %options.id, %local_addr, "listening");
        let server = tokio::spawn(serve(acceptor, Arc::clone(&node)));

        Ok(Self { node, local_addr, server })
    }

    /// The node.
    pub fn node(&self) -> &Arc<TcpNode> {
        &self.node
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Keep serving until `shutdown` resolves or the listener fails.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let Self { node, mut server, .. } = self;

        tokio::select! {
            () = shutdown => {
                info!(node = %node.id(), "shutting down");
                server.abort();
                Ok(())
            }
            joined = &mut server => match joined {
                Ok(result) => result.map_err(ServerError::from),
                Err(error) => {
                    warn!(node = %node.id(), %error, "server task ended");
                    Ok(())
                }
            },
        }
    }
}

/// Full peer lifecycle: start, wait the startup delay, run the request
/// driver, then keep answering peers until `shutdown`.
pub async fn run(options: NodeOptions, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
    let running = RunningNode::start(&options).await?;

    tokio::time::sleep(options.startup_delay).await;
    run_simulation(running.node(), &options.simulation).await?;

    info!(node = %options.id, "requests done, still serving peers");
    running.serve_until(shutdown).await
}
