//! `lamport-node`: one peer of a Lamport mutual-exclusion cluster.
//!
//! Start one process per entry of the cluster config:
//!
//! ```text
//! lamport-node --id 1 --config nodes_config.json
//! lamport-node --id 2 --config nodes_config.json
//! lamport-node --id 3 --config nodes_config.json
//! ```

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use lamport_core::{config::ClusterConfig, driver::SimulationConfig, transport::TransportConfig};
use lamport_node::{NodeOptions, logging, runner};
use lamport_proto::NodeId;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lamport-node")]
#[command(about = "Lamport distributed mutual exclusion peer", long_about = None)]
struct Args {
    /// Node id; must be a key of the config file
    #[arg(long)]
    id: NodeId,

    /// JSON file mapping node ids to addresses
    #[arg(long)]
    config: PathBuf,

    /// Number of critical sections to run
    #[arg(long, default_value_t = 3)]
    requests: usize,

    /// Lower bound of the random delay before each request
    #[arg(long, default_value_t = 2000)]
    min_delay_ms: u64,

    /// Upper bound of the random delay before each request
    #[arg(long, default_value_t = 6000)]
    max_delay_ms: u64,

    /// Time spent inside each critical section
    #[arg(long, default_value_t = 2000)]
    hold_ms: u64,

    /// Shared ledger file
    #[arg(long, default_value = "shared_ledger.txt")]
    ledger: PathBuf,

    /// Wait between binding and the first request, so peers can start
    #[arg(long, default_value_t = 1000)]
    startup_delay_ms: u64,

    /// Diagnostic log file, `log_node<id>.txt` by default
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Per-message send timeout
    #[arg(long, default_value_t = 5000)]
    send_timeout_ms: u64,
}

impl Args {
    fn into_options(self) -> Result<NodeOptions, lamport_node::ServerError> {
        let cluster = ClusterConfig::load(&self.config)?;
        Ok(NodeOptions {
            id: self.id,
            cluster,
            simulation: SimulationConfig {
                requests: self.requests,
                min_delay: Duration::from_millis(self.min_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                hold: Duration::from_millis(self.hold_ms),
            },
            transport: TransportConfig { send_timeout: Duration::from_millis(self.send_timeout_ms) },
            startup_delay: Duration::from_millis(self.startup_delay_ms),
            ledger: self.ledger,
        })
    }
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let id = args.id;

    let log_file = args.log_file.clone().unwrap_or_else(|| logging::default_log_file(id));
    if let Err(error) = logging::init(&log_file) {
        eprintln!("cannot open log file {}: {error}", log_file.display());
        return ExitCode::FAILURE;
    }

    let options = match args.into_options() {
        Ok(options) => options,
        Err(error) => {
            error!(node = %id, %error, "invalid configuration");
            return ExitCode::FAILURE;
        },
    };

    info!(node = %id, ledger = %options.ledger.display(), "starting");
    match runner::run(options, ctrl_c()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(node = %id, %error, "node failed");
            ExitCode::FAILURE
        },
    }
}
