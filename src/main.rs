use chord_overlay::{ChordPeer, MaintenanceConfig, MemoryStore, NodeConfig};
use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "chord-overlay")]
#[command(about = "A Chord DHT overlay node")]
struct Cli {
    /// host:port to listen on; hashed into the node identifier
    address: String,

    /// Identifier width m (the ring holds 2^m identifiers)
    ring_bits: u32,

    /// Address of a ring member to join through; omit to start a new ring
    #[arg(short = 'c', long = "contact")]
    contact: Option<String>,

    /// Interval between maintenance ticks, in milliseconds
    #[arg(long = "period-ms", default_value_t = 10_000)]
    period_ms: u64,

    /// Consecutive failures tolerated before a maintenance task gives up on a peer
    #[arg(long = "max-retries", default_value_t = 3)]
    max_retries: u32,

    /// Deadline for a single outbound RPC, in milliseconds
    #[arg(long = "rpc-timeout-ms", default_value_t = 5_000)]
    rpc_timeout_ms: u64,

    /// Deadline for opening a connection to a peer, in milliseconds
    #[arg(long = "connect-timeout-ms", default_value_t = 3_000)]
    connect_timeout_ms: u64,
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let mut config = NodeConfig::new(self.address, self.ring_bits)
            .with_maintenance(MaintenanceConfig {
                period: Duration::from_millis(self.period_ms),
                max_retries: self.max_retries,
            })
            .with_rpc_timeout(Duration::from_millis(self.rpc_timeout_ms))
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        if let Some(contact) = self.contact {
            config = config.with_contact(contact);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    // Also installs the log bridge, so the library's `log` records land here
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    match serde_json::to_string(&config) {
        Ok(json) => info!("Starting node with configuration {}", json),
        Err(_) => info!("Starting node with configuration {:?}", config),
    }

    let store = Arc::new(MemoryStore::new());
    let peer = ChordPeer::start(config, store).await.map_err(|e| {
        error!("Failed to start node: {}", e);
        format!("Failed to start node: {}", e)
    })?;

    info!("Node {} is running; press Ctrl-C to stop", peer.node().node());

    if let Err(e) = peer.run().await {
        error!("Node error: {}", e);
        return Err(format!("Node error: {}", e));
    }

    Ok(())
}
