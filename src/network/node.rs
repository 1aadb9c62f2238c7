use crate::chord::node::ChordNode;
use crate::chord::workers::spawn_maintenance;
use crate::config::NodeConfig;
use crate::error::{NetworkError, OverlayError};
use crate::network::grpc::{GrpcConnector, GrpcThread};
use crate::storage::KeyValueStore;
use futures::future::join_all;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running overlay node: gRPC server, maintenance tasks and the shared `ChordNode`.
pub struct ChordPeer {
    config: NodeConfig,
    node: Arc<ChordNode>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    grpc_handle: Option<JoinHandle<Result<(), NetworkError>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ChordPeer {
    /// Binds the listen address and starts serving. Maintenance is not started yet.
    ///
    /// A port of 0 binds an ephemeral port; the node then advertises (and hashes)
    /// the address actually bound.
    pub async fn new(
        config: NodeConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, OverlayError> {
        config.validate()?;
        let ring = config.ring()?;

        let listener = TcpListener::bind(&config.address).await.map_err(|e| {
            OverlayError::Server(format!("Failed to bind {}: {}", config.address, e))
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            OverlayError::Server(format!("Failed to read bound address: {}", e))
        })?;

        let advertised = if config.address.ends_with(":0") {
            local_addr.to_string()
        } else {
            config.address.clone()
        };

        let connector = Arc::new(GrpcConnector::from_config(&config));
        let node = Arc::new(ChordNode::new(ring, advertised, store, connector));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let grpc_thread = GrpcThread::new(node.clone(), listener, shutdown_rx);
        let grpc_handle = tokio::spawn(grpc_thread.run());
        info!("Node {} listening on {}", node.node(), local_addr);

        Ok(Self {
            config,
            node,
            local_addr,
            shutdown_tx,
            grpc_handle: Some(grpc_handle),
            workers: Vec::new(),
        })
    }

    /// `new`, then join through the configured contact (if any) and start maintenance.
    pub async fn start(
        config: NodeConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, OverlayError> {
        let contact = config.contact.clone();
        let mut peer = Self::new(config, store).await?;

        if let Some(contact) = contact {
            if let Err(e) = peer.join(&contact).await {
                error!("Failed to join through {}: {}", contact, e);
                peer.shutdown().await?;
                return Err(e);
            }
        } else {
            info!(
                "Created new ring of {} bits at {}",
                peer.node.ring().bits(),
                peer.node.node()
            );
        }

        peer.start_maintenance();
        Ok(peer)
    }

    pub fn node(&self) -> &Arc<ChordNode> {
        &self.node
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn address(&self) -> &str {
        self.node.address()
    }

    pub async fn join(&self, contact: &str) -> Result<(), OverlayError> {
        self.node.join(contact).await?;
        Ok(())
    }

    pub fn start_maintenance(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.workers = spawn_maintenance(&self.node, self.config.maintenance, &shutdown_rx);
    }

    /// Runs until Ctrl-C or until the gRPC server stops on its own, then shuts down.
    pub async fn run(mut self) -> Result<(), OverlayError> {
        self.start_maintenance();

        let server_result = match self.grpc_handle.as_mut() {
            Some(handle) => {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => {
                        if let Err(e) = signal {
                            warn!("Failed to listen for Ctrl-C: {}", e);
                        }
                        info!("Shutdown requested for {}", self.node.node());
                        None
                    }
                    joined = handle => Some(joined),
                }
            }
            None => None,
        };

        if let Some(joined) = server_result {
            self.grpc_handle = None;
            self.stop_workers().await;
            return match joined {
                Ok(result) => result.map_err(OverlayError::from),
                Err(e) => Err(OverlayError::Server(format!("gRPC task failed: {}", e))),
            };
        }

        self.shutdown().await
    }

    /// Stops maintenance and the gRPC server, waiting for both.
    pub async fn shutdown(mut self) -> Result<(), OverlayError> {
        self.stop_workers().await;

        if let Some(handle) = self.grpc_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(e) => {
                    return Err(OverlayError::Server(format!("gRPC task failed: {}", e)));
                }
            }
        }

        info!("Node {} shut down gracefully", self.node.node());
        Ok(())
    }

    async fn stop_workers(&mut self) {
        self.shutdown_tx.send_replace(true);
        for result in join_all(self.workers.drain(..)).await {
            if let Err(e) = result {
                warn!("Maintenance task ended abnormally: {}", e);
            }
        }
    }
}
