use crate::chord::node::ChordNode;
use crate::error::NetworkError;
use crate::network::grpc::server::OverlayService;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Runs the gRPC server for one node on an already bound listener until shutdown.
pub struct GrpcThread {
    node: Arc<ChordNode>,
    listener: TcpListener,
    shutdown_rx: watch::Receiver<bool>,
}

impl GrpcThread {
    pub fn new(
        node: Arc<ChordNode>,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            node,
            listener,
            shutdown_rx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(|e| {
            NetworkError::Transport(format!("Failed to read listener address: {}", e))
        })
    }

    pub async fn run(self) -> Result<(), NetworkError> {
        let addr = self.local_addr()?;
        info!("Starting gRPC server on {} for {}", addr, self.node.node());

        let service = Arc::new(OverlayService::new(self.node.clone()));
        let mut shutdown_rx = self.shutdown_rx;
        let shutdown = async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        };

        let result = Server::builder()
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .add_service(service.lookup_server())
            .add_service(service.predecessor_server())
            .add_service(service.check_server())
            .add_service(service.data_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(self.listener), shutdown)
            .await;

        match result {
            Ok(()) => {
                info!("gRPC server on {} shut down gracefully", addr);
                Ok(())
            }
            Err(e) => {
                error!("gRPC server encountered a fatal error: {:?}", e);
                Err(NetworkError::Transport(format!("Server error: {}", e)))
            }
        }
    }
}
