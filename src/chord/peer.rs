use crate::chord::types::{Identifier, Node};
use crate::error::NetworkError;
use crate::storage::TransferPayload;
use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Outbound calls a node can make on another ring member.
/// Transport-agnostic: implemented by the gRPC client and by in-process test networks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerRpc: Send + Sync {
    /// Address of the node responsible for `target`.
    async fn find_successor(&self, target: Identifier) -> Result<String, NetworkError>;

    /// Fails with `NetworkError::NotFound` when the peer does not know its predecessor.
    async fn get_predecessor(&self) -> Result<String, NetworkError>;

    /// "I believe I am your predecessor."
    async fn update_predecessor(&self, candidate: &str) -> Result<(), NetworkError>;

    async fn live_check(&self) -> Result<(), NetworkError>;

    async fn transfer_data(&self, payload: TransferPayload) -> Result<(), NetworkError>;
}

/// Opens RPC capabilities to an address. Fallible: the peer may be unreachable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn PeerRpc>, NetworkError>;
}

/// Reference to a ring member whose RPC capabilities are opened on first use.
///
/// Cloning is cheap and clones share the same underlying connection.
/// A failed connection attempt is not cached; the next call tries again.
#[derive(Clone)]
pub struct PeerHandle {
    node: Node,
    inner: Arc<LazyRpc>,
}

struct LazyRpc {
    connector: Arc<dyn Connector>,
    rpc: OnceCell<Arc<dyn PeerRpc>>,
}

impl PeerHandle {
    pub fn new(node: Node, connector: Arc<dyn Connector>) -> Self {
        Self {
            node,
            inner: Arc::new(LazyRpc {
                connector,
                rpc: OnceCell::new(),
            }),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn id(&self) -> Identifier {
        self.node.id
    }

    pub fn address(&self) -> &str {
        &self.node.address
    }

    pub fn is_connected(&self) -> bool {
        self.inner.rpc.initialized()
    }

    /// Opens the RPC capabilities now instead of on first call.
    pub async fn connect(&self) -> Result<&Arc<dyn PeerRpc>, NetworkError> {
        self.inner
            .rpc
            .get_or_try_init(|| async {
                debug!("Connecting to peer {}", self.node);
                self.inner.connector.connect(&self.node.address).await
            })
            .await
    }

    pub async fn find_successor(&self, target: Identifier) -> Result<String, NetworkError> {
        self.connect().await?.find_successor(target).await
    }

    pub async fn get_predecessor(&self) -> Result<String, NetworkError> {
        self.connect().await?.get_predecessor().await
    }

    pub async fn update_predecessor(&self, candidate: &str) -> Result<(), NetworkError> {
        self.connect().await?.update_predecessor(candidate).await
    }

    pub async fn live_check(&self) -> Result<(), NetworkError> {
        self.connect().await?.live_check().await
    }

    pub async fn transfer_data(&self, payload: TransferPayload) -> Result<(), NetworkError> {
        self.connect().await?.transfer_data(payload).await
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("node", &self.node)
            .field("connected", &self.is_connected())
            .finish()
    }
}
