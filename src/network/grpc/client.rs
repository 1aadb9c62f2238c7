use crate::chord::peer::{Connector, PeerRpc};
use crate::chord::types::Identifier;
use crate::config::NodeConfig;
use crate::error::NetworkError;
use crate::network::messages::overlay::{
    check_client::CheckClient, data_client::DataClient, lookup_client::LookupClient,
    predecessor_client::PredecessorClient, Address, Empty, Hash, KvMap,
};
use crate::storage::TransferPayload;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// gRPC stubs for one remote node, all sharing a single channel.
///
/// tonic clients are cheap to clone; every call works on its own clone so
/// `&self` suffices and calls can run concurrently.
#[derive(Debug, Clone)]
pub struct GrpcPeer {
    address: String,
    lookup: LookupClient<Channel>,
    predecessor: PredecessorClient<Channel>,
    check: CheckClient<Channel>,
    data: DataClient<Channel>,
}

impl GrpcPeer {
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", address))
            .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", address, e)))?
            .connect_timeout(connect_timeout)
            .timeout(rpc_timeout)
            .tcp_nodelay(true);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", address, e)))?;

        debug!("Opened gRPC channel to {}", address);
        Ok(Self::from_channel(address, channel))
    }

    pub fn from_channel(address: &str, channel: Channel) -> Self {
        Self {
            address: address.to_string(),
            lookup: LookupClient::new(channel.clone()),
            predecessor: PredecessorClient::new(channel.clone()),
            check: CheckClient::new(channel.clone()),
            data: DataClient::new(channel),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PeerRpc for GrpcPeer {
    async fn find_successor(&self, target: Identifier) -> Result<String, NetworkError> {
        let mut client = self.lookup.clone();
        let response = client.find_successor(Hash::from(target)).await?;
        Ok(response.into_inner().address)
    }

    async fn get_predecessor(&self) -> Result<String, NetworkError> {
        let mut client = self.predecessor.clone();
        let response = client.get_predecessor(Empty {}).await?;
        Ok(response.into_inner().address)
    }

    async fn update_predecessor(&self, candidate: &str) -> Result<(), NetworkError> {
        let mut client = self.predecessor.clone();
        client.update_predecessor(Address::from(candidate)).await?;
        Ok(())
    }

    async fn live_check(&self) -> Result<(), NetworkError> {
        let mut client = self.check.clone();
        client.live_check(Empty {}).await?;
        Ok(())
    }

    async fn transfer_data(&self, payload: TransferPayload) -> Result<(), NetworkError> {
        let mut client = self.data.clone();
        client.transfer_data(KvMap::from(payload)).await?;
        Ok(())
    }
}

/// Opens `GrpcPeer`s with the node's timeouts.
#[derive(Debug, Clone, Copy)]
pub struct GrpcConnector {
    connect_timeout: Duration,
    rpc_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration, rpc_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            rpc_timeout,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.connect_timeout, config.rpc_timeout)
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn PeerRpc>, NetworkError> {
        let peer = GrpcPeer::connect(address, self.connect_timeout, self.rpc_timeout).await?;
        Ok(Arc::new(peer))
    }
}
