use crate::chord::node::ChordNode;
use crate::network::messages::conversions::parse_address;
use crate::network::messages::overlay::{
    check_server::{Check, CheckServer},
    data_server::{Data, DataServer},
    lookup_server::{Lookup, LookupServer},
    predecessor_server::{Predecessor, PredecessorServer},
    Address, Empty, Hash, KvMap,
};
use log::{debug, warn};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Serves the four overlay services on top of one `ChordNode`.
#[derive(Clone)]
pub struct OverlayService {
    node: Arc<ChordNode>,
}

impl OverlayService {
    pub fn new(node: Arc<ChordNode>) -> Self {
        Self { node }
    }

    pub fn lookup_server(self: &Arc<Self>) -> LookupServer<Self> {
        LookupServer::from_arc(self.clone())
    }

    pub fn predecessor_server(self: &Arc<Self>) -> PredecessorServer<Self> {
        PredecessorServer::from_arc(self.clone())
    }

    pub fn check_server(self: &Arc<Self>) -> CheckServer<Self> {
        CheckServer::from_arc(self.clone())
    }

    pub fn data_server(self: &Arc<Self>) -> DataServer<Self> {
        DataServer::from_arc(self.clone())
    }
}

#[tonic::async_trait]
impl Lookup for OverlayService {
    async fn find_successor(
        &self,
        request: Request<Hash>,
    ) -> Result<Response<Address>, Status> {
        let target = request.into_inner().hash;
        if target > self.node.ring().max_id() {
            return Err(Status::invalid_argument(format!(
                "identifier {} outside a {}-bit ring",
                target,
                self.node.ring().bits()
            )));
        }

        let address = self.node.find_successor(target).await.map_err(|e| {
            warn!("FindSuccessor({}) failed: {}", target, e);
            Status::from(e)
        })?;
        Ok(Response::new(Address { address }))
    }
}

#[tonic::async_trait]
impl Predecessor for OverlayService {
    async fn get_predecessor(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Address>, Status> {
        let address = self.node.get_predecessor().await?;
        Ok(Response::new(Address { address }))
    }

    async fn update_predecessor(
        &self,
        request: Request<Address>,
    ) -> Result<Response<Empty>, Status> {
        let candidate = parse_address(request.into_inner())?;
        let accepted = self.node.update_predecessor(&candidate).await?;
        debug!("UpdatePredecessor({}) accepted: {}", candidate, accepted);
        Ok(Response::new(Empty {}))
    }
}

#[tonic::async_trait]
impl Check for OverlayService {
    async fn live_check(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.node.live_check();
        Ok(Response::new(Empty {}))
    }
}

#[tonic::async_trait]
impl Data for OverlayService {
    async fn transfer_data(
        &self,
        request: Request<KvMap>,
    ) -> Result<Response<Empty>, Status> {
        let payload = request.into_inner().entries;
        self.node.transfer_data(&payload).map_err(|e| {
            warn!("Rejected key transfer of {} entries: {}", payload.len(), e);
            Status::from(e)
        })?;
        Ok(Response::new(Empty {}))
    }
}
