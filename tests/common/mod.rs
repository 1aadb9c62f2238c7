#![allow(dead_code)]

use async_trait::async_trait;
use chord_overlay::chord::peer::{Connector, PeerRpc};
use chord_overlay::chord::workers::{
    FingerFixer, MaintenanceTask, Notifier, PredecessorChecker, Stabilizer,
};
use chord_overlay::storage::TransferPayload;
use chord_overlay::{ChordError, ChordNode, Identifier, MemoryStore, NetworkError, Ring};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tonic::Status;

/// In-process network: `PeerRpc` calls go straight to the target `ChordNode`.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    nodes: Arc<RwLock<HashMap<String, Arc<ChordNode>>>>,
    down: Arc<RwLock<HashSet<String>>>,
    lookups: Arc<AtomicUsize>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node with an empty store and registers it.
    pub fn spawn_node(&self, ring: Ring, address: &str) -> Arc<ChordNode> {
        let node = Arc::new(ChordNode::new(
            ring,
            address,
            Arc::new(MemoryStore::new()),
            Arc::new(self.clone()),
        ));
        self.nodes
            .write()
            .unwrap()
            .insert(address.to_string(), node.clone());
        node
    }

    /// Every call to `address` fails from now on.
    pub fn take_down(&self, address: &str) {
        self.down.write().unwrap().insert(address.to_string());
    }

    /// Remote FindSuccessor calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn reset_lookups(&self) {
        self.lookups.store(0, Ordering::SeqCst);
    }

    fn reach(&self, address: &str) -> Result<Arc<ChordNode>, NetworkError> {
        if self.down.read().unwrap().contains(address) {
            return Err(NetworkError::PeerUnreachable(address.to_string()));
        }
        self.nodes
            .read()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| NetworkError::ConnectionFailed(address.to_string()))
    }
}

/// Errors cross the fake wire the same way they cross gRPC.
fn over_the_wire(e: ChordError) -> NetworkError {
    NetworkError::from(Status::from(e))
}

struct LocalPeer {
    address: String,
    network: LocalNetwork,
}

#[async_trait]
impl PeerRpc for LocalPeer {
    async fn find_successor(&self, target: Identifier) -> Result<String, NetworkError> {
        let node = self.network.reach(&self.address)?;
        self.network.lookups.fetch_add(1, Ordering::SeqCst);
        node.find_successor(target).await.map_err(over_the_wire)
    }

    async fn get_predecessor(&self) -> Result<String, NetworkError> {
        let node = self.network.reach(&self.address)?;
        node.get_predecessor().await.map_err(over_the_wire)
    }

    async fn update_predecessor(&self, candidate: &str) -> Result<(), NetworkError> {
        let node = self.network.reach(&self.address)?;
        node.update_predecessor(candidate)
            .await
            .map(|_| ())
            .map_err(over_the_wire)
    }

    async fn live_check(&self) -> Result<(), NetworkError> {
        let node = self.network.reach(&self.address)?;
        node.live_check();
        Ok(())
    }

    async fn transfer_data(&self, payload: TransferPayload) -> Result<(), NetworkError> {
        let node = self.network.reach(&self.address)?;
        node.transfer_data(&payload).map(|_| ()).map_err(over_the_wire)
    }
}

#[async_trait]
impl Connector for LocalNetwork {
    async fn connect(&self, address: &str) -> Result<Arc<dyn PeerRpc>, NetworkError> {
        self.reach(address)?;
        Ok(Arc::new(LocalPeer {
            address: address.to_string(),
            network: self.clone(),
        }))
    }
}

/// The four maintenance tasks of one node, ticked by hand.
pub struct Maintainer {
    pub node: Arc<ChordNode>,
    notifier: Notifier,
    stabilizer: Stabilizer,
    fixer: FingerFixer,
    checker: PredecessorChecker,
}

impl Maintainer {
    pub fn new(node: Arc<ChordNode>, max_retries: u32) -> Self {
        Self {
            node,
            notifier: Notifier,
            stabilizer: Stabilizer::new(max_retries),
            fixer: FingerFixer::new(max_retries),
            checker: PredecessorChecker::new(max_retries),
        }
    }

    /// One tick of every task, with FixFingers run once per finger.
    pub async fn round(&mut self) {
        let _ = self.notifier.tick(&self.node).await;
        let _ = self.stabilizer.tick(&self.node).await;
        for _ in 0..self.node.routing().finger_count() {
            let _ = self.fixer.tick(&self.node).await;
        }
        let _ = self.checker.tick(&self.node).await;
    }
}

pub async fn run_rounds(maintainers: &mut [Maintainer], rounds: usize) {
    for _ in 0..rounds {
        for maintainer in maintainers.iter_mut() {
            maintainer.round().await;
        }
    }
}

/// First `127.0.0.1:<port>` address hashing to `id`.
pub fn address_with_id(ring: &Ring, id: Identifier) -> String {
    (10_000..=u16::MAX)
        .map(|port| format!("127.0.0.1:{}", port))
        .find(|addr| ring.hash(addr) == id)
        .unwrap_or_else(|| panic!("no port hashes to {}", id))
}

pub fn key_with_id(ring: &Ring, id: Identifier) -> String {
    (0..1_000_000)
        .map(|i| format!("key-{}", i))
        .find(|k| ring.hash(k) == id)
        .unwrap_or_else(|| panic!("no key hashes to {}", id))
}

/// Owner of `target` among `ids`: the first identifier at or after it, clockwise.
pub fn expected_owner(ids: &[Identifier], target: Identifier) -> Identifier {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .copied()
        .find(|id| *id >= target)
        .unwrap_or(sorted[0])
}
