use crate::chord::key_index::KeyIndex;
use crate::chord::peer::{Connector, PeerHandle};
use crate::chord::routing::{Predecessor, RoutingState};
use crate::chord::types::{Identifier, Node, Ring};
use crate::error::{ChordError, NetworkError};
use crate::storage::{KeyObserver, KeyValueStore, TransferPayload};
use log::{debug, info, warn};
use std::sync::{Arc, PoisonError, RwLock};

/// Keeps the key index in step with the store through its callbacks.
struct IndexRegistrar {
    ring: Ring,
    index: Arc<RwLock<KeyIndex>>,
}

impl KeyObserver for IndexRegistrar {
    fn on_key_stored(&self, key: &str) {
        let hash = self.ring.hash(key);
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, hash);
    }

    fn on_key_removed(&self, key: &str) {
        let hash = self.ring.hash(key);
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .delete(key, hash);
    }
}

/// One ring member: routing state, key index and the local store, plus the
/// entry points remote peers call.
pub struct ChordNode {
    ring: Ring,
    routing: RoutingState,
    key_index: Arc<RwLock<KeyIndex>>,
    store: Arc<dyn KeyValueStore>,
    connector: Arc<dyn Connector>,
}

impl ChordNode {
    /// Creates a node that only knows itself and registers the index callbacks with `store`.
    pub fn new(
        ring: Ring,
        address: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let local = PeerHandle::new(Node::new(&ring, address), connector.clone());
        let key_index = Arc::new(RwLock::new(KeyIndex::new()));

        store.set_observer(Arc::new(IndexRegistrar {
            ring,
            index: key_index.clone(),
        }));

        info!(
            "Created node {} on a {}-bit ring",
            local.node(),
            ring.bits()
        );

        Self {
            ring,
            routing: RoutingState::new(ring, local),
            key_index,
            store,
            connector,
        }
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn node(&self) -> &Node {
        self.routing.local_node()
    }

    pub fn id(&self) -> Identifier {
        self.node().id
    }

    pub fn address(&self) -> &str {
        &self.node().address
    }

    pub fn routing(&self) -> &RoutingState {
        &self.routing
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// A fresh, not yet connected handle for `address`.
    pub fn peer(&self, address: &str) -> PeerHandle {
        PeerHandle::new(Node::new(&self.ring, address), self.connector.clone())
    }

    pub fn is_local_address(&self, address: &str) -> bool {
        address == self.address()
    }

    /// Handle for `address`, reusing a handle we already hold when there is one.
    pub async fn resolve_peer(&self, address: &str) -> PeerHandle {
        match self.routing.known_peer(address).await {
            Some(peer) => peer,
            None => self.peer(address),
        }
    }

    /// Number of keys in the ownership index.
    pub fn indexed_keys(&self) -> usize {
        self.key_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn index_contains(&self, key: &str) -> bool {
        self.key_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key, self.ring.hash(key))
    }

    /// Whether `key` falls in (predecessor, self]. With no known predecessor the
    /// node claims the whole ring.
    pub async fn owns(&self, key: &str) -> bool {
        match self.routing.predecessor().await {
            Predecessor::Known(pred) => {
                self.ring
                    .is_between(self.ring.hash(key), pred.id(), self.id())
            }
            Predecessor::Unknown => true,
        }
    }

    /// Joins the ring that `contact` belongs to by asking it for our successor.
    pub async fn join(&self, contact: &str) -> Result<(), ChordError> {
        let contact = self.peer(contact);
        let successor_address = contact
            .find_successor(self.id())
            .await
            .map_err(|e| {
                ChordError::JoinFailed(format!(
                    "lookup through {} failed: {}",
                    contact.node(),
                    e
                ))
            })?;

        let successor = self.resolve_peer(&successor_address).await;
        if !self.routing.is_local(&successor) {
            successor.connect().await.map_err(|e| {
                ChordError::JoinFailed(format!(
                    "successor {} unreachable: {}",
                    successor.node(),
                    e
                ))
            })?;
        }

        info!(
            "{} joining chord ring of {}: successor is {}",
            self.node(),
            contact.node(),
            successor.node()
        );
        self.routing.set_successor(successor).await;
        Ok(())
    }

    /// Address of the node responsible for `target`.
    ///
    /// Answers locally when the target is ours or our successor's; otherwise forwards
    /// to the farthest finger preceding the target and returns its answer.
    pub async fn find_successor(&self, target: Identifier) -> Result<String, ChordError> {
        debug!("FindSuccessor({}) at {}", target, self.node());

        if let Predecessor::Known(pred) = self.routing.predecessor().await {
            if self.ring.is_between(target, pred.id(), self.id()) {
                return Ok(self.address().to_string());
            }
        }

        let successor = self.routing.successor().await;
        if self.ring.is_between(target, self.id(), successor.id()) {
            return Ok(successor.address().to_string());
        }

        match self.routing.closest_preceding_finger(target).await {
            Some(finger) => {
                debug!("FindSuccessor({}) forwarded to {}", target, finger.node());
                Ok(finger.find_successor(target).await?)
            }
            None => Ok(successor.address().to_string()),
        }
    }

    pub async fn get_predecessor(&self) -> Result<String, ChordError> {
        match self.routing.predecessor().await {
            Predecessor::Known(pred) => Ok(pred.address().to_string()),
            Predecessor::Unknown => Err(ChordError::PredecessorUnknown),
        }
    }

    /// A node claiming to be our predecessor.
    ///
    /// Accepted when no predecessor is known or when the candidate sits strictly
    /// between the current predecessor and us. The keys the candidate takes over are
    /// pushed to it first; the predecessor is only committed once the push succeeded.
    /// Returns whether the candidate was accepted.
    pub async fn update_predecessor(&self, candidate: &str) -> Result<bool, ChordError> {
        if self.is_local_address(candidate) {
            debug!("Ignoring self-nomination as predecessor of {}", self.node());
            return Ok(false);
        }

        let candidate = self.peer(candidate);
        let pred_hash = match self.routing.predecessor().await {
            Predecessor::Known(pred) => {
                if !self.ring.is_strictly_between(candidate.id(), pred.id(), self.id()) {
                    debug!(
                        "{} keeps predecessor {} over candidate {}",
                        self.node(),
                        pred.node(),
                        candidate.node()
                    );
                    return Ok(false);
                }
                pred.id()
            }
            Predecessor::Unknown => self.id(),
        };

        let keys = self
            .key_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys_to_transfer(&self.ring, pred_hash, candidate.id(), self.id());

        let payload = self.store.export_for_transfer(&keys)?;
        let moved = payload.len();
        if !payload.is_empty() {
            candidate
                .transfer_data(payload)
                .await
                .map_err(|source| {
                    warn!(
                        "Handing {} keys to {} failed, keeping current predecessor: {}",
                        moved,
                        candidate.node(),
                        source
                    );
                    ChordError::TransferAborted {
                        candidate: candidate.address().to_string(),
                        source,
                    }
                })?;
        }

        self.routing
            .set_predecessor(Predecessor::Known(candidate.clone()))
            .await;

        if !keys.is_empty() {
            self.store.evict(&keys);
            let mut index = self
                .key_index
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for key in &keys {
                index.delete(key, self.ring.hash(key));
            }
        }

        info!(
            "{} accepted {} as predecessor, handing over {} keys",
            self.node(),
            candidate.node(),
            moved
        );
        Ok(true)
    }

    pub fn live_check(&self) {
        debug!("LiveCheck at {}", self.node());
    }

    /// Imports a handoff payload and indexes its keys. A malformed payload changes nothing.
    pub fn transfer_data(&self, payload: &TransferPayload) -> Result<usize, ChordError> {
        let keys = self.store.import_from_transfer(payload)?;
        let added = self
            .key_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .bulk_insert(&keys, |k| self.ring.hash(k));
        info!("{} received {} keys ({} new)", self.node(), keys.len(), added);
        Ok(keys.len())
    }

    /// Asks our successor who its predecessor is. The local predecessor is read
    /// directly when we are our own successor.
    pub(crate) async fn successor_predecessor(
        &self,
        successor: &PeerHandle,
    ) -> Result<String, NetworkError> {
        if self.routing.is_local(successor) {
            return match self.routing.predecessor().await {
                Predecessor::Known(pred) => Ok(pred.address().to_string()),
                Predecessor::Unknown => {
                    Err(NetworkError::NotFound("predecessor not known".into()))
                }
            };
        }
        successor.get_predecessor().await
    }
}
