use crate::chord::peer::PeerHandle;
use crate::chord::types::{Identifier, Node, Ring};
use log::debug;
use tokio::sync::RwLock;

/// Whether this node currently knows its predecessor.
#[derive(Clone, Debug, Default)]
pub enum Predecessor {
    Known(PeerHandle),
    #[default]
    Unknown,
}

impl Predecessor {
    pub fn peer(&self) -> Option<&PeerHandle> {
        match self {
            Predecessor::Known(peer) => Some(peer),
            Predecessor::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Predecessor::Known(_))
    }
}

/// This node's view of the ring: its finger table and its predecessor.
///
/// Every finger slot has its own lock so a lookup reading finger i never waits
/// on a maintenance task rewriting finger j. No guard is ever held across an
/// outbound call: accessors hand out clones of the peer handles.
pub struct RoutingState {
    ring: Ring,
    local: PeerHandle,
    fingers: Vec<RwLock<PeerHandle>>,
    predecessor: RwLock<Predecessor>,
}

impl RoutingState {
    /// Starts with every finger pointing at `local` and no predecessor.
    pub fn new(ring: Ring, local: PeerHandle) -> Self {
        let fingers = (0..ring.finger_count())
            .map(|_| RwLock::new(local.clone()))
            .collect();
        Self {
            ring,
            local,
            fingers,
            predecessor: RwLock::new(Predecessor::Unknown),
        }
    }

    pub fn local(&self) -> &PeerHandle {
        &self.local
    }

    pub fn local_node(&self) -> &Node {
        self.local.node()
    }

    pub fn finger_count(&self) -> usize {
        self.fingers.len()
    }

    pub fn is_local(&self, peer: &PeerHandle) -> bool {
        peer.address() == self.local.address()
    }

    pub async fn successor(&self) -> PeerHandle {
        self.fingers[0].read().await.clone()
    }

    pub async fn set_successor(&self, peer: PeerHandle) {
        self.set_finger(0, peer).await;
    }

    /// Returns None for an index past the table.
    pub async fn finger(&self, index: usize) -> Option<PeerHandle> {
        match self.fingers.get(index) {
            Some(slot) => Some(slot.read().await.clone()),
            None => None,
        }
    }

    pub async fn set_finger(&self, index: usize, peer: PeerHandle) {
        let Some(slot) = self.fingers.get(index) else {
            debug!(
                "Ignoring finger index {} past table of {}",
                index,
                self.fingers.len()
            );
            return;
        };
        let mut guard = slot.write().await;
        if guard.address() != peer.address() {
            debug!(
                "Finger {} of {}: {} -> {}",
                index,
                self.local.node(),
                guard.node(),
                peer.node()
            );
        }
        *guard = peer;
    }

    pub async fn predecessor(&self) -> Predecessor {
        self.predecessor.read().await.clone()
    }

    pub async fn set_predecessor(&self, predecessor: Predecessor) {
        *self.predecessor.write().await = predecessor;
    }

    /// Forgets the predecessor only if it is still `address`.
    pub async fn clear_predecessor_if(&self, address: &str) -> bool {
        let mut guard = self.predecessor.write().await;
        match &*guard {
            Predecessor::Known(pred) if pred.address() == address => {
                *guard = Predecessor::Unknown;
                true
            }
            _ => false,
        }
    }

    /// An existing handle for `address` from the fingers or the predecessor, so
    /// its open connection is reused.
    pub async fn known_peer(&self, address: &str) -> Option<PeerHandle> {
        if self.local.address() == address {
            return Some(self.local.clone());
        }
        for slot in &self.fingers {
            let finger = slot.read().await;
            if finger.address() == address {
                return Some(finger.clone());
            }
        }
        self.predecessor
            .read()
            .await
            .peer()
            .filter(|pred| pred.address() == address)
            .cloned()
    }

    /// Snapshot of the finger table, one lock at a time.
    pub async fn fingers(&self) -> Vec<PeerHandle> {
        let mut snapshot = Vec::with_capacity(self.fingers.len());
        for slot in &self.fingers {
            snapshot.push(slot.read().await.clone());
        }
        snapshot
    }

    /// Farthest known node that still precedes `target`, walking fingers m-1 down to 0.
    /// Self-references are skipped; returns None when no finger qualifies.
    pub async fn closest_preceding_finger(&self, target: Identifier) -> Option<PeerHandle> {
        let local_id = self.local.id();
        for slot in self.fingers.iter().rev() {
            let finger = slot.read().await;
            if self.is_local(&finger) {
                continue;
            }
            if self.ring.is_strictly_between(finger.id(), local_id, target) {
                return Some(finger.clone());
            }
        }
        None
    }

    /// Points every finger that referenced `dead` at `replacement` instead.
    /// Returns the number of slots rewritten.
    pub async fn replace_peer(&self, dead: &str, replacement: &PeerHandle) -> usize {
        let mut replaced = 0;
        for slot in &self.fingers {
            let mut finger = slot.write().await;
            if finger.address() == dead {
                *finger = replacement.clone();
                replaced += 1;
            }
        }
        replaced
    }
}
