//! Chord overlay: a ring of peers that share a key space through consistent
//! hashing, route lookups over finger tables and hand keys over as nodes join.

pub mod chord;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;

pub use chord::{ChordNode, Identifier, MaintenanceConfig, Node, Ring};
pub use config::NodeConfig;
pub use error::{ChordError, NetworkError, OverlayError, StorageError};
pub use network::node::ChordPeer;
pub use storage::{KeyValueStore, MemoryStore};
