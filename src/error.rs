use thiserror::Error;
use tonic::{Code, Status};

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Chord protocol error: {0}")]
    Chord(#[from] ChordError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Server error: {0}")]
    Server(String),
}

/// Failures talking to a remote peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by peer: {0}")]
    Rejected(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<Status> for NetworkError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::NotFound => NetworkError::NotFound(status.message().to_string()),
            Code::InvalidArgument | Code::Aborted | Code::FailedPrecondition => {
                NetworkError::Rejected(status.message().to_string())
            }
            Code::DeadlineExceeded => NetworkError::Timeout,
            Code::Unavailable => NetworkError::PeerUnreachable(status.message().to_string()),
            _ => NetworkError::Transport(status.to_string()),
        }
    }
}

impl From<tonic::transport::Error> for NetworkError {
    fn from(e: tonic::transport::Error) -> Self {
        NetworkError::ConnectionFailed(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ChordError {
    #[error("Predecessor is not known")]
    PredecessorUnknown,

    #[error("Key transfer to {candidate} aborted: {source}")]
    TransferAborted {
        candidate: String,
        #[source]
        source: NetworkError,
    },

    #[error("Invalid ring capacity: {0} bits (expected 1..=64)")]
    InvalidCapacity(u32),

    #[error("Failed to join ring: {0}")]
    JoinFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Peer call failed: {0}")]
    Peer(#[from] NetworkError),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Failed to decode value for key {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Failed to encode value for key {key}: {reason}")]
    Encode { key: String, reason: String },
}

impl From<ChordError> for Status {
    fn from(e: ChordError) -> Self {
        match e {
            ChordError::PredecessorUnknown => Status::not_found(e.to_string()),
            ChordError::TransferAborted { .. } => Status::aborted(e.to_string()),
            ChordError::InvalidCapacity(_) | ChordError::InvalidRequest(_) => {
                Status::invalid_argument(e.to_string())
            }
            ChordError::Storage(StorageError::Decode { .. }) => {
                Status::invalid_argument(e.to_string())
            }
            ChordError::Storage(StorageError::KeyNotFound) => Status::not_found(e.to_string()),
            ChordError::Peer(_) => Status::unavailable(e.to_string()),
            ChordError::JoinFailed(_) | ChordError::Storage(_) => Status::internal(e.to_string()),
        }
    }
}
