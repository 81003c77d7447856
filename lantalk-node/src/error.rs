use std::io;

use lantalk_core::FrameEncodeError;
use thiserror::Error;

/// Failure of a collaborator call (`talk`, `send_file`). `Display` is the reason shown to users.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("unknown peer {0:?}")]
    UnknownPeer(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("no acknowledgment before timeout")]
    NoAcknowledgment,
    #[error("receiver reported a hash mismatch")]
    HashMismatch,
    #[error("rejected by peer: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode frame: {0}")]
    Frame(#[from] FrameEncodeError),
    #[error("node is shutting down")]
    Closed,
}
