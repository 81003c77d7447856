//! LANTalk protocol core: framing, peer registry, chunked transfer sessions.
//! Host-driven: no I/O; host passes datagrams and receives actions.

pub mod chunk;
pub mod core;
pub mod integrity;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod session;
pub mod wire;

pub use crate::core::{Action, Expired, Finalize, NodeCore, Reply};
pub use protocol::{new_request_id, Kind};
pub use registry::{PeerRecord, PeerRegistry, Upsert};
pub use retry::RetryPolicy;
pub use session::{SessionError, Verdict};
pub use wire::{decode_frame, encode_frame, Frame, FrameEncodeError, FrameError};
