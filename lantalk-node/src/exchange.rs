//! Message exchange: request/acknowledge round trips over the shared socket.

use std::net::SocketAddr;

use lantalk_core::wire::encode_frame;
use lantalk_core::{new_request_id, Frame, Reply};
use tracing::{debug, info};

use crate::error::NodeError;
use crate::node::Shared;

/// Send `frame` and wait for the ACK/NACK carrying `id`, retrying per the configured policy.
/// The waiter is registered before each send so a fast reply cannot be missed.
pub(crate) async fn request(
    shared: &Shared,
    to: SocketAddr,
    id: &str,
    frame: &Frame,
) -> Result<Reply, NodeError> {
    let bytes = encode_frame(frame)?;
    let timeout = shared.config.reply_timeout();
    let mut backoff = shared.config.retry.backoff();
    let mut attempt = 1u32;
    loop {
        let rx = shared.pending.register(id).await;
        if let Err(e) = shared.socket.send_to(&bytes, to).await {
            shared.pending.cancel(id).await;
            return Err(e.into());
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(_)) => return Err(NodeError::Closed),
            Err(_) => {
                shared.pending.cancel(id).await;
                let Some(pause) = backoff.next() else {
                    debug!(%to, id, kind = %frame.kind(), attempts = attempt, "no reply");
                    return Err(NodeError::NoAcknowledgment);
                };
                debug!(%to, id, attempt, ?pause, "no reply; retrying");
                tokio::time::sleep(pause).await;
                attempt += 1;
            }
        }
    }
}

/// Resolve a peer identity to its address.
pub(crate) async fn resolve(shared: &Shared, identity: &str) -> Result<SocketAddr, NodeError> {
    shared
        .core
        .lock()
        .await
        .resolve(identity)
        .ok_or_else(|| NodeError::UnknownPeer(identity.to_string()))
}

pub(crate) async fn talk(shared: &Shared, identity: &str, text: &str) -> Result<(), NodeError> {
    let to = resolve(shared, identity).await?;
    let id = new_request_id();
    let frame = Frame::Talk {
        id: id.clone(),
        text: text.to_string(),
    };
    match request(shared, to, &id, &frame).await? {
        Reply::Ack { .. } => {
            info!(peer = identity, %to, id = %id, "message acknowledged");
            Ok(())
        }
        Reply::Nack { reason, .. } => Err(NodeError::Rejected(reason)),
    }
}
