//! Node wiring: one UDP socket shared by the heartbeat task, the receive loop (protocol
//! dispatcher) and the sender-side calls made by the console or an embedder.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lantalk_core::wire::encode_frame;
use lantalk_core::{Action, Frame, NodeCore, PeerRecord};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::NodeError;
use crate::net;
use crate::pending::PendingReplies;
use crate::{exchange, transfer};

const EVENT_CHANNEL_SIZE: usize = 256;
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Something the node observed that a user may want to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    PeerDiscovered {
        identity: String,
        address: SocketAddr,
    },
    MessageReceived {
        from: SocketAddr,
        identity: Option<String>,
        text: String,
    },
    /// A file was written. `verified` is false when its hash did not match.
    FileReceived {
        from: SocketAddr,
        path: PathBuf,
        verified: bool,
    },
    /// An inbound transfer ended without a usable file.
    TransferFailed {
        from: SocketAddr,
        id: String,
        reason: String,
    },
}

/// State shared by the node's tasks and its sender-side calls.
pub(crate) struct Shared {
    pub config: Config,
    pub socket: UdpSocket,
    pub local_addr: SocketAddr,
    pub core: Mutex<NodeCore>,
    pub pending: PendingReplies,
    pub events: broadcast::Sender<NodeEvent>,
    /// Held for the whole of an outgoing transfer; CHUNK frames carry no id, so one at a time.
    pub transfer_lock: Mutex<()>,
}

impl Shared {
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    pub async fn send_frame(&self, to: SocketAddr, frame: &Frame) -> Result<(), NodeError> {
        let bytes = encode_frame(frame)?;
        self.socket.send_to(&bytes, to).await?;
        Ok(())
    }
}

/// A running node. Dropping it stops the background tasks.
pub struct Node {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind the protocol socket and start the heartbeat, receive and maintenance tasks.
    pub async fn start(config: Config) -> io::Result<Node> {
        let socket = net::bind_protocol_socket(config.bind_addr())?;
        let port = socket.local_addr()?.port();
        let ip = config.advertise_ip.unwrap_or_else(net::outward_ip);
        let local_addr = SocketAddr::new(ip, port);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let shared = Arc::new(Shared {
            core: Mutex::new(NodeCore::new(config.node_name.clone(), local_addr)),
            config,
            socket,
            local_addr,
            pending: PendingReplies::new(),
            events,
            transfer_lock: Mutex::new(()),
        });
        info!(node = %shared.config.node_name, %local_addr, "node started");

        let tasks = vec![
            tokio::spawn(heartbeat_loop(shared.clone())),
            tokio::spawn(recv_loop(shared.clone())),
            tokio::spawn(maintenance_loop(shared.clone())),
        ];
        Ok(Node { shared, tasks })
    }

    pub fn node_name(&self) -> &str {
        &self.shared.config.node_name
    }

    /// Outward-facing address (advertised IP and bound port).
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of known peers.
    pub async fn list_peers(&self) -> Vec<PeerRecord> {
        self.shared.core.lock().await.registry().list()
    }

    /// Send a short text message and wait for its acknowledgment.
    pub async fn talk(&self, identity: &str, text: &str) -> Result<(), NodeError> {
        exchange::talk(&self.shared, identity, text).await
    }

    /// Transfer a local file to a peer.
    pub async fn send_file(
        &self,
        identity: &str,
        local_path: &Path,
    ) -> Result<transfer::TransferReport, NodeError> {
        transfer::send_file(&self.shared, identity, local_path).await
    }

    /// Stop the background tasks.
    pub fn shutdown(mut self) {
        self.abort_tasks();
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn heartbeat_loop(shared: Arc<Shared>) {
    let frame = shared.core.lock().await.heartbeat_frame();
    let bytes = match encode_frame(&frame) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "cannot encode heartbeat; not announcing");
            return;
        }
    };
    let dest = shared.config.heartbeat_target();
    let interval = shared.config.heartbeat_interval();
    loop {
        match shared.socket.send_to(&bytes, dest).await {
            Ok(_) => debug!(%dest, "heartbeat sent"),
            Err(e) => warn!(%dest, error = %e, "heartbeat send failed"),
        }
        tokio::time::sleep(interval).await;
    }
}

async fn recv_loop(shared: Arc<Shared>) {
    let mut buf = vec![0u8; net::RECV_BUFFER_LEN];
    loop {
        let (n, from) = match shared.socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // e.g. ICMP port unreachable surfaced on the next receive
                debug!(error = %e, "receive failed");
                continue;
            }
        };
        let result = shared
            .core
            .lock()
            .await
            .on_datagram(from, &buf[..n], Instant::now());
        match result {
            Ok(actions) => {
                for action in actions {
                    execute(&shared, action).await;
                }
            }
            Err(e) => debug!(%from, len = n, error = %e, "dropping malformed frame"),
        }
    }
}

async fn maintenance_loop(shared: Arc<Shared>) {
    let session_idle = shared.config.session_idle_timeout();
    let peer_ttl = shared.config.peer_timeout();
    if session_idle.is_none() && peer_ttl.is_none() {
        return;
    }
    loop {
        tokio::time::sleep(MAINTENANCE_INTERVAL).await;
        let expired = shared
            .core
            .lock()
            .await
            .expire(Instant::now(), session_idle, peer_ttl);
        if !expired.sessions.is_empty() {
            debug!(count = expired.sessions.len(), "idle transfers dropped");
        }
    }
}

/// Carry out one action returned by the core.
pub(crate) async fn execute(shared: &Arc<Shared>, action: Action) {
    match action {
        Action::Send { to, frame } => {
            if let Err(e) = shared.send_frame(to, &frame).await {
                warn!(%to, kind = %frame.kind(), error = %e, "send failed");
            }
        }
        Action::Reply { from, reply } => {
            if let Err(reply) = shared.pending.deliver(reply).await {
                warn!(%from, id = %reply.id(), "unexpected response; no request is waiting for it");
            }
        }
        Action::PeerDiscovered { identity, address } => {
            shared.emit(NodeEvent::PeerDiscovered { identity, address });
        }
        Action::Message {
            from,
            identity,
            id,
            text,
        } => {
            info!(
                %from,
                identity = identity.as_deref().unwrap_or("?"),
                %id,
                %text,
                "message received"
            );
            shared.emit(NodeEvent::MessageReceived {
                from,
                identity,
                text,
            });
        }
        Action::Finalize(fin) => {
            tokio::spawn(transfer::finalize(shared.clone(), fin));
        }
        Action::TransferFailed { from, id, reason } => {
            shared.emit(NodeEvent::TransferFailed {
                from,
                id,
                reason: reason.to_string(),
            });
        }
    }
}
