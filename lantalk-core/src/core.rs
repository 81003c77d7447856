//! Host-driven API: NodeCore receives datagrams from the host and returns actions.
//! The host owns the socket, the clock and the file system.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::chunk::ReassemblyBuffer;
use crate::integrity;
use crate::protocol::{REASON_ID_IN_USE, REASON_MISSING_CHUNKS, REASON_UNKNOWN_TRANSFER};
use crate::registry::{PeerRecord, PeerRegistry, Upsert};
use crate::session::{ChunkOutcome, Opened, SessionError, SessionTable, Verdict};
use crate::wire::{self, Frame, FrameError};

/// ACK or NACK received for a request this node issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack { id: String, path: Option<String> },
    Nack { id: String, reason: String },
}

impl Reply {
    pub fn id(&self) -> &str {
        match self {
            Reply::Ack { id, .. } | Reply::Nack { id, .. } => id,
        }
    }
}

/// Everything needed to finish an inbound transfer once END has arrived with no gaps.
#[derive(Debug)]
pub struct Finalize {
    pub id: String,
    pub peer: SocketAddr,
    /// Path named by the FILE request.
    pub path: String,
    /// Destination name from END.
    pub dest: String,
    pub expected_hash: String,
    pub buffer: ReassemblyBuffer,
}

impl Finalize {
    /// Verdict for a file whose stored content hashes to `actual`.
    pub fn verdict_for_hash(&self, actual: &str) -> Verdict {
        if integrity::hashes_match(&self.expected_hash, actual) {
            Verdict::Accepted
        } else {
            Verdict::HashMismatch
        }
    }
}

/// Action for the host to perform.
#[derive(Debug)]
pub enum Action {
    Send { to: SocketAddr, frame: Frame },
    /// Hand to whichever request is waiting on this id.
    Reply { from: SocketAddr, reply: Reply },
    PeerDiscovered { identity: String, address: SocketAddr },
    /// TALK payload, for display only.
    Message {
        from: SocketAddr,
        identity: Option<String>,
        id: String,
        text: String,
    },
    /// Write `buffer` in order, hash the result, then call [`NodeCore::finish_transfer`].
    Finalize(Finalize),
    /// An inbound transfer was refused at END without anything being written.
    TransferFailed {
        from: SocketAddr,
        id: String,
        reason: &'static str,
    },
}

/// What a maintenance pass removed.
#[derive(Debug, Default)]
pub struct Expired {
    pub sessions: Vec<String>,
    pub peers: Vec<PeerRecord>,
}

/// Protocol dispatcher with the peer registry and inbound transfer sessions.
pub struct NodeCore {
    node_name: String,
    local_addr: SocketAddr,
    registry: PeerRegistry,
    sessions: SessionTable,
}

impl NodeCore {
    /// `local_addr` is this node's outward-facing address; datagrams from it are our own
    /// broadcasts and are dropped.
    pub fn new(node_name: impl Into<String>, local_addr: SocketAddr) -> Self {
        Self {
            node_name: node_name.into(),
            local_addr,
            registry: PeerRegistry::new(),
            sessions: SessionTable::new(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Presence announcement for this node.
    pub fn heartbeat_frame(&self) -> Frame {
        Frame::Heartbeat {
            node_id: self.node_name.clone(),
            address: self.local_addr.ip().to_string(),
        }
    }

    /// Address of the first peer announcing `identity`.
    pub fn resolve(&self, identity: &str) -> Option<SocketAddr> {
        let address = self.registry.find_by_identity(identity)?;
        let n = self.registry.count_identity(identity);
        if n > 1 {
            warn!(identity, %address, count = n, "identity is ambiguous; using first discovered");
        }
        Some(address)
    }

    /// Decode and dispatch one datagram. Malformed frames are returned as errors for the
    /// host to log; they leave all state untouched.
    pub fn on_datagram(
        &mut self,
        from: SocketAddr,
        bytes: &[u8],
        now: Instant,
    ) -> Result<Vec<Action>, FrameError> {
        if from == self.local_addr {
            return Ok(Vec::new());
        }
        let frame = wire::decode_frame(bytes)?;
        Ok(self.on_frame(from, frame, now))
    }

    /// Dispatch an already decoded frame.
    pub fn on_frame(&mut self, from: SocketAddr, frame: Frame, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        match frame {
            Frame::Heartbeat { node_id, address } => {
                if self.registry.upsert(&node_id, from, now) == Upsert::Inserted {
                    info!(identity = %node_id, %from, advertised = %address, "peer discovered");
                    actions.push(Action::PeerDiscovered {
                        identity: node_id,
                        address: from,
                    });
                } else {
                    debug!(identity = %node_id, %from, "heartbeat");
                }
            }
            Frame::Talk { id, text } => {
                actions.push(Action::Send {
                    to: from,
                    frame: Frame::Ack {
                        id: id.clone(),
                        path: None,
                    },
                });
                let identity = self.registry.get(&from).map(|r| r.identity.clone());
                actions.push(Action::Message {
                    from,
                    identity,
                    id,
                    text,
                });
            }
            Frame::File { id, path } => {
                let reply = match self.sessions.open(&id, from, &path, now) {
                    Ok(opened) => {
                        match &opened {
                            Opened::Replaced { previous } => {
                                warn!(%from, %previous, %id, "peer abandoned transfer")
                            }
                            Opened::Resumed => debug!(%from, id = %id, "transfer request repeated"),
                            Opened::New => info!(%from, %id, %path, "incoming transfer"),
                        }
                        Frame::Ack {
                            id,
                            path: Some(path),
                        }
                    }
                    Err(err @ SessionError::IdInUse { .. }) => {
                        warn!(%from, error = %err, "transfer refused");
                        Frame::Nack {
                            id,
                            reason: REASON_ID_IN_USE.to_string(),
                        }
                    }
                };
                actions.push(Action::Send {
                    to: from,
                    frame: reply,
                });
            }
            Frame::Chunk { seq, payload } => match self.sessions.on_chunk(from, seq, payload, now) {
                ChunkOutcome::Stored => {}
                ChunkOutcome::Duplicate => debug!(%from, seq, "duplicate chunk ignored"),
                ChunkOutcome::OutOfWindow => {
                    warn!(%from, seq, "chunk sequence far beyond received data dropped")
                }
                ChunkOutcome::NoSession => {
                    debug!(%from, seq, "chunk with no open transfer dropped")
                }
            },
            Frame::End { id, hash, dest } => {
                actions.extend(self.on_end(from, id, hash, dest));
            }
            Frame::Ack { id, path } => actions.push(Action::Reply {
                from,
                reply: Reply::Ack { id, path },
            }),
            Frame::Nack { id, reason } => actions.push(Action::Reply {
                from,
                reply: Reply::Nack { id, reason },
            }),
        }
        actions
    }

    fn on_end(&mut self, from: SocketAddr, id: String, hash: String, dest: String) -> Vec<Action> {
        let Some(session) = self.sessions.take(&id, from) else {
            let frame = match self.sessions.verdict_for(&id, from) {
                Some(verdict) => verdict.reply(&id),
                None => {
                    warn!(%from, id = %id, "END for unknown transfer");
                    Frame::Nack {
                        id,
                        reason: REASON_UNKNOWN_TRANSFER.to_string(),
                    }
                }
            };
            return vec![Action::Send { to: from, frame }];
        };

        let missing = session.buffer.missing_count();
        if missing > 0 {
            warn!(%from, id = %id, missing, "transfer incomplete");
            return vec![
                self.finish_transfer(&id, from, Verdict::MissingChunks(missing)),
                Action::TransferFailed {
                    from,
                    id,
                    reason: REASON_MISSING_CHUNKS,
                },
            ];
        }
        vec![Action::Finalize(Finalize {
            id,
            peer: from,
            path: session.path,
            dest,
            expected_hash: hash,
            buffer: session.buffer,
        })]
    }

    /// Record the outcome of a finalized transfer and return the reply to send.
    pub fn finish_transfer(&mut self, id: &str, peer: SocketAddr, verdict: Verdict) -> Action {
        let frame = verdict.reply(id);
        self.sessions.record_verdict(id, peer, verdict);
        Action::Send { to: peer, frame }
    }

    /// Maintenance pass: drop idle sessions and, if `peer_ttl` is set, silent peers.
    pub fn expire(
        &mut self,
        now: Instant,
        session_idle: Option<Duration>,
        peer_ttl: Option<Duration>,
    ) -> Expired {
        let mut expired = Expired::default();
        if let Some(timeout) = session_idle {
            for session in self.sessions.expire_idle(now, timeout) {
                warn!(
                    peer = %session.peer,
                    id = %session.id,
                    chunks = session.buffer.len(),
                    "transfer timed out"
                );
                expired.sessions.push(session.id);
            }
        }
        if let Some(ttl) = peer_ttl {
            expired.peers = self.registry.prune_stale(now, ttl);
            for peer in &expired.peers {
                info!(identity = %peer.identity, address = %peer.address, "peer expired");
            }
        }
        expired
    }
}
