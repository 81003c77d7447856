//! Receiver-side transfer sessions: one reassembly buffer per transfer id, bound to the peer
//! that opened it. CHUNK frames carry no id, so they are routed by source address.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::chunk::{Insert, ReassemblyBuffer};
use crate::protocol::{REASON_HASH_MISMATCH, REASON_MISSING_CHUNKS, REASON_WRITE_FAILED};
use crate::wire::Frame;

/// Verdicts of recently finished transfers kept to answer a retransmitted END.
pub const FINISHED_CAPACITY: usize = 64;

/// State of one inbound transfer between FILE and END.
#[derive(Debug)]
pub struct TransferSession {
    pub id: String,
    pub peer: SocketAddr,
    /// Path as named in the FILE request.
    pub path: String,
    pub buffer: ReassemblyBuffer,
    pub last_activity: Instant,
}

/// How a FILE request was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    New,
    /// Same id from the same peer again; buffer kept.
    Resumed,
    /// The peer had another transfer open; that one was discarded.
    Replaced { previous: String },
}

/// What happened to a CHUNK frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Stored,
    Duplicate,
    OutOfWindow,
    NoSession,
}

/// Final result of an inbound transfer, as answered to END.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    HashMismatch,
    /// Number of absent sequence numbers below the highest one received.
    MissingChunks(u64),
    WriteFailed,
}

impl Verdict {
    /// NACK reason, or `None` for an accepted transfer.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Verdict::Accepted => None,
            Verdict::HashMismatch => Some(REASON_HASH_MISMATCH),
            Verdict::MissingChunks(_) => Some(REASON_MISSING_CHUNKS),
            Verdict::WriteFailed => Some(REASON_WRITE_FAILED),
        }
    }

    /// ACK/NACK frame answering END for `id`.
    pub fn reply(&self, id: &str) -> Frame {
        match self.reason() {
            None => Frame::Ack {
                id: id.to_string(),
                path: None,
            },
            Some(reason) => Frame::Nack {
                id: id.to_string(),
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("transfer id {id} is already in use by {owner}")]
    IdInUse { id: String, owner: SocketAddr },
}

/// All open inbound transfers plus a short memory of finished ones.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, TransferSession>,
    by_peer: HashMap<SocketAddr, String>,
    finished: VecDeque<(String, SocketAddr, Verdict)>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or re-acknowledge) a session for a FILE request.
    pub fn open(
        &mut self,
        id: &str,
        peer: SocketAddr,
        path: &str,
        now: Instant,
    ) -> Result<Opened, SessionError> {
        if let Some(existing) = self.sessions.get_mut(id) {
            if existing.peer != peer {
                return Err(SessionError::IdInUse {
                    id: id.to_string(),
                    owner: existing.peer,
                });
            }
            existing.last_activity = now;
            return Ok(Opened::Resumed);
        }

        let opened = match self.by_peer.remove(&peer) {
            Some(previous) => {
                self.sessions.remove(&previous);
                Opened::Replaced { previous }
            }
            None => Opened::New,
        };
        self.finished.retain(|(fid, fpeer, _)| !(fid == id && *fpeer == peer));
        self.sessions.insert(
            id.to_string(),
            TransferSession {
                id: id.to_string(),
                peer,
                path: path.to_string(),
                buffer: ReassemblyBuffer::new(),
                last_activity: now,
            },
        );
        self.by_peer.insert(peer, id.to_string());
        Ok(opened)
    }

    /// Buffer a chunk into the session currently bound to `peer`.
    pub fn on_chunk(
        &mut self,
        peer: SocketAddr,
        seq: u32,
        payload: Vec<u8>,
        now: Instant,
    ) -> ChunkOutcome {
        let Some(session) = self
            .by_peer
            .get(&peer)
            .and_then(|id| self.sessions.get_mut(id))
        else {
            return ChunkOutcome::NoSession;
        };
        session.last_activity = now;
        match session.buffer.insert(seq, payload) {
            Insert::Stored => ChunkOutcome::Stored,
            Insert::Duplicate => ChunkOutcome::Duplicate,
            Insert::OutOfWindow => ChunkOutcome::OutOfWindow,
        }
    }

    /// Remove and return the session `id` if it belongs to `peer`.
    pub fn take(&mut self, id: &str, peer: SocketAddr) -> Option<TransferSession> {
        if self.sessions.get(id)?.peer != peer {
            return None;
        }
        self.by_peer.remove(&peer);
        self.sessions.remove(id)
    }

    /// Remember how a transfer ended so a repeated END gets the same answer.
    pub fn record_verdict(&mut self, id: &str, peer: SocketAddr, verdict: Verdict) {
        if self.finished.len() >= FINISHED_CAPACITY {
            self.finished.pop_front();
        }
        self.finished.push_back((id.to_string(), peer, verdict));
    }

    pub fn verdict_for(&self, id: &str, peer: SocketAddr) -> Option<&Verdict> {
        self.finished
            .iter()
            .rev()
            .find(|(fid, fpeer, _)| fid == id && *fpeer == peer)
            .map(|(_, _, v)| v)
    }

    /// Discard sessions with no activity for `timeout`.
    pub fn expire_idle(&mut self, now: Instant, timeout: Duration) -> Vec<TransferSession> {
        let idle: Vec<String> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_activity) >= timeout)
            .map(|s| s.id.clone())
            .collect();
        idle.into_iter()
            .filter_map(|id| {
                let session = self.sessions.remove(&id)?;
                self.by_peer.remove(&session.peer);
                Some(session)
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&TransferSession> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
