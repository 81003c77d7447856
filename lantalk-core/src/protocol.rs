//! LANTalk wire protocol: message kinds, defaults and NACK reasons.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Well-known UDP port for all protocol traffic.
pub const DEFAULT_PORT: u16 = 5007;

/// Period between two presence announcements.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Bounded wait for an ACK/NACK to any request.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// File block size carried by one CHUNK frame.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest frame we put in (or accept from) one datagram: an unfragmented
/// UDP payload on a 1500-byte Ethernet MTU.
pub const MAX_FRAME_LEN: usize = 1472;

/// Minimum width of the zero-padded sequence number in CHUNK frames.
pub const SEQ_WIDTH: usize = 6;

/// Room left for chunk bytes once the `[CHUNK] ` prefix, a sequence number
/// of up to ten digits and the `|` separator are accounted for.
pub const MAX_CHUNK_PAYLOAD: usize = MAX_FRAME_LEN - "[CHUNK] ".len() - 10 - 1;

/// How far past the number of chunks already buffered a CHUNK sequence number may reach.
pub const MAX_SEQ_AHEAD: u32 = 4096;

/// NACK reason sent when the reassembled file does not match the END hash.
pub const REASON_HASH_MISMATCH: &str = "Hash Mismatch";
/// NACK reason sent when END arrives with holes in the sequence.
pub const REASON_MISSING_CHUNKS: &str = "Missing Chunks";
/// NACK reason sent for END (or CHUNK bookkeeping) with no open session.
pub const REASON_UNKNOWN_TRANSFER: &str = "Unknown Transfer";
/// NACK reason sent when a FILE reuses an id another peer has open.
pub const REASON_ID_IN_USE: &str = "Transfer Id In Use";
/// NACK reason sent when the receiver failed to store the file.
pub const REASON_WRITE_FAILED: &str = "Write Failed";

/// Frame kind, the bracketed tag that starts every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Heartbeat,
    Talk,
    Ack,
    Nack,
    File,
    Chunk,
    End,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::Heartbeat,
        Kind::Talk,
        Kind::Ack,
        Kind::Nack,
        Kind::File,
        Kind::Chunk,
        Kind::End,
    ];

    /// Tag as it appears on the wire, brackets included.
    pub fn tag(self) -> &'static str {
        match self {
            Kind::Heartbeat => "[HEARTBEAT]",
            Kind::Talk => "[TALK]",
            Kind::Ack => "[ACK]",
            Kind::Nack => "[NACK]",
            Kind::File => "[FILE]",
            Kind::Chunk => "[CHUNK]",
            Kind::End => "[END]",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Kind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL.into_iter().find(|k| k.tag() == s).ok_or(())
    }
}

/// Fresh process-unique token for a message or transfer.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
