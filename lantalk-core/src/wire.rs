//! Framing: `[KIND] arg1 arg2 ... argN` text header, one frame per datagram.
//! CHUNK frames carry a raw tail after a zero-padded sequence number and `|`.

use crate::protocol::{Kind, MAX_FRAME_LEN, SEQ_WIDTH};

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Presence announcement: node identity and its outward-facing address.
    Heartbeat { node_id: String, address: String },
    /// Short text message; `text` may contain spaces.
    Talk { id: String, text: String },
    /// Positive reply. FILE handshakes echo the agreed path.
    Ack { id: String, path: Option<String> },
    /// Negative reply with a free-text reason.
    Nack { id: String, reason: String },
    /// Transfer request: opens a session for `path`.
    File { id: String, path: String },
    /// One block of file content.
    Chunk { seq: u32, payload: Vec<u8> },
    /// Transfer finalization: SHA-256 of the whole file and destination name.
    End { id: String, hash: String, dest: String },
}

impl Frame {
    pub fn kind(&self) -> Kind {
        match self {
            Frame::Heartbeat { .. } => Kind::Heartbeat,
            Frame::Talk { .. } => Kind::Talk,
            Frame::Ack { .. } => Kind::Ack,
            Frame::Nack { .. } => Kind::Nack,
            Frame::File { .. } => Kind::File,
            Frame::Chunk { .. } => Kind::Chunk,
            Frame::End { .. } => Kind::End,
        }
    }
}

/// Encode a frame into a single datagram payload.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
    let kind = frame.kind();
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(kind.tag().as_bytes());
    out.push(b' ');
    match frame {
        Frame::Chunk { seq, payload } => {
            out.extend_from_slice(format!("{:0width$}", seq, width = SEQ_WIDTH).as_bytes());
            out.push(b'|');
            out.extend_from_slice(payload);
        }
        Frame::Heartbeat { node_id, address } => {
            push_token(&mut out, kind, "node_id", node_id)?;
            push_tail(&mut out, kind, "address", address, true)?;
        }
        Frame::Talk { id, text } => {
            push_token(&mut out, kind, "id", id)?;
            push_tail(&mut out, kind, "text", text, false)?;
        }
        Frame::Ack { id, path } => {
            push_token(&mut out, kind, "id", id)?;
            if let Some(path) = path {
                push_tail(&mut out, kind, "path", path, true)?;
            } else {
                // no trailing separator after a bare id
                out.pop();
            }
        }
        Frame::Nack { id, reason } => {
            push_token(&mut out, kind, "id", id)?;
            push_tail(&mut out, kind, "reason", reason, false)?;
        }
        Frame::File { id, path } => {
            push_token(&mut out, kind, "id", id)?;
            push_tail(&mut out, kind, "path", path, true)?;
        }
        Frame::End { id, hash, dest } => {
            push_token(&mut out, kind, "id", id)?;
            push_token(&mut out, kind, "hash", hash)?;
            push_tail(&mut out, kind, "dest", dest, true)?;
        }
    }
    if out.len() > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge(out.len()));
    }
    Ok(out)
}

/// Single-word field followed by a space.
fn push_token(
    out: &mut Vec<u8>,
    kind: Kind,
    field: &'static str,
    value: &str,
) -> Result<(), FrameEncodeError> {
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(FrameEncodeError::InvalidField { kind, field });
    }
    out.extend_from_slice(value.as_bytes());
    out.push(b' ');
    Ok(())
}

/// Last field: runs to the end of the frame and may contain spaces.
fn push_tail(
    out: &mut Vec<u8>,
    kind: Kind,
    field: &'static str,
    value: &str,
    required: bool,
) -> Result<(), FrameEncodeError> {
    if required && value.is_empty() {
        return Err(FrameEncodeError::InvalidField { kind, field });
    }
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Error encoding a frame (bad field or datagram size limit).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameEncodeError {
    #[error("{kind} field `{field}` is empty or contains whitespace")]
    InvalidField { kind: Kind, field: &'static str },
    #[error("frame of {0} bytes does not fit in one datagram")]
    TooLarge(usize),
}

/// Decode one datagram payload.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(bytes.len()));
    }
    let (head, rest) = match bytes.iter().position(|&b| b == b' ') {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (bytes, &[][..]),
    };
    let head = std::str::from_utf8(head)
        .map_err(|_| FrameError::Utf8)?
        .trim_end_matches(is_trailing_space);
    let kind: Kind = head
        .parse()
        .map_err(|_| FrameError::UnknownKind(head.chars().take(16).collect()))?;

    match kind {
        Kind::Chunk => decode_chunk(rest),
        _ => {
            let text = std::str::from_utf8(rest)
                .map_err(|_| FrameError::Utf8)?
                .trim_end_matches(is_trailing_space);
            decode_text(kind, text)
        }
    }
}

/// Text frames lose trailing whitespace (a peer may end the datagram with a newline).
fn is_trailing_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

fn decode_text(kind: Kind, rest: &str) -> Result<Frame, FrameError> {
    let frame = match kind {
        Kind::Heartbeat => {
            let (mut t, address) = fields(kind, rest, &["node_id"])?;
            Frame::Heartbeat {
                node_id: t.remove(0),
                address: required_tail(kind, "address", address)?,
            }
        }
        Kind::Talk => {
            let (mut t, text) = fields(kind, rest, &["id"])?;
            Frame::Talk {
                id: t.remove(0),
                text: text.unwrap_or_default().to_string(),
            }
        }
        Kind::Ack => {
            let (mut t, path) = fields(kind, rest, &["id"])?;
            Frame::Ack {
                id: t.remove(0),
                path: path.filter(|p| !p.is_empty()).map(str::to_string),
            }
        }
        Kind::Nack => {
            let (mut t, reason) = fields(kind, rest, &["id"])?;
            Frame::Nack {
                id: t.remove(0),
                reason: reason.unwrap_or_default().to_string(),
            }
        }
        Kind::File => {
            let (mut t, path) = fields(kind, rest, &["id"])?;
            Frame::File {
                id: t.remove(0),
                path: required_tail(kind, "path", path)?,
            }
        }
        Kind::End => {
            let (mut t, dest) = fields(kind, rest, &["id", "hash"])?;
            let hash = t.remove(1);
            Frame::End {
                id: t.remove(0),
                hash,
                dest: required_tail(kind, "dest", dest)?,
            }
        }
        Kind::Chunk => return decode_chunk(rest.as_bytes()),
    };
    Ok(frame)
}

/// Split `rest` into the fixed single-word `names` and whatever follows the last one.
fn fields<'a>(
    kind: Kind,
    rest: &'a str,
    names: &[&'static str],
) -> Result<(Vec<String>, Option<&'a str>), FrameError> {
    let mut parts = rest.splitn(names.len() + 1, ' ');
    let mut tokens = Vec::with_capacity(names.len());
    for &field in names {
        match parts.next() {
            Some(t) if !t.is_empty() => tokens.push(t.to_string()),
            _ => return Err(FrameError::MissingField { kind, field }),
        }
    }
    Ok((tokens, parts.next()))
}

fn required_tail(
    kind: Kind,
    field: &'static str,
    tail: Option<&str>,
) -> Result<String, FrameError> {
    match tail {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(FrameError::MissingField { kind, field }),
    }
}

fn decode_chunk(rest: &[u8]) -> Result<Frame, FrameError> {
    let bar = rest
        .iter()
        .position(|&b| b == b'|')
        .ok_or(FrameError::MissingField {
            kind: Kind::Chunk,
            field: "seq",
        })?;
    let digits = &rest[..bar];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::BadSequence);
    }
    let seq = std::str::from_utf8(digits)
        .map_err(|_| FrameError::BadSequence)?
        .parse::<u32>()
        .map_err(|_| FrameError::BadSequence)?;
    Ok(Frame::Chunk {
        seq,
        payload: rest[bar + 1..].to_vec(),
    })
}

/// Malformed or undecodable datagram. The receive loop drops the frame and continues.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("datagram of {0} bytes exceeds the frame limit")]
    TooLarge(usize),
    #[error("header is not valid UTF-8")]
    Utf8,
    #[error("unknown frame kind {0:?}")]
    UnknownKind(String),
    #[error("{kind} frame is missing `{field}`")]
    MissingField { kind: Kind, field: &'static str },
    #[error("chunk sequence number is not a number")]
    BadSequence,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::Heartbeat {
                node_id: "alpha".into(),
                address: "10.0.0.1".into(),
            },
            Frame::Talk {
                id: "m1".into(),
                text: "hello there, general kenobi".into(),
            },
            Frame::Talk {
                id: "m2".into(),
                text: String::new(),
            },
            Frame::Ack {
                id: "m1".into(),
                path: None,
            },
            Frame::Ack {
                id: "t1".into(),
                path: Some("docs/my report.pdf".into()),
            },
            Frame::Nack {
                id: "t1".into(),
                reason: "Hash Mismatch".into(),
            },
            Frame::File {
                id: "t1".into(),
                path: "/home/me/my report.pdf".into(),
            },
            Frame::Chunk {
                seq: 123,
                payload: vec![0, 255, b'|', b' ', 0xc3, 0x28],
            },
            Frame::End {
                id: "t1".into(),
                hash: "ab".repeat(32),
                dest: "my report.pdf".into(),
            },
        ]
    }

    #[test]
    fn roundtrip_all_kinds() {
        for frame in sample_frames() {
            let bytes = encode_frame(&frame).unwrap();
            assert_eq!(decode_frame(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn text_layout_matches_wire_table() {
        let hb = Frame::Heartbeat {
            node_id: "A".into(),
            address: "10.0.0.1".into(),
        };
        assert_eq!(encode_frame(&hb).unwrap(), b"[HEARTBEAT] A 10.0.0.1");
        let ack = Frame::Ack {
            id: "42".into(),
            path: None,
        };
        assert_eq!(encode_frame(&ack).unwrap(), b"[ACK] 42");
        let end = Frame::End {
            id: "7".into(),
            hash: "cafe".into(),
            dest: "out.bin".into(),
        };
        assert_eq!(encode_frame(&end).unwrap(), b"[END] 7 cafe out.bin");
    }

    #[test]
    fn chunk_sequence_is_zero_padded() {
        let frame = Frame::Chunk {
            seq: 123,
            payload: b"abc".to_vec(),
        };
        assert_eq!(encode_frame(&frame).unwrap(), b"[CHUNK] 000123|abc");
    }

    #[test]
    fn chunk_splits_on_first_bar_only() {
        let frame = decode_frame(b"[CHUNK] 000002|a|b|c").unwrap();
        assert_eq!(
            frame,
            Frame::Chunk {
                seq: 2,
                payload: b"a|b|c".to_vec()
            }
        );
    }

    #[test]
    fn empty_chunk_payload_is_allowed() {
        let frame = decode_frame(b"[CHUNK] 000000|").unwrap();
        assert_eq!(
            frame,
            Frame::Chunk {
                seq: 0,
                payload: Vec::new()
            }
        );
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(
            decode_frame(b"[PING] x"),
            Err(FrameError::UnknownKind(_))
        ));
        assert!(matches!(
            decode_frame(b"hello"),
            Err(FrameError::UnknownKind(_))
        ));
        assert!(matches!(decode_frame(b""), Err(FrameError::UnknownKind(_))));
        assert!(matches!(
            decode_frame(b"[TALK]"),
            Err(FrameError::MissingField { field: "id", .. })
        ));
        assert!(matches!(
            decode_frame(b"[HEARTBEAT] lonely"),
            Err(FrameError::MissingField {
                field: "address",
                ..
            })
        ));
        assert!(matches!(
            decode_frame(b"[END] id hash"),
            Err(FrameError::MissingField { field: "dest", .. })
        ));
        assert!(matches!(
            decode_frame(b"[CHUNK] 12ab|x"),
            Err(FrameError::BadSequence)
        ));
        assert!(matches!(
            decode_frame(b"[CHUNK] 000001"),
            Err(FrameError::MissingField { field: "seq", .. })
        ));
        assert!(matches!(
            decode_frame(b"[TALK] id \xff\xfe"),
            Err(FrameError::Utf8)
        ));
    }

    #[test]
    fn trailing_newline_is_ignored_on_text_frames() {
        assert_eq!(
            decode_frame(b"[ACK] id\n").unwrap(),
            Frame::Ack {
                id: "id".into(),
                path: None
            }
        );
        assert_eq!(
            decode_frame(b"[NACK] t1 Hash Mismatch\r\n").unwrap(),
            Frame::Nack {
                id: "t1".into(),
                reason: "Hash Mismatch".into()
            }
        );
        assert_eq!(
            decode_frame(b"[HEARTBEAT]\n"),
            Err(FrameError::MissingField {
                kind: Kind::Heartbeat,
                field: "node_id"
            })
        );
        assert_eq!(
            decode_frame(b"[CHUNK] 000001|x\n").unwrap(),
            Frame::Chunk {
                seq: 1,
                payload: b"x\n".to_vec()
            }
        );
    }

    #[test]
    fn oversized_frames_rejected_both_ways() {
        let frame = Frame::Talk {
            id: "big".into(),
            text: "x".repeat(MAX_FRAME_LEN),
        };
        assert!(matches!(
            encode_frame(&frame),
            Err(FrameEncodeError::TooLarge(_))
        ));
        let raw = vec![b'a'; MAX_FRAME_LEN + 1];
        assert!(matches!(decode_frame(&raw), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn encode_rejects_whitespace_in_single_word_fields() {
        let frame = Frame::Heartbeat {
            node_id: "my node".into(),
            address: "10.0.0.1".into(),
        };
        assert_eq!(
            encode_frame(&frame),
            Err(FrameEncodeError::InvalidField {
                kind: Kind::Heartbeat,
                field: "node_id"
            })
        );
        let frame = Frame::File {
            id: "t".into(),
            path: String::new(),
        };
        assert!(encode_frame(&frame).is_err());
    }
}
