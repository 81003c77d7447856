//! Chunk reassembly: buffer sequenced blocks in any arrival order, emit them in ascending order.

use std::collections::BTreeMap;

use crate::protocol::MAX_SEQ_AHEAD;

/// Result of offering a chunk to a [`ReassemblyBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Stored,
    /// Sequence number already buffered; the first payload wins.
    Duplicate,
    /// Sequence number too far beyond what has been received.
    OutOfWindow,
}

/// Received chunks of one transfer, keyed by sequence number.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    chunks: BTreeMap<u32, Vec<u8>>,
    total_bytes: usize,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a chunk unless its sequence number is already taken or lies more than
    /// [`MAX_SEQ_AHEAD`] past the number of chunks held.
    pub fn insert(&mut self, seq: u32, payload: Vec<u8>) -> Insert {
        if u64::from(seq) > self.chunks.len() as u64 + u64::from(MAX_SEQ_AHEAD) {
            return Insert::OutOfWindow;
        }
        if self.chunks.contains_key(&seq) {
            return Insert::Duplicate;
        }
        self.total_bytes += payload.len();
        self.chunks.insert(seq, payload);
        Insert::Stored
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Payload bytes currently buffered.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn highest_seq(&self) -> Option<u32> {
        self.chunks.keys().next_back().copied()
    }

    /// How many sequence numbers between 0 and the highest one received are absent.
    pub fn missing_count(&self) -> u64 {
        match self.highest_seq() {
            Some(max) => u64::from(max) + 1 - self.chunks.len() as u64,
            None => 0,
        }
    }

    /// Chunks in ascending sequence order.
    pub fn ordered(&self) -> impl Iterator<Item = &[u8]> {
        self.chunks.values().map(Vec::as_slice)
    }

    /// Consume the buffer, yielding chunks in ascending sequence order.
    pub fn into_ordered(self) -> impl Iterator<Item = Vec<u8>> {
        self.chunks.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn source(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn any_arrival_order_reassembles_source() {
        let data = source(3000);
        let mut chunks: Vec<(u32, Vec<u8>)> = data
            .chunks(1024)
            .enumerate()
            .map(|(i, c)| (i as u32, c.to_vec()))
            .collect();
        assert_eq!(
            chunks.iter().map(|(_, c)| c.len()).collect::<Vec<_>>(),
            vec![1024, 1024, 952]
        );

        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            chunks.shuffle(&mut rng);
            let mut buf = ReassemblyBuffer::new();
            for (seq, payload) in &chunks {
                assert_eq!(buf.insert(*seq, payload.clone()), Insert::Stored);
            }
            assert_eq!(buf.missing_count(), 0);
            assert_eq!(buf.total_bytes(), data.len());
            let out: Vec<u8> = buf.into_ordered().flatten().collect();
            assert_eq!(out, data);
        }
    }

    #[test]
    fn duplicates_do_not_change_output() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.insert(1, b"world".to_vec()), Insert::Stored);
        assert_eq!(buf.insert(0, b"hello ".to_vec()), Insert::Stored);
        assert_eq!(buf.insert(1, b"WORLD".to_vec()), Insert::Duplicate);
        assert_eq!(buf.len(), 2);
        let out: Vec<u8> = buf.ordered().flatten().copied().collect();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn gaps_are_reported() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.missing_count(), 0);
        buf.insert(0, vec![1]);
        buf.insert(3, vec![4]);
        buf.insert(5, vec![6]);
        assert_eq!(buf.highest_seq(), Some(5));
        assert_eq!(buf.missing_count(), 3);
    }

    #[test]
    fn missing_first_chunk_is_a_gap() {
        let mut buf = ReassemblyBuffer::new();
        buf.insert(1, vec![2]);
        assert_eq!(buf.missing_count(), 1);
    }

    #[test]
    fn far_future_sequence_is_refused() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.insert(0, vec![0]), Insert::Stored);
        assert_eq!(buf.insert(100_000_000, b"x".to_vec()), Insert::OutOfWindow);
        assert_eq!(buf.insert(u32::MAX, b"x".to_vec()), Insert::OutOfWindow);
        assert_eq!(buf.insert(1 + MAX_SEQ_AHEAD, b"x".to_vec()), Insert::Stored);
        assert_eq!(buf.highest_seq(), Some(1 + MAX_SEQ_AHEAD));
        assert_eq!(buf.missing_count(), u64::from(MAX_SEQ_AHEAD));
    }
}
