//! Peer registry: one record per sender address, refreshed by heartbeats.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A peer as last seen on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Display label announced by the peer. Not guaranteed unique.
    pub identity: String,
    pub address: SocketAddr,
    pub last_seen: Instant,
}

impl PeerRecord {
    /// Time since the last announcement, saturating at zero.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Outcome of recording a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Refreshed,
}

/// Address-keyed peer table. Records keep insertion order so identity lookups are deterministic.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    records: Vec<PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat from `address`. An existing record only has `last_seen` bumped;
    /// its identity stays as first announced.
    pub fn upsert(&mut self, identity: &str, address: SocketAddr, now: Instant) -> Upsert {
        match self.records.iter_mut().find(|r| r.address == address) {
            Some(record) => {
                record.last_seen = now;
                Upsert::Refreshed
            }
            None => {
                self.records.push(PeerRecord {
                    identity: identity.to_string(),
                    address,
                    last_seen: now,
                });
                Upsert::Inserted
            }
        }
    }

    /// First record (in discovery order) announcing `identity`.
    pub fn find_by_identity(&self, identity: &str) -> Option<SocketAddr> {
        self.records
            .iter()
            .find(|r| r.identity == identity)
            .map(|r| r.address)
    }

    /// How many records share `identity`; more than one means lookups are ambiguous.
    pub fn count_identity(&self, identity: &str) -> usize {
        self.records.iter().filter(|r| r.identity == identity).count()
    }

    pub fn get(&self, address: &SocketAddr) -> Option<&PeerRecord> {
        self.records.iter().find(|r| r.address == *address)
    }

    /// Snapshot of every record.
    pub fn list(&self) -> Vec<PeerRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records not refreshed within `ttl`. Returns what was removed.
    pub fn prune_stale(&mut self, now: Instant, ttl: Duration) -> Vec<PeerRecord> {
        let (stale, fresh): (Vec<_>, Vec<_>) = self
            .records
            .drain(..)
            .partition(|r| r.age(now) >= ttl);
        self.records = fresh;
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn heartbeat_from_new_address_inserts_one_record() {
        let mut reg = PeerRegistry::new();
        let now = Instant::now();
        assert_eq!(reg.upsert("A", addr("10.0.0.1:5007"), now), Upsert::Inserted);
        let peers = reg.list();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].identity, "A");
        assert_eq!(peers[0].address, addr("10.0.0.1:5007"));
    }

    #[test]
    fn repeated_heartbeat_refreshes_without_duplicate() {
        let mut reg = PeerRegistry::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(5);
        reg.upsert("A", addr("10.0.0.1:5007"), t0);
        assert_eq!(reg.upsert("A", addr("10.0.0.1:5007"), t1), Upsert::Refreshed);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[0].last_seen, t1);
    }

    #[test]
    fn staleness_is_observable() {
        let mut reg = PeerRegistry::new();
        let t0 = Instant::now();
        let a = addr("10.0.0.1:5007");
        let b = addr("10.0.0.2:5007");
        reg.upsert("A", a, t0);
        reg.upsert("B", b, t0);
        // only B keeps announcing
        for i in 1..=4 {
            reg.upsert("B", b, t0 + Duration::from_secs(5 * i));
        }
        let now = t0 + Duration::from_secs(21);
        assert_eq!(reg.get(&a).unwrap().age(now), Duration::from_secs(21));
        assert_eq!(reg.get(&b).unwrap().age(now), Duration::from_secs(1));

        let removed = reg.prune_stale(now, Duration::from_secs(15));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].address, a);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn rename_from_same_address_keeps_first_identity() {
        let mut reg = PeerRegistry::new();
        let now = Instant::now();
        reg.upsert("A", addr("10.0.0.1:5007"), now);
        reg.upsert("Mallory", addr("10.0.0.1:5007"), now);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.find_by_identity("A"), Some(addr("10.0.0.1:5007")));
        assert_eq!(reg.find_by_identity("Mallory"), None);
    }

    #[test]
    fn duplicate_identity_resolves_to_first_discovered() {
        let mut reg = PeerRegistry::new();
        let now = Instant::now();
        reg.upsert("twin", addr("10.0.0.1:5007"), now);
        reg.upsert("twin", addr("10.0.0.2:5007"), now);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.count_identity("twin"), 2);
        assert_eq!(reg.find_by_identity("twin"), Some(addr("10.0.0.1:5007")));
        assert_eq!(reg.find_by_identity("nobody"), None);
    }
}
