//! In-flight / seen ledger.
//!
//! Guarantees that a hash is verified at most once no matter how many peers
//! deliver it or how the deliveries interleave. The first caller of
//! [`SeenLedger::begin`] for a hash gets [`Begin::Started`]; everyone after
//! sees it in flight or completed until the entry expires.
//!
//! Completed entries expire after a TTL and the oldest completed entries
//! are evicted once the capacity is reached. In-flight entries are never
//! evicted.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeenState {
    InFlight,
    Completed,
}

/// Result of [`SeenLedger::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Begin {
    /// The caller owns the verification of this hash.
    Started,
    InFlight,
    Completed,
}

struct Entry {
    state: SeenState,
    updated: Instant,
}

pub struct SeenLedger<K> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, Entry>,
    /// Insertion order, for eviction. May hold keys already removed.
    order: VecDeque<K>,
}

impl<K: Copy + Eq + Hash> SeenLedger<K> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Claim `key` for verification.
    pub fn begin(&mut self, key: K, now: Instant) -> Begin {
        match self.entries.get(&key).map(|e| (e.state, e.updated)) {
            Some((SeenState::InFlight, _)) => return Begin::InFlight,
            Some((SeenState::Completed, updated)) if now.duration_since(updated) < self.ttl => {
                return Begin::Completed;
            }
            Some((SeenState::Completed, _)) => {
                self.entries.remove(&key);
            }
            None => {}
        }

        if self.entries.len() >= self.capacity {
            self.prune(now);
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest_completed();
        }

        self.entries.insert(
            key,
            Entry {
                state: SeenState::InFlight,
                updated: now,
            },
        );
        self.order.push_back(key);
        Begin::Started
    }

    /// Mark verification of `key` as finished.
    pub fn complete(&mut self, key: K, now: Instant) {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.state = SeenState::Completed;
                entry.updated = now;
            }
            None => {
                self.entries.insert(
                    key,
                    Entry {
                        state: SeenState::Completed,
                        updated: now,
                    },
                );
                self.order.push_back(key);
            }
        }
    }

    /// Forget `key`, e.g. when its verification was abandoned.
    pub fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn state(&self, key: &K) -> Option<SeenState> {
        self.entries.get(key).map(|e| e.state)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop completed entries older than the TTL.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| e.state == SeenState::InFlight || now.duration_since(e.updated) < ttl);
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
    }

    fn evict_oldest_completed(&mut self) {
        let position = self
            .order
            .iter()
            .position(|k| matches!(self.entries.get(k), Some(e) if e.state == SeenState::Completed));
        if let Some(position) = position {
            if let Some(key) = self.order.remove(position) {
                self.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn first_begin_starts_later_ones_wait() {
        let mut ledger = SeenLedger::new(10, TTL);
        let now = Instant::now();
        assert_eq!(ledger.begin(1u32, now), Begin::Started);
        assert_eq!(ledger.begin(1u32, now), Begin::InFlight);

        ledger.complete(1, now);
        assert_eq!(ledger.begin(1u32, now), Begin::Completed);
        assert_eq!(ledger.state(&1), Some(SeenState::Completed));
    }

    #[test]
    fn completed_entries_expire() {
        let mut ledger = SeenLedger::new(10, TTL);
        let now = Instant::now();
        ledger.begin(1u32, now);
        ledger.complete(1, now);

        let later = now + TTL + Duration::from_secs(1);
        assert_eq!(ledger.begin(1, later), Begin::Started);
    }

    #[test]
    fn prune_keeps_in_flight_entries() {
        let mut ledger = SeenLedger::new(10, TTL);
        let now = Instant::now();
        ledger.begin(1u32, now);
        ledger.begin(2u32, now);
        ledger.complete(2, now);

        ledger.prune(now + TTL * 2);
        assert_eq!(ledger.state(&1), Some(SeenState::InFlight));
        assert!(!ledger.contains(&2));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest_completed_only() {
        let mut ledger = SeenLedger::new(3, TTL);
        let now = Instant::now();
        ledger.begin(1u32, now);
        ledger.begin(2u32, now);
        ledger.complete(2, now);
        ledger.begin(3u32, now);
        ledger.complete(3, now);

        assert_eq!(ledger.begin(4, now), Begin::Started);
        assert!(ledger.contains(&1), "in-flight entry must survive eviction");
        assert!(!ledger.contains(&2));
        assert!(ledger.contains(&3));
        assert!(ledger.contains(&4));
    }

    #[test]
    fn removed_entry_can_start_again() {
        let mut ledger = SeenLedger::new(3, TTL);
        let now = Instant::now();
        ledger.begin(7u32, now);
        ledger.remove(&7);
        assert!(ledger.is_empty());
        assert_eq!(ledger.begin(7, now), Begin::Started);
    }

    proptest::proptest! {
        /// However deliveries interleave, each key is started exactly once
        /// while its entry is live.
        #[test]
        fn each_key_starts_once(keys in proptest::collection::vec(0u8..16, 0..200)) {
            let mut ledger = SeenLedger::new(64, TTL);
            let now = Instant::now();
            let mut started = std::collections::HashSet::new();
            for (i, key) in keys.iter().enumerate() {
                if ledger.begin(*key, now) == Begin::Started {
                    proptest::prop_assert!(started.insert(*key));
                }
                if i % 3 == 0 {
                    ledger.complete(*key, now);
                }
            }
            let distinct: std::collections::HashSet<u8> = keys.into_iter().collect();
            proptest::prop_assert_eq!(started, distinct);
        }
    }
}
