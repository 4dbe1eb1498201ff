//! Rolling hash set recording which hashes a peer is known to have.
//!
//! Used per peer for blocks and for transactions so that gossip is never
//! sent back to a peer that already announced or received the same item.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::Hash;

/// Default capacity: the last 65 536 hashes per peer and kind.
pub const DEFAULT_KNOWN_CAPACITY: usize = 65_536;

/// Bounded set of hashes in insertion order.
///
/// Entries are never removed except when the capacity is reached, in which
/// case the oldest entry is evicted to make room.
pub struct KnownHashes<H> {
    capacity: usize,
    hashes: HashSet<H>,
    order: VecDeque<H>,
}

impl<H: Copy + Eq + Hash> KnownHashes<H> {
    /// Create a new set with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hashes: HashSet::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Record a hash. Returns `true` if it was not already present.
    pub fn insert(&mut self, hash: H) -> bool {
        if self.hashes.contains(&hash) {
            return false;
        }
        if self.capacity == 0 {
            return false;
        }
        // Evict oldest if at capacity
        if self.hashes.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.hashes.remove(&old);
            }
        }
        self.hashes.insert(hash);
        self.order.push_back(hash);
        true
    }

    pub fn contains(&self, hash: &H) -> bool {
        self.hashes.contains(hash)
    }

    /// Number of tracked hashes.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl<H: Copy + Eq + Hash> Default for KnownHashes<H> {
    fn default() -> Self {
        Self::new(DEFAULT_KNOWN_CAPACITY)
    }
}
