//! Fan-out selection for block and transaction gossip.
//!
//! Only a handful of peers get the full payload on each broadcast. Everyone
//! else who can understand it gets a hash announcement and pulls the data
//! if they need it. Legacy peers can't read announcements, so they always
//! get the full (legacy) payload and use up the full-relay budget first.

use rand::seq::SliceRandom;
use rand::Rng;

use relay_protocol::supports_hash_announcements;

use crate::PeerId;

/// Upper bound on full-payload recipients per broadcast, legacy peers aside.
pub const FULL_RELAY_FANOUT: usize = 3;

/// Which peers get which variant of a broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutPlan {
    /// Legacy peers; full payload in the legacy encoding.
    pub legacy: Vec<PeerId>,
    /// Capable peers picked for the full payload in the current encoding.
    pub full: Vec<PeerId>,
    /// Capable peers that get only the hash announcement.
    pub announce: Vec<PeerId>,
}

impl FanoutPlan {
    pub fn len(&self) -> usize {
        self.legacy.len() + self.full.len() + self.announce.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Capable peers the full payload was queued for.
    pub full: usize,
    /// Legacy peers the legacy payload was queued for.
    pub legacy: usize,
    /// Peers the announcement was queued for.
    pub announced: usize,
    /// Peers whose queue was full or closed.
    pub failed: usize,
}

impl BroadcastResult {
    pub fn sent(&self) -> usize {
        self.full + self.legacy + self.announced
    }
}

/// Split `candidates` (peer, protocol version) into a fan-out plan.
///
/// The number of capable peers in `full` is `fanout - legacy.len()`,
/// saturating at zero, and capped by the number of capable peers.
pub fn plan_fanout<R: Rng + ?Sized>(candidates: &[(PeerId, u16)], fanout: usize, rng: &mut R) -> FanoutPlan {
    let mut plan = FanoutPlan::default();
    let mut capable = Vec::with_capacity(candidates.len());

    for &(peer, version) in candidates {
        if supports_hash_announcements(version) {
            capable.push(peer);
        } else {
            plan.legacy.push(peer);
        }
    }

    let budget = fanout.saturating_sub(plan.legacy.len()).min(capable.len());
    capable.shuffle(rng);
    plan.announce = capable.split_off(budget);
    plan.full = capable;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::{HASH_ANNOUNCEMENT_VERSION, PROTOCOL_VERSION};

    const LEGACY: u16 = HASH_ANNOUNCEMENT_VERSION - 1;

    fn peers(range: std::ops::Range<u64>, version: u16) -> Vec<(PeerId, u16)> {
        range.map(|i| (PeerId(i), version)).collect()
    }

    #[test]
    fn ten_capable_peers_three_full_seven_announced() {
        let candidates = peers(0..10, PROTOCOL_VERSION);
        let plan = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rand::thread_rng());
        assert_eq!(plan.full.len(), 3);
        assert_eq!(plan.announce.len(), 7);
        assert!(plan.legacy.is_empty());
    }

    #[test]
    fn legacy_peers_consume_full_relay_budget() {
        let mut candidates = peers(0..10, PROTOCOL_VERSION);
        candidates.extend(peers(10..20, LEGACY));
        let plan = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rand::thread_rng());
        assert_eq!(plan.legacy.len(), 10);
        assert_eq!(plan.full.len(), 0);
        assert_eq!(plan.announce.len(), 10);
    }

    #[test]
    fn one_legacy_peer_leaves_two_full_slots() {
        let mut candidates = peers(0..5, PROTOCOL_VERSION);
        candidates.extend(peers(5..6, LEGACY));
        let plan = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rand::thread_rng());
        assert_eq!(plan.legacy, vec![PeerId(5)]);
        assert_eq!(plan.full.len(), 2);
        assert_eq!(plan.announce.len(), 3);
    }

    #[test]
    fn fewer_capable_peers_than_budget() {
        let candidates = peers(0..2, PROTOCOL_VERSION);
        let plan = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rand::thread_rng());
        assert_eq!(plan.full.len(), 2);
        assert!(plan.announce.is_empty());
    }

    #[test]
    fn every_candidate_lands_in_exactly_one_bucket() {
        let mut candidates = peers(0..8, PROTOCOL_VERSION);
        candidates.extend(peers(8..10, LEGACY));
        let plan = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rand::thread_rng());

        let mut all: Vec<PeerId> = plan
            .legacy
            .iter()
            .chain(&plan.full)
            .chain(&plan.announce)
            .copied()
            .collect();
        all.sort();
        let expected: Vec<PeerId> = (0..10).map(PeerId).collect();
        assert_eq!(all, expected);
        assert_eq!(plan.len(), 10);
    }

    #[test]
    fn selection_varies_between_broadcasts() {
        let candidates = peers(0..30, PROTOCOL_VERSION);
        let mut rng = rand::thread_rng();
        let first = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rng).full;
        let varied = (0..20).any(|_| plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rng).full != first);
        assert!(varied);
    }

    #[test]
    fn no_candidates_yields_empty_plan() {
        let plan = plan_fanout(&[], FULL_RELAY_FANOUT, &mut rand::thread_rng());
        assert!(plan.is_empty());
    }
}
