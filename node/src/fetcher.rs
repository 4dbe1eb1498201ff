//! Bookkeeping for requests we send to peers.
//!
//! Every request is keyed by `(peer, rpc_id)`. A response is only acted on
//! if it matches an outstanding request from that same peer; anything else
//! is unsolicited and ignored. Hashes with a request in flight are not
//! requested again from other peers until the request resolves or expires.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use relay_messages::compact::PartialBlock;
use relay_messages::{
    GetBlockTransactionsRequest, GetCompactBlockRequest, PooledTransactionsRequest, RpcId, WireMessage,
};
use relay_network::PeerId;
use relay_types::{BlockHash, TxHash};

/// What an outstanding request was for.
#[derive(Clone, Debug)]
pub enum PendingRequest {
    CompactBlock { block_hash: BlockHash },
    /// Transactions missing from a compact block.
    BlockTransactions { partial: PartialBlock },
    PooledTransactions { hashes: Vec<TxHash> },
}

struct Outstanding {
    request: PendingRequest,
    sent_at: Instant,
}

pub struct Fetcher {
    timeout: Duration,
    next_rpc_id: RpcId,
    outstanding: HashMap<(PeerId, RpcId), Outstanding>,
    requested_blocks: HashSet<BlockHash>,
    requested_transactions: HashSet<TxHash>,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_rpc_id: 1,
            outstanding: HashMap::new(),
            requested_blocks: HashSet::new(),
            requested_transactions: HashSet::new(),
        }
    }

    fn next_rpc_id(&mut self) -> RpcId {
        let id = self.next_rpc_id;
        self.next_rpc_id = self.next_rpc_id.wrapping_add(1).max(1);
        id
    }

    fn track(&mut self, peer: PeerId, request: PendingRequest, now: Instant) -> RpcId {
        let rpc_id = self.next_rpc_id();
        self.outstanding.insert((peer, rpc_id), Outstanding { request, sent_at: now });
        rpc_id
    }

    pub fn is_block_requested(&self, hash: &BlockHash) -> bool {
        self.requested_blocks.contains(hash)
    }

    pub fn is_transaction_requested(&self, hash: &TxHash) -> bool {
        self.requested_transactions.contains(hash)
    }

    /// Build a compact block request, unless the block is already requested.
    pub fn request_compact_block(&mut self, peer: PeerId, block_hash: BlockHash, now: Instant) -> Option<WireMessage> {
        if !self.requested_blocks.insert(block_hash) {
            return None;
        }
        let rpc_id = self.track(peer, PendingRequest::CompactBlock { block_hash }, now);
        Some(WireMessage::GetCompactBlockRequest(GetCompactBlockRequest { block_hash, rpc_id }))
    }

    /// Ask the peer that sent a compact block for the transactions we lack.
    pub fn request_block_transactions(&mut self, peer: PeerId, partial: PartialBlock, now: Instant) -> WireMessage {
        let block_hash = partial.header().hash();
        let transaction_indexes = partial.missing_indexes().into_iter().map(|i| i as i32).collect();
        self.requested_blocks.insert(block_hash);
        let rpc_id = self.track(peer, PendingRequest::BlockTransactions { partial }, now);
        WireMessage::GetBlockTransactionsRequest(GetBlockTransactionsRequest {
            block_hash,
            transaction_indexes,
            rpc_id,
        })
    }

    /// Request the hashes not already requested. `None` if nothing is left.
    pub fn request_pooled_transactions(
        &mut self,
        peer: PeerId,
        hashes: impl IntoIterator<Item = TxHash>,
        now: Instant,
    ) -> Option<WireMessage> {
        let hashes: Vec<TxHash> = hashes
            .into_iter()
            .filter(|h| self.requested_transactions.insert(*h))
            .collect();
        if hashes.is_empty() {
            return None;
        }
        let rpc_id = self.track(peer, PendingRequest::PooledTransactions { hashes: hashes.clone() }, now);
        Some(WireMessage::PooledTransactionsRequest(PooledTransactionsRequest { hashes, rpc_id }))
    }

    /// Resolve an outstanding request. `None` means the response was
    /// unsolicited.
    pub fn take(&mut self, peer: PeerId, rpc_id: RpcId) -> Option<PendingRequest> {
        let outstanding = self.outstanding.remove(&(peer, rpc_id))?;
        self.release(&outstanding.request);
        Some(outstanding.request)
    }

    /// Drop requests older than the timeout. Returns how many expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let expired: Vec<(PeerId, RpcId)> = self
            .outstanding
            .iter()
            .filter(|(_, o)| now.duration_since(o.sent_at) >= timeout)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            if let Some(outstanding) = self.outstanding.remove(key) {
                self.release(&outstanding.request);
            }
        }
        expired.len()
    }

    /// Drop every request sent to a peer that went away.
    pub fn forget_peer(&mut self, peer: PeerId) {
        let keys: Vec<(PeerId, RpcId)> = self.outstanding.keys().filter(|(p, _)| *p == peer).copied().collect();
        for key in keys {
            if let Some(outstanding) = self.outstanding.remove(&key) {
                self.release(&outstanding.request);
            }
        }
    }

    fn release(&mut self, request: &PendingRequest) {
        match request {
            PendingRequest::CompactBlock { block_hash } => {
                self.requested_blocks.remove(block_hash);
            }
            PendingRequest::BlockTransactions { partial } => {
                self.requested_blocks.remove(&partial.header().hash());
            }
            PendingRequest::PooledTransactions { hashes } => {
                for hash in hashes {
                    self.requested_transactions.remove(hash);
                }
            }
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}
