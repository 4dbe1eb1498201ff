//! Block intake and gossip.
//!
//! A block from a peer is verified at most once, appended only if valid,
//! and then relayed to every peer not known to have it. Announced hashes
//! are pulled as compact blocks and reassembled from the mempool.

use std::time::Instant;

use relay_chain::VerificationReason;
use relay_messages::{
    BlockHashInfo, GetBlockTransactionsResponse, GetCompactBlockResponse, NewBlockHashesMessage, NewBlockV2Message,
    WireMessage,
};
use relay_messages::compact::Assembled;
use relay_network::{BroadcastResult, GossipItem, GossipPayload, PeerId};
use relay_protocol::legacy;
use relay_types::Block;
use tracing::Instrument;

use crate::fetcher::PendingRequest;
use crate::seen_ledger::Begin;
use crate::tracing_spans;
use crate::{NodeError, PeerNetwork};

/// What became of a block handed to [`PeerNetwork::handle_new_block`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    SyncingDisabled,
    /// Already stored, or already known to be invalid.
    Known,
    /// Another delivery of the same block is being verified.
    InFlight,
    Invalid(VerificationReason),
    /// Verified but the chain refused it.
    AppendFailed,
    Added(BroadcastResult),
    /// The network stopped while the block was being verified.
    Discarded,
}

impl PeerNetwork {
    /// Verify, append and relay a block received from `sender`.
    pub async fn handle_new_block(&self, sender: Option<PeerId>, block: Block) -> BlockOutcome {
        if !self.syncing_enabled() {
            return BlockOutcome::SyncingDisabled;
        }

        let hash = block.hash();
        if let Some(peer) = sender {
            self.peer_manager.write().await.mark_knows_block(peer, hash);
        }

        if self.chain.has_block(&hash) || self.chain.is_invalid(&hash).is_some() {
            return BlockOutcome::Known;
        }
        match self.blocks_in_flight.lock().await.begin(hash, Instant::now()) {
            Begin::Started => {}
            Begin::InFlight => return BlockOutcome::InFlight,
            Begin::Completed => return BlockOutcome::Known,
        }

        let span = tracing_spans::block_span(hash, block.sequence());
        let outcome = self.verify_and_append(sender, block).instrument(span).await;

        let mut in_flight = self.blocks_in_flight.lock().await;
        match outcome {
            BlockOutcome::Discarded | BlockOutcome::AppendFailed => in_flight.remove(&hash),
            _ => in_flight.complete(hash, Instant::now()),
        }
        outcome
    }

    async fn verify_and_append(&self, sender: Option<PeerId>, block: Block) -> BlockOutcome {
        let hash = block.hash();
        let started = Instant::now();
        let verdict = self.verifier.verify_new_block(&block).await;
        self.metrics
            .block_verify_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);

        if !self.is_started() {
            tracing::debug!(%hash, "discarding verification result after stop");
            return BlockOutcome::Discarded;
        }

        if let Some(reason) = verdict.reason() {
            tracing::info!(%hash, ?sender, %reason, "invalid block");
            self.chain.add_invalid(hash, reason);
            self.metrics.invalid_blocks.inc();
            return BlockOutcome::Invalid(reason);
        }

        if let Err(e) = self.chain.add_block(block.clone()).await {
            tracing::warn!(%hash, error = %e, "failed to append verified block");
            return BlockOutcome::AppendFailed;
        }

        match self.broadcast_block(&block, sender).await {
            Ok(result) => BlockOutcome::Added(result),
            Err(e) => {
                tracing::warn!(%hash, error = %e, "failed to relay block");
                BlockOutcome::Added(BroadcastResult::default())
            }
        }
    }

    /// Relay a block produced by the local miner. It is valid by
    /// construction, so verification is skipped.
    pub async fn broadcast_mined_block(&self, block: &Block) -> Result<BroadcastResult, NodeError> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }
        tracing::info!(hash = %block.hash(), sequence = block.sequence(), "relaying mined block");
        self.broadcast_block(block, None).await
    }

    async fn broadcast_block(&self, block: &Block, exclude: Option<PeerId>) -> Result<BroadcastResult, NodeError> {
        let hash = block.hash();
        let payload = GossipPayload {
            full: WireMessage::NewBlockV2(NewBlockV2Message { block: block.clone() }),
            legacy: WireMessage::NewBlock(legacy::encode_block(block)?),
            announcement: WireMessage::NewBlockHashes(NewBlockHashesMessage {
                blocks: vec![BlockHashInfo {
                    hash,
                    sequence: block.sequence(),
                }],
            }),
        };

        let mut pm = self.peer_manager.write().await;
        let span = tracing_spans::broadcast_span("block", pm.connected_count());
        let result = span.in_scope(|| pm.broadcast(GossipItem::Block(hash), &payload, exclude));
        drop(pm);

        self.metrics.blocks_relayed.inc();
        tracing::debug!(%hash, full = result.full, legacy = result.legacy, announced = result.announced, "block relayed");
        Ok(result)
    }

    // -- Pulling announced blocks ---------------------------------------------

    pub(crate) async fn handle_block_hashes(&self, peer: PeerId, message: NewBlockHashesMessage) {
        {
            let mut pm = self.peer_manager.write().await;
            for info in &message.blocks {
                pm.mark_knows_block(peer, info.hash);
            }
        }
        if !self.syncing_enabled() {
            return;
        }

        for info in message.blocks {
            if self.chain.has_block(&info.hash) || self.chain.is_invalid(&info.hash).is_some() {
                continue;
            }
            if self.blocks_in_flight.lock().await.contains(&info.hash) {
                continue;
            }
            let request = self
                .fetcher
                .lock()
                .await
                .request_compact_block(peer, info.hash, Instant::now());
            if let Some(request) = request {
                tracing::debug!(%peer, hash = %info.hash, sequence = info.sequence, "requesting compact block");
                self.send_request(peer, request).await;
            }
        }
    }

    pub(crate) async fn handle_compact_block_response(&self, peer: PeerId, response: GetCompactBlockResponse) {
        let pending = self.fetcher.lock().await.take(peer, response.rpc_id);
        let Some(PendingRequest::CompactBlock { block_hash }) = pending else {
            tracing::debug!(%peer, rpc_id = response.rpc_id, "unsolicited compact block");
            return;
        };
        if response.header().hash() != block_hash {
            tracing::debug!(%peer, expected = %block_hash, "compact block does not match request");
            return;
        }

        let mempool = &self.mempool;
        match response.compact_block.assemble(|hash| mempool.get(hash)) {
            Ok(Assembled::Complete(block)) => {
                self.handle_new_block(Some(peer), block).await;
            }
            Ok(Assembled::Partial(partial)) => {
                let request = self
                    .fetcher
                    .lock()
                    .await
                    .request_block_transactions(peer, partial, Instant::now());
                self.send_request(peer, request).await;
            }
            Err(e) => tracing::debug!(%peer, hash = %block_hash, error = %e, "malformed compact block"),
        }
    }

    pub(crate) async fn handle_block_transactions_response(&self, peer: PeerId, response: GetBlockTransactionsResponse) {
        let pending = self.fetcher.lock().await.take(peer, response.rpc_id);
        let Some(PendingRequest::BlockTransactions { partial }) = pending else {
            tracing::debug!(%peer, rpc_id = response.rpc_id, "unsolicited block transactions");
            return;
        };
        if partial.header().hash() != response.block_hash {
            tracing::debug!(%peer, "block transactions for a different block");
            return;
        }
        match partial.fill(response.transactions) {
            Ok(block) => {
                self.handle_new_block(Some(peer), block).await;
            }
            Err(e) => tracing::debug!(%peer, hash = %response.block_hash, error = %e, "bad block transactions"),
        }
    }
}
