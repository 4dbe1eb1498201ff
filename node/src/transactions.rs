//! Transaction intake and gossip.
//!
//! Transactions are shed without verification while syncing is off, while
//! the chain is behind, or while the worker pool is saturated. Otherwise
//! each hash is verified at most once. Verified transactions are offered to
//! the mempool and handed to the wallet exactly once; only those the mempool
//! keeps are relayed.

use std::time::Instant;

use relay_chain::VerificationReason;
use relay_messages::{
    NewPooledTransactionHashesMessage, NewTransactionV2Message, PooledTransactionsResponse, WireMessage,
};
use relay_network::{BroadcastResult, GossipItem, GossipPayload, PeerId};
use relay_protocol::legacy;
use relay_types::{Transaction, TxHash};
use tracing::Instrument;

use crate::fetcher::PendingRequest;
use crate::seen_ledger::Begin;
use crate::tracing_spans;
use crate::{NodeError, PeerNetwork};

/// What became of a transaction handed to
/// [`PeerNetwork::handle_new_transaction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Shed before verification.
    Dropped,
    /// Verified before, being verified now, or already in the mempool.
    AlreadySeen,
    Invalid(VerificationReason),
    /// Valid, but the mempool declined it, so it was not relayed.
    NotAccepted,
    Accepted(BroadcastResult),
    /// The network stopped while the transaction was being verified.
    Discarded,
}

impl PeerNetwork {
    /// Whether new transactions are currently taken in at all.
    fn accepting_transactions(&self) -> bool {
        self.syncing_enabled() && self.chain.synced() && !self.workers.saturated()
    }

    /// Verify, pool and relay a transaction received from `sender`.
    pub async fn handle_new_transaction(&self, sender: Option<PeerId>, transaction: Transaction) -> TransactionOutcome {
        let hash = transaction.hash();

        if !self.accepting_transactions() {
            tracing::trace!(%hash, "dropping transaction");
            self.metrics.transactions_dropped.inc();
            return TransactionOutcome::Dropped;
        }

        // The ledger forgets hashes; a pooled transaction was verified already.
        let already_seen = self.mempool.exists(&hash)
            || self.seen_transactions.lock().await.begin(hash, Instant::now()) != Begin::Started;
        if already_seen {
            self.mark_sender(sender, hash).await;
            return TransactionOutcome::AlreadySeen;
        }

        let span = tracing_spans::transaction_span(hash);
        let outcome = self.verify_and_pool(sender, transaction).instrument(span).await;

        let mut seen = self.seen_transactions.lock().await;
        match outcome {
            TransactionOutcome::Discarded => seen.remove(&hash),
            _ => seen.complete(hash, Instant::now()),
        }
        outcome
    }

    async fn verify_and_pool(&self, sender: Option<PeerId>, transaction: Transaction) -> TransactionOutcome {
        let hash = transaction.hash();
        let verdict = self.verifier.verify_new_transaction(&transaction).await;

        if !self.is_started() {
            tracing::debug!(%hash, "discarding verification result after stop");
            return TransactionOutcome::Discarded;
        }

        // The sender has the transaction whatever the verdict.
        self.mark_sender(sender, hash).await;

        if let Some(reason) = verdict.reason() {
            tracing::debug!(%hash, ?sender, %reason, "invalid transaction");
            self.metrics.invalid_transactions.inc();
            return TransactionOutcome::Invalid(reason);
        }

        let accepted = self.mempool.accept_transaction(&transaction);
        self.accounts.sync_transaction(&transaction).await;

        if !accepted {
            tracing::trace!(%hash, "mempool declined transaction");
            return TransactionOutcome::NotAccepted;
        }

        match self.broadcast_pooled(&transaction, sender).await {
            Ok(result) => TransactionOutcome::Accepted(result),
            Err(e) => {
                tracing::warn!(%hash, error = %e, "failed to relay transaction");
                TransactionOutcome::Accepted(BroadcastResult::default())
            }
        }
    }

    /// Submit a locally created transaction. It goes through the same
    /// verification as a gossiped one.
    pub async fn broadcast_transaction(&self, transaction: Transaction) -> Result<TransactionOutcome, NodeError> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }
        Ok(self.handle_new_transaction(None, transaction).await)
    }

    async fn broadcast_pooled(
        &self,
        transaction: &Transaction,
        exclude: Option<PeerId>,
    ) -> Result<BroadcastResult, NodeError> {
        let hash = transaction.hash();
        let payload = GossipPayload {
            full: WireMessage::NewTransactionV2(NewTransactionV2Message {
                transaction: transaction.clone(),
            }),
            legacy: WireMessage::NewTransaction(legacy::encode_transaction(transaction)?),
            announcement: WireMessage::NewPooledTransactionHashes(NewPooledTransactionHashesMessage {
                hashes: vec![hash],
            }),
        };

        let mut pm = self.peer_manager.write().await;
        let span = tracing_spans::broadcast_span("transaction", pm.connected_count());
        let result = span.in_scope(|| pm.broadcast(GossipItem::Transaction(hash), &payload, exclude));
        drop(pm);

        self.metrics.transactions_relayed.inc();
        Ok(result)
    }

    async fn mark_sender(&self, sender: Option<PeerId>, hash: TxHash) {
        if let Some(peer) = sender {
            self.peer_manager.write().await.mark_knows_transaction(peer, hash);
        }
    }

    // -- Pulling announced transactions ---------------------------------------

    pub(crate) async fn handle_pooled_transaction_hashes(
        &self,
        peer: PeerId,
        message: NewPooledTransactionHashesMessage,
    ) {
        {
            let mut pm = self.peer_manager.write().await;
            for hash in &message.hashes {
                pm.mark_knows_transaction(peer, *hash);
            }
        }
        if !self.accepting_transactions() {
            return;
        }

        let wanted: Vec<TxHash> = {
            let seen = self.seen_transactions.lock().await;
            message
                .hashes
                .into_iter()
                .filter(|h| !self.mempool.exists(h) && !seen.contains(h))
                .collect()
        };
        if wanted.is_empty() {
            return;
        }

        let request = self
            .fetcher
            .lock()
            .await
            .request_pooled_transactions(peer, wanted, Instant::now());
        if let Some(request) = request {
            self.send_request(peer, request).await;
        }
    }

    pub(crate) async fn handle_pooled_transactions_response(&self, peer: PeerId, response: PooledTransactionsResponse) {
        let pending = self.fetcher.lock().await.take(peer, response.rpc_id);
        let Some(PendingRequest::PooledTransactions { hashes }) = pending else {
            tracing::debug!(%peer, rpc_id = response.rpc_id, "unsolicited pooled transactions");
            return;
        };

        for transaction in response.transactions {
            if !hashes.contains(&transaction.hash()) {
                tracing::debug!(%peer, hash = %transaction.hash(), "transaction was not requested");
                continue;
            }
            self.handle_new_transaction(Some(peer), transaction).await;
        }
    }
}
