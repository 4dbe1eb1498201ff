//! Nullable verifier: spend checks against a [`NullChain`], with
//! scripted verdicts and call counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_chain::{check_spends, Chain, VerificationOutcome, VerificationReason, Verifier};
use relay_types::{Block, BlockHash, Transaction, TxHash};

use crate::NullChain;

pub struct NullVerifier {
    chain: Arc<NullChain>,
    block_verdicts: Mutex<HashMap<BlockHash, VerificationOutcome>>,
    transaction_verdicts: Mutex<HashMap<TxHash, VerificationOutcome>>,
    delay: Mutex<Option<Duration>>,
    block_calls: AtomicUsize,
    transaction_calls: AtomicUsize,
}

impl NullVerifier {
    pub fn new(chain: Arc<NullChain>) -> Self {
        Self {
            chain,
            block_verdicts: Mutex::new(HashMap::new()),
            transaction_verdicts: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            block_calls: AtomicUsize::new(0),
            transaction_calls: AtomicUsize::new(0),
        }
    }

    /// Force the verdict for a block.
    pub fn script_block(&self, hash: BlockHash, outcome: VerificationOutcome) {
        self.block_verdicts.lock().unwrap().insert(hash, outcome);
    }

    /// Force the verdict for a transaction.
    pub fn script_transaction(&self, hash: TxHash, outcome: VerificationOutcome) {
        self.transaction_verdicts.lock().unwrap().insert(hash, outcome);
    }

    /// Make every verification take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Verifier for NullVerifier {
    async fn verify_new_block(&self, block: &Block) -> VerificationOutcome {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        if let Some(outcome) = self.block_verdicts.lock().unwrap().get(&block.hash()) {
            return *outcome;
        }
        if !block.transactions_match_header() {
            return VerificationOutcome::Invalid(VerificationReason::Error);
        }
        if block.header.previous_block_hash != self.chain.head().hash() {
            return VerificationOutcome::Invalid(VerificationReason::PreviousHashMismatch);
        }
        block
            .transactions
            .iter()
            .map(|tx| check_spends(tx, self.chain.as_ref()))
            .find(|outcome| !outcome.is_valid())
            .unwrap_or(VerificationOutcome::Valid)
    }

    async fn verify_new_transaction(&self, transaction: &Transaction) -> VerificationOutcome {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        if let Some(outcome) = self.transaction_verdicts.lock().unwrap().get(&transaction.hash()) {
            return *outcome;
        }
        check_spends(transaction, self.chain.as_ref())
    }
}
