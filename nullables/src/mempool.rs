//! Nullable mempool, wallet and worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use relay_chain::{Accounts, MemPool, WorkerPool};
use relay_types::{Transaction, TxHash};

/// An in-memory mempool that keeps everything it is offered, once.
pub struct NullMemPool {
    transactions: Mutex<HashMap<TxHash, Transaction>>,
    declining: AtomicBool,
}

impl NullMemPool {
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            declining: AtomicBool::new(false),
        }
    }

    /// Put a transaction in the pool directly.
    pub fn insert(&self, transaction: Transaction) {
        self.transactions.lock().unwrap().insert(transaction.hash(), transaction);
    }

    /// Make the pool decline every transaction offered from now on.
    pub fn set_declining(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NullMemPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemPool for NullMemPool {
    fn exists(&self, hash: &TxHash) -> bool {
        self.transactions.lock().unwrap().contains_key(hash)
    }

    fn accept_transaction(&self, transaction: &Transaction) -> bool {
        if self.declining.load(Ordering::SeqCst) {
            return false;
        }
        let mut transactions = self.transactions.lock().unwrap();
        let hash = transaction.hash();
        if transactions.contains_key(&hash) {
            return false;
        }
        transactions.insert(hash, transaction.clone());
        true
    }

    fn get(&self, hash: &TxHash) -> Option<Transaction> {
        self.transactions.lock().unwrap().get(hash).cloned()
    }
}

/// Records every transaction handed to the wallet.
#[derive(Default)]
pub struct NullAccounts {
    synced: Mutex<Vec<TxHash>>,
}

impl NullAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes passed to `sync_transaction`, in call order.
    pub fn synced(&self) -> Vec<TxHash> {
        self.synced.lock().unwrap().clone()
    }

    pub fn sync_count(&self, hash: &TxHash) -> usize {
        self.synced.lock().unwrap().iter().filter(|h| *h == hash).count()
    }
}

#[async_trait]
impl Accounts for NullAccounts {
    async fn sync_transaction(&self, transaction: &Transaction) {
        self.synced.lock().unwrap().push(transaction.hash());
    }
}

/// A worker pool whose saturation is set by the test.
#[derive(Default)]
pub struct NullWorkerPool {
    saturated: AtomicBool,
}

impl NullWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_saturated(&self, saturated: bool) {
        self.saturated.store(saturated, Ordering::SeqCst);
    }
}

impl WorkerPool for NullWorkerPool {
    fn saturated(&self) -> bool {
        self.saturated.load(Ordering::SeqCst)
    }
}
