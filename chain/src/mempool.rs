//! Mempool port.

use relay_types::{Transaction, TxHash};

/// The transaction pool as seen by the relay layer.
pub trait MemPool: Send + Sync {
    /// Whether a transaction with this hash is currently pooled.
    fn exists(&self, hash: &TxHash) -> bool;

    /// Offer a verified transaction to the pool. Returns `false` if the pool
    /// declined it (already present, fee too low, pool full).
    fn accept_transaction(&self, transaction: &Transaction) -> bool;

    /// Look up a pooled transaction.
    fn get(&self, hash: &TxHash) -> Option<Transaction>;
}
