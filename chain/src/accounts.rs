//! Wallet/accounts port.

use async_trait::async_trait;
use relay_types::Transaction;

/// Receives every transaction that passed verification so the wallet can
/// match it against its accounts. Called at most once per transaction hash.
#[async_trait]
pub trait Accounts: Send + Sync {
    async fn sync_transaction(&self, transaction: &Transaction);
}
