//! Compact block representation.
//!
//! A compact block carries the header, the transactions the requester is not
//! expected to have (the miner's fee transaction is never gossiped, so it is
//! always inlined) and bare hashes for every other position, in block order.

use relay_types::{Block, BlockHeader, Transaction, TxHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactBlockTransaction {
    pub index: u32,
    pub transaction: Transaction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactBlock {
    pub header: BlockHeader,
    /// Inlined transactions, strictly increasing by index.
    pub transactions: Vec<CompactBlockTransaction>,
    /// Hashes of the remaining transactions, in block order.
    pub transaction_hashes: Vec<TxHash>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompactBlockError {
    #[error("inline transaction index {index} out of range for {count} transactions")]
    IndexOutOfRange { index: u32, count: usize },

    #[error("inline transaction indexes are not strictly increasing")]
    UnorderedIndexes,

    #[error("expected {expected} transactions, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("transaction at index {index} does not match the announced hash")]
    HashMismatch { index: usize },
}

/// Outcome of assembling a compact block against a transaction source.
#[derive(Clone, Debug)]
pub enum Assembled {
    Complete(Block),
    Partial(PartialBlock),
}

/// A block with some transaction slots still unknown.
#[derive(Clone, Debug)]
pub struct PartialBlock {
    header: BlockHeader,
    slots: Vec<Slot>,
}

#[derive(Clone, Debug)]
enum Slot {
    Known(Transaction),
    Missing(TxHash),
}

impl CompactBlock {
    /// Build the compact form of `block`.
    pub fn from_block(block: &Block) -> Self {
        let mut transactions = Vec::new();
        let mut transaction_hashes = Vec::new();

        for (index, transaction) in block.transactions.iter().enumerate() {
            if index == 0 {
                transactions.push(CompactBlockTransaction {
                    index: 0,
                    transaction: transaction.clone(),
                });
            } else {
                transaction_hashes.push(transaction.hash());
            }
        }

        Self {
            header: block.header.clone(),
            transactions,
            transaction_hashes,
        }
    }

    /// Number of transactions in the full block.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len() + self.transaction_hashes.len()
    }

    /// Rebuild the block, resolving hashes through `lookup` (usually the
    /// mempool). Unresolved hashes yield a [`PartialBlock`].
    pub fn assemble<F>(&self, lookup: F) -> Result<Assembled, CompactBlockError>
    where
        F: Fn(&TxHash) -> Option<Transaction>,
    {
        let count = self.transaction_count();
        let mut inline = self.transactions.iter().peekable();
        let mut hashes = self.transaction_hashes.iter();
        let mut slots = Vec::with_capacity(count);
        let mut last_index: Option<u32> = None;

        for entry in &self.transactions {
            if entry.index as usize >= count {
                return Err(CompactBlockError::IndexOutOfRange {
                    index: entry.index,
                    count,
                });
            }
            if last_index.is_some_and(|last| entry.index <= last) {
                return Err(CompactBlockError::UnorderedIndexes);
            }
            last_index = Some(entry.index);
        }

        for position in 0..count {
            if let Some(entry) = inline.next_if(|e| e.index as usize == position) {
                slots.push(Slot::Known(entry.transaction.clone()));
                continue;
            }
            // Counts line up, so a hash is always available here.
            let Some(hash) = hashes.next() else {
                return Err(CompactBlockError::CountMismatch {
                    expected: count,
                    got: position,
                });
            };
            match lookup(hash) {
                Some(transaction) => slots.push(Slot::Known(transaction)),
                None => slots.push(Slot::Missing(*hash)),
            }
        }

        let partial = PartialBlock {
            header: self.header.clone(),
            slots,
        };
        if partial.missing_indexes().is_empty() {
            Ok(Assembled::Complete(partial.into_block()))
        } else {
            Ok(Assembled::Partial(partial))
        }
    }
}

impl PartialBlock {
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Indexes of the transactions still unknown, ascending.
    pub fn missing_indexes(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Missing(_)))
            .map(|(index, _)| index as u32)
            .collect()
    }

    /// Fill the missing slots with `transactions`, given in the order of
    /// [`missing_indexes`](Self::missing_indexes).
    pub fn fill(mut self, transactions: Vec<Transaction>) -> Result<Block, CompactBlockError> {
        let missing = self.missing_indexes();
        if missing.len() != transactions.len() {
            return Err(CompactBlockError::CountMismatch {
                expected: missing.len(),
                got: transactions.len(),
            });
        }

        for (index, transaction) in missing.into_iter().zip(transactions) {
            let index = index as usize;
            let Slot::Missing(expected) = &self.slots[index] else {
                continue;
            };
            if transaction.hash() != *expected {
                return Err(CompactBlockError::HashMismatch { index });
            }
            self.slots[index] = Slot::Known(transaction);
        }

        Ok(self.into_block())
    }

    fn into_block(self) -> Block {
        let transactions = self
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Known(transaction) => Some(transaction),
                Slot::Missing(_) => None,
            })
            .collect();
        Block::new(self.header, transactions)
    }
}
