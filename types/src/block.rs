//! Block hash, header and full block.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::blake2b_256;
use crate::transaction::Transaction;

/// A 32-byte block hash (the hash of a block header).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Block header. The header alone determines the block hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Height of the block; the genesis block has sequence 1.
    pub sequence: u64,
    pub previous_block_hash: BlockHash,
    /// Size of the note commitment tree after this block is applied.
    pub note_tree_size: u64,
    /// Size of the nullifier set after this block is applied.
    pub nullifier_set_size: u64,
    /// Root of the transaction list, committed to by the header.
    pub transaction_commitment: [u8; 32],
    pub target: [u8; 32],
    pub randomness: u64,
    pub timestamp_ms: u64,
    pub graffiti: [u8; 32],
}

impl BlockHeader {
    /// Blake2b-256 over the canonical little-endian field encoding.
    pub fn hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256(&[
            &self.sequence.to_le_bytes(),
            self.previous_block_hash.as_bytes(),
            &self.note_tree_size.to_le_bytes(),
            &self.nullifier_set_size.to_le_bytes(),
            &self.transaction_commitment,
            &self.target,
            &self.randomness.to_le_bytes(),
            &self.timestamp_ms.to_le_bytes(),
            &self.graffiti,
        ]))
    }
}

/// A full block: header plus ordered transactions. By convention the
/// transaction at index 0 is the miner's fee transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn sequence(&self) -> u64 {
        self.header.sequence
    }

    /// Commitment over the ordered transaction hashes, as stored in
    /// [`BlockHeader::transaction_commitment`].
    pub fn compute_transaction_commitment(transactions: &[Transaction]) -> [u8; 32] {
        let hashes: Vec<[u8; 32]> = transactions.iter().map(|tx| *tx.hash().as_bytes()).collect();
        let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
        blake2b_256(&parts)
    }

    /// Whether the header commits to exactly this transaction list.
    pub fn transactions_match_header(&self) -> bool {
        Self::compute_transaction_commitment(&self.transactions)
            == self.header.transaction_commitment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(sequence: u64) -> BlockHeader {
        BlockHeader {
            sequence,
            previous_block_hash: BlockHash::ZERO,
            note_tree_size: 0,
            nullifier_set_size: 0,
            transaction_commitment: [0u8; 32],
            target: [0xFF; 32],
            randomness: 0,
            timestamp_ms: 1_700_000_000_000,
            graffiti: [0u8; 32],
        }
    }

    #[test]
    fn header_hash_depends_on_every_field() {
        let base = header(1);
        let mut other = base.clone();
        other.randomness = 1;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.graffiti[31] = 1;
        assert_ne!(base.hash(), other.hash());
    }

    #[test]
    fn block_hash_is_header_hash() {
        let block = Block::new(header(7), vec![]);
        assert_eq!(block.hash(), block.header.hash());
        assert_eq!(block.sequence(), 7);
    }

    #[test]
    fn transaction_commitment_detects_reordering() {
        let a = Transaction::miners_fee(1, 10);
        let b = Transaction::miners_fee(2, 10);
        let ab = Block::compute_transaction_commitment(&[a.clone(), b.clone()]);
        let ba = Block::compute_transaction_commitment(&[b, a]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn block_hash_debug_is_abbreviated() {
        let hash = BlockHash::new([0x12; 32]);
        assert_eq!(format!("{:?}", hash), "BlockHash(12121212\u{2026})");
        assert!(BlockHash::default().is_zero());
    }
}
