//! Shielded transaction as seen by the relay layer.
//!
//! Only the parts the network needs are modelled: the spends (for
//! double-spend detection), the output note commitments, the fee and
//! expiration, and an opaque authorizing signature.

use serde::{Deserialize, Serialize};

use crate::hash::{blake2b_256, Nullifier, TxHash};

/// A spend of a previously created note.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spend {
    pub nullifier: Nullifier,
    /// Size of the note commitment tree the spend proof was built against.
    pub commitment_tree_size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    /// Fee paid to the miner. Negative for the miner's fee transaction.
    pub fee: i64,
    /// Sequence after which the transaction can no longer be mined (0 = never).
    pub expiration: u32,
    pub spends: Vec<Spend>,
    pub notes: Vec<[u8; 32]>,
    pub signature: Vec<u8>,
}

impl Transaction {
    pub const CURRENT_VERSION: u8 = 2;

    pub fn hash(&self) -> TxHash {
        let mut buf = Vec::with_capacity(16 + self.spends.len() * 40 + self.notes.len() * 32);
        buf.push(self.version);
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf.extend_from_slice(&self.expiration.to_le_bytes());
        buf.extend_from_slice(&(self.spends.len() as u32).to_le_bytes());
        for spend in &self.spends {
            buf.extend_from_slice(spend.nullifier.as_bytes());
            buf.extend_from_slice(&spend.commitment_tree_size.to_le_bytes());
        }
        buf.extend_from_slice(&(self.notes.len() as u32).to_le_bytes());
        for note in &self.notes {
            buf.extend_from_slice(note);
        }
        TxHash::new(blake2b_256(&[&buf, &self.signature]))
    }

    /// Build the miner's fee transaction for a block at `sequence`.
    pub fn miners_fee(sequence: u64, reward: i64) -> Self {
        let mut note = [0u8; 32];
        note[..8].copy_from_slice(&sequence.to_le_bytes());
        Self {
            version: Self::CURRENT_VERSION,
            fee: -reward,
            expiration: 0,
            spends: Vec::new(),
            notes: vec![note],
            signature: Vec::new(),
        }
    }

    pub fn is_miners_fee(&self) -> bool {
        self.fee < 0 && self.spends.is_empty()
    }

    pub fn nullifiers(&self) -> impl Iterator<Item = &Nullifier> {
        self.spends.iter().map(|s| &s.nullifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend(byte: u8, size: u64) -> Spend {
        Spend {
            nullifier: Nullifier::new([byte; 32]),
            commitment_tree_size: size,
        }
    }

    fn sample() -> Transaction {
        Transaction {
            version: Transaction::CURRENT_VERSION,
            fee: 5,
            expiration: 100,
            spends: vec![spend(1, 10)],
            notes: vec![[9u8; 32]],
            signature: vec![0xAA; 64],
        }
    }

    #[test]
    fn hash_covers_spends_and_signature() {
        let tx = sample();
        let mut other = sample();
        other.spends[0].commitment_tree_size = 11;
        assert_ne!(tx.hash(), other.hash());

        let mut other = sample();
        other.signature[0] = 0;
        assert_ne!(tx.hash(), other.hash());
    }

    #[test]
    fn miners_fee_is_recognised() {
        let fee = Transaction::miners_fee(3, 20);
        assert!(fee.is_miners_fee());
        assert!(!sample().is_miners_fee());
        assert_ne!(fee.hash(), Transaction::miners_fee(4, 20).hash());
    }

    #[test]
    fn nullifiers_follow_spend_order() {
        let mut tx = sample();
        tx.spends.push(spend(2, 10));
        let nullifiers: Vec<_> = tx.nullifiers().copied().collect();
        assert_eq!(nullifiers, vec![Nullifier::new([1; 32]), Nullifier::new([2; 32])]);
    }
}
