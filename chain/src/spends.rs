//! Double-spend detection against the chain's nullifier set.

use std::collections::HashSet;

use relay_types::{Nullifier, Transaction};

use crate::{VerificationOutcome, VerificationReason};

/// Read view of the chain's nullifier set.
pub trait NullifierSet {
    /// Note commitment tree size at which the nullifier was committed, if it
    /// has been.
    fn committed_at(&self, nullifier: &Nullifier) -> Option<u64>;

    /// Current size of the local note commitment tree.
    fn note_tree_size(&self) -> u64;
}

/// Check every spend of `transaction` against the nullifier set.
///
/// A spend whose declared tree size is larger than the local note tree cannot
/// be judged yet (this node may simply be behind) and is let through.
pub fn check_spends(transaction: &Transaction, nullifiers: &impl NullifierSet) -> VerificationOutcome {
    let local_size = nullifiers.note_tree_size();
    let mut seen = HashSet::with_capacity(transaction.spends.len());

    for spend in &transaction.spends {
        if !seen.insert(spend.nullifier) {
            return VerificationOutcome::Invalid(VerificationReason::DoubleSpend);
        }
        if spend.commitment_tree_size > local_size {
            continue;
        }
        if let Some(committed) = nullifiers.committed_at(&spend.nullifier) {
            if committed <= spend.commitment_tree_size {
                return VerificationOutcome::Invalid(VerificationReason::DoubleSpend);
            }
        }
    }

    VerificationOutcome::Valid
}
