//! Verification verdicts and the verifier port.

use async_trait::async_trait;
use relay_types::{Block, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a block or transaction failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationReason {
    DoubleSpend,
    Duplicate,
    Error,
    Expired,
    InvalidMinersFee,
    InvalidProof,
    InvalidTransactionVersion,
    NoteCommitmentSize,
    PreviousHashMismatch,
    SequenceOutOfOrder,
    TooFarInFuture,
}

impl VerificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoubleSpend => "DOUBLE_SPEND",
            Self::Duplicate => "DUPLICATE",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
            Self::InvalidMinersFee => "INVALID_MINERS_FEE",
            Self::InvalidProof => "INVALID_PROOF",
            Self::InvalidTransactionVersion => "INVALID_TRANSACTION_VERSION",
            Self::NoteCommitmentSize => "NOTE_COMMITMENT_SIZE",
            Self::PreviousHashMismatch => "PREVIOUS_HASH_MISMATCH",
            Self::SequenceOutOfOrder => "SEQUENCE_OUT_OF_ORDER",
            Self::TooFarInFuture => "TOO_FAR_IN_FUTURE",
        }
    }
}

impl fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict returned by a [`Verifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    Valid,
    Invalid(VerificationReason),
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn reason(&self) -> Option<VerificationReason> {
        match self {
            Self::Valid => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}

/// Consensus verification, run on the worker pool.
///
/// Verification reads the chain's note and nullifier trees while a new block
/// may be advancing them, so a verdict reflects a snapshot that may already
/// be stale when it resolves.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify_new_block(&self, block: &Block) -> VerificationOutcome;

    async fn verify_new_transaction(&self, transaction: &Transaction) -> VerificationOutcome;
}
