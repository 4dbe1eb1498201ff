use thiserror::Error;

use relay_types::BlockHash;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block {0} is already in the chain")]
    Duplicate(BlockHash),

    #[error("previous block {0} is not in the chain")]
    Orphan(BlockHash),

    #[error("block {hash} is invalid: {reason}")]
    Invalid {
        hash: BlockHash,
        reason: crate::VerificationReason,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}
