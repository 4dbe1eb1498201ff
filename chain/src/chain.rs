//! Blockchain port.

use async_trait::async_trait;
use relay_types::{Block, BlockHash, BlockHeader};

use crate::{ChainError, VerificationReason};

/// Read access to the local chain plus the two writes the relay layer
/// performs: appending a verified block and recording an invalid one.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Whether the block is stored (on the main chain or a fork).
    fn has_block(&self, hash: &BlockHash) -> bool;

    /// Fetch a stored block.
    fn get_block(&self, hash: &BlockHash) -> Option<Block>;

    /// Header of the current heaviest-chain head.
    fn head(&self) -> BlockHeader;

    /// Header of the genesis block.
    fn genesis(&self) -> BlockHeader;

    /// Reason a block was previously found invalid, if it was.
    fn is_invalid(&self, hash: &BlockHash) -> Option<VerificationReason>;

    /// Remember that a block failed verification.
    fn add_invalid(&self, hash: BlockHash, reason: VerificationReason);

    /// Whether the chain considers itself caught up with the network.
    fn synced(&self) -> bool;

    /// Append a verified block.
    async fn add_block(&self, block: Block) -> Result<(), ChainError>;
}
