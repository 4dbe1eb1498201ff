//! Fundamental types for the relay layer.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: hashes, node identities, network identifiers, block headers,
//! blocks and transactions.

pub mod block;
pub mod hash;
pub mod identity;
pub mod network;
pub mod transaction;

pub use block::{Block, BlockHash, BlockHeader};
pub use hash::{blake2b_256, Nullifier, TxHash};
pub use identity::Identity;
pub use network::NetworkId;
pub use transaction::{Spend, Transaction};
