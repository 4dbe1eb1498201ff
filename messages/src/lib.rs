//! Network message types for node-to-node communication.
//!
//! Every message sent between nodes is one variant of [`WireMessage`].
//! Request/response variants carry an [`RpcId`] chosen by the requester and
//! echoed by the responder, so several requests can be pipelined on one
//! connection.

use relay_types::{Block, BlockHash, BlockHeader, Identity, NetworkId, Transaction, TxHash};
use serde::{Deserialize, Serialize};

pub mod compact;

pub use compact::{CompactBlock, CompactBlockTransaction};

/// Correlation id pairing a response with its request on one connection.
pub type RpcId = u32;

/// Top-level P2P wire message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Handshake: the sender's identity and protocol version.
    Identify(IdentifyMessage),
    /// The sender is closing the connection.
    Disconnecting(DisconnectingMessage),
    /// Ask for the peer's list of connected peers.
    PeerListRequest,
    PeerList(PeerListMessage),

    /// Full block, legacy encoding.
    NewBlock(NewBlockMessage),
    /// Full block, current encoding.
    NewBlockV2(NewBlockV2Message),
    /// Block announcement; only sent to peers that support hash announcements.
    NewBlockHashes(NewBlockHashesMessage),
    GetCompactBlockRequest(GetCompactBlockRequest),
    GetCompactBlockResponse(GetCompactBlockResponse),
    GetBlockTransactionsRequest(GetBlockTransactionsRequest),
    GetBlockTransactionsResponse(GetBlockTransactionsResponse),
    /// Decline of any request; echoes the request's rpc id.
    CannotSatisfyRequest(CannotSatisfyRequest),

    /// Full transaction, legacy encoding.
    NewTransaction(NewTransactionMessage),
    /// Full transaction, current encoding.
    NewTransactionV2(NewTransactionV2Message),
    /// Transaction announcement; only sent to peers that support hash announcements.
    NewPooledTransactionHashes(NewPooledTransactionHashesMessage),
    PooledTransactionsRequest(PooledTransactionsRequest),
    PooledTransactionsResponse(PooledTransactionsResponse),
}

impl WireMessage {
    /// Short name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::Disconnecting(_) => "disconnecting",
            Self::PeerListRequest => "peer_list_request",
            Self::PeerList(_) => "peer_list",
            Self::NewBlock(_) => "new_block",
            Self::NewBlockV2(_) => "new_block_v2",
            Self::NewBlockHashes(_) => "new_block_hashes",
            Self::GetCompactBlockRequest(_) => "get_compact_block_request",
            Self::GetCompactBlockResponse(_) => "get_compact_block_response",
            Self::GetBlockTransactionsRequest(_) => "get_block_transactions_request",
            Self::GetBlockTransactionsResponse(_) => "get_block_transactions_response",
            Self::CannotSatisfyRequest(_) => "cannot_satisfy_request",
            Self::NewTransaction(_) => "new_transaction",
            Self::NewTransactionV2(_) => "new_transaction_v2",
            Self::NewPooledTransactionHashes(_) => "new_pooled_transaction_hashes",
            Self::PooledTransactionsRequest(_) => "pooled_transactions_request",
            Self::PooledTransactionsResponse(_) => "pooled_transactions_response",
        }
    }

    /// The correlation id, for request/response variants.
    pub fn rpc_id(&self) -> Option<RpcId> {
        match self {
            Self::GetCompactBlockRequest(m) => Some(m.rpc_id),
            Self::GetCompactBlockResponse(m) => Some(m.rpc_id),
            Self::GetBlockTransactionsRequest(m) => Some(m.rpc_id),
            Self::GetBlockTransactionsResponse(m) => Some(m.rpc_id),
            Self::CannotSatisfyRequest(m) => Some(m.rpc_id),
            Self::PooledTransactionsRequest(m) => Some(m.rpc_id),
            Self::PooledTransactionsResponse(m) => Some(m.rpc_id),
            _ => None,
        }
    }

    /// Messages a peer may send before its identity is known.
    pub fn allowed_before_handshake(&self) -> bool {
        matches!(self, Self::Identify(_) | Self::Disconnecting(_))
    }
}

/// Handshake message sent by both sides as soon as a connection opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyMessage {
    pub identity: Identity,
    pub version: u16,
    pub agent: String,
    pub network_id: NetworkId,
    pub genesis_block_hash: BlockHash,
    pub head: BlockHash,
    pub sequence: u64,
    /// Port the sender accepts inbound connections on, if any.
    pub port: Option<u16>,
}

/// Why a connection is being closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    ShuttingDown,
    /// The node is at its peer ceiling.
    Congested,
    UnsupportedVersion,
    NetworkMismatch,
    GenesisMismatch,
    DuplicateIdentity,
    SelfConnection,
    BadMessage,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectingMessage {
    pub reason: DisconnectReason,
    /// Unix seconds before which the peer should not reconnect (0 = any time).
    pub disconnect_until_secs: u64,
}

/// A peer's network address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListEntry {
    pub identity: Identity,
    pub address: Option<PeerAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListMessage {
    pub peers: Vec<PeerListEntry>,
}

/// Legacy block gossip: an opaque serialized block plus a gossip nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockMessage {
    pub nonce: [u8; 16],
    pub block: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockV2Message {
    pub block: Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHashInfo {
    pub hash: BlockHash,
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockHashesMessage {
    pub blocks: Vec<BlockHashInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCompactBlockRequest {
    pub block_hash: BlockHash,
    pub rpc_id: RpcId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCompactBlockResponse {
    pub compact_block: CompactBlock,
    pub rpc_id: RpcId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlockTransactionsRequest {
    pub block_hash: BlockHash,
    /// Positions in the block's transaction list. Signed on the wire so
    /// that malformed negative indexes can be detected and declined.
    pub transaction_indexes: Vec<i32>,
    pub rpc_id: RpcId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlockTransactionsResponse {
    pub block_hash: BlockHash,
    /// Transactions in the same order as the request's indexes.
    pub transactions: Vec<Transaction>,
    pub rpc_id: RpcId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CannotSatisfyRequest {
    pub rpc_id: RpcId,
}

/// Legacy transaction gossip: an opaque serialized transaction plus a nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransactionMessage {
    pub nonce: [u8; 16],
    pub transaction: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransactionV2Message {
    pub transaction: Transaction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPooledTransactionHashesMessage {
    pub hashes: Vec<TxHash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledTransactionsRequest {
    pub hashes: Vec<TxHash>,
    pub rpc_id: RpcId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledTransactionsResponse {
    pub transactions: Vec<Transaction>,
    pub rpc_id: RpcId,
}

impl GetCompactBlockResponse {
    pub fn header(&self) -> &BlockHeader {
        &self.compact_block.header
    }
}
