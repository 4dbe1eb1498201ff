//! Span constructors for the relay pipeline.
//!
//! Consistent span names and fields make traces easy to filter and
//! correlate across peers.

use std::fmt::Display;

use tracing::{debug_span, info_span, Span};

/// Handling of one inbound message.
pub fn message_span(peer: impl Display, kind: &str) -> Span {
    debug_span!("message", peer = %peer, kind = %kind)
}

/// Verification and append of one block.
pub fn block_span(hash: impl Display, sequence: u64) -> Span {
    info_span!("block", hash = %hash, sequence)
}

/// Verification and pooling of one transaction.
pub fn transaction_span(hash: impl Display) -> Span {
    debug_span!("transaction", hash = %hash)
}

/// Gossip of one item to connected peers.
pub fn broadcast_span(kind: &str, candidates: usize) -> Span {
    debug_span!("broadcast", kind = %kind, candidates)
}

/// Serving a request from a peer.
pub fn request_span(peer: impl Display, kind: &str, rpc_id: u32) -> Span {
    debug_span!("request", peer = %peer, kind = %kind, rpc_id)
}
