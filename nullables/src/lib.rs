//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator the relay layer talks to (chain, verifier, mempool,
//! wallet, worker pool) has an in-memory stand-in here that:
//! - Behaves deterministically
//! - Can be steered programmatically
//! - Counts its calls so tests can assert on them
//!
//! [`NullPeer`] plays the remote side of a connection without a socket.

pub mod chain;
pub mod mempool;
pub mod peer;
pub mod verifier;

pub use chain::NullChain;
pub use mempool::{NullAccounts, NullMemPool, NullWorkerPool};
pub use peer::NullPeer;
pub use verifier::NullVerifier;
