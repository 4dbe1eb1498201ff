//! Abstract collaborator traits for the relay layer.
//!
//! The relay layer never touches storage, consensus rules, the mempool's
//! internals or the wallet directly. Every such dependency is consumed
//! through one of these traits; the node wires in real implementations and
//! tests wire in the in-memory ones from `relay-nullables`.

pub mod accounts;
pub mod chain;
pub mod error;
pub mod mempool;
pub mod spends;
pub mod verification;
pub mod workers;

pub use accounts::Accounts;
pub use chain::Chain;
pub use error::ChainError;
pub use mempool::MemPool;
pub use spends::{check_spends, NullifierSet};
pub use verification::{VerificationOutcome, VerificationReason, Verifier};
pub use workers::WorkerPool;
