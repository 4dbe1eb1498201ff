//! Relay node: the propagation layer of a full node.
//!
//! The [`PeerNetwork`] ties everything together:
//! - Dispatches every inbound peer message
//! - Verifies gossiped blocks and transactions at most once
//! - Relays them with full-payload fan-out and hash announcements
//! - Serves compact blocks and missing transactions to catching-up peers
//! - Tracks readiness and shuts down cleanly

pub mod blocks;
pub mod compact_server;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod metrics;
pub mod peer_network;
pub mod seen_ledger;
pub mod shutdown;
pub mod tracing_spans;
pub mod transactions;

pub use blocks::BlockOutcome;
pub use compact_server::CompactDataServer;
pub use config::NetworkConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NetworkMetrics;
pub use peer_network::{Collaborators, PeerNetwork};
pub use seen_ledger::SeenLedger;
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use transactions::TransactionOutcome;
