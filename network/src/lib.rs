//! Peer layer of the relay node.
//!
//! Tracks connected peers and what each of them is known to have seen,
//! decides which connections to admit, computes readiness, and plans the
//! fan-out of every block and transaction broadcast.

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod known;
pub mod peer;
pub mod peer_manager;

pub use broadcast::{plan_fanout, BroadcastResult, FanoutPlan, FULL_RELAY_FANOUT};
pub use connection::{spawn_reader, spawn_writer, InboundEvent, Outbound, PeerChannel};
pub use error::NetworkError;
pub use known::KnownHashes;
pub use peer::{ConnectionState, Direction, Peer, PeerId};
pub use peer_manager::{GossipItem, GossipPayload, PeerManager, PeerManagerConfig, PendingWriters};
