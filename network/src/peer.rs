//! Per-connection peer state.

use std::fmt;

use relay_messages::PeerAddress;
use relay_protocol::{supports_hash_announcements, PeerInfo};
use relay_types::{BlockHash, Identity, TxHash};
use tokio::task::JoinHandle;

use crate::connection::PeerChannel;
use crate::known::KnownHashes;

/// Local handle for one connection, assigned by the [`PeerManager`](crate::PeerManager).
/// The peer's real identity is only known after the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    WaitingForIdentity,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Per-peer metadata tracked by the [`PeerManager`](crate::PeerManager).
pub struct Peer {
    pub(crate) id: PeerId,
    pub(crate) direction: Direction,
    pub(crate) state: ConnectionState,
    pub(crate) address: Option<PeerAddress>,
    /// Set once the handshake completes.
    pub(crate) info: Option<PeerInfo>,
    pub(crate) known_blocks: KnownHashes<BlockHash>,
    pub(crate) known_transactions: KnownHashes<TxHash>,
    pub(crate) channel: PeerChannel,
    /// Drains the outbound queue; awaited on shutdown.
    pub(crate) writer_task: Option<JoinHandle<()>>,
    /// Feeds inbound frames to the node; aborted on disconnect.
    pub(crate) reader_task: Option<JoinHandle<()>>,
    pub(crate) registered_at_secs: u64,
}

impl Peer {
    pub(crate) fn new(
        id: PeerId,
        direction: Direction,
        address: Option<PeerAddress>,
        channel: PeerChannel,
        known_capacity: usize,
        now_secs: u64,
    ) -> Self {
        Self {
            id,
            direction,
            state: ConnectionState::Connecting,
            address,
            info: None,
            known_blocks: KnownHashes::new(known_capacity),
            known_transactions: KnownHashes::new(known_capacity),
            channel,
            writer_task: None,
            reader_task: None,
            registered_at_secs: now_secs,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn address(&self) -> Option<&PeerAddress> {
        self.address.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn identity(&self) -> Option<Identity> {
        self.info.as_ref().map(|i| i.identity)
    }

    pub fn version(&self) -> Option<u16> {
        self.info.as_ref().map(|i| i.version)
    }

    pub fn info(&self) -> Option<&PeerInfo> {
        self.info.as_ref()
    }

    /// Whether the peer understands hash announcements. Unknown versions
    /// count as legacy.
    pub fn supports_hash_announcements(&self) -> bool {
        self.version().is_some_and(supports_hash_announcements)
    }

    pub fn knows_block(&self, hash: &BlockHash) -> bool {
        self.known_blocks.contains(hash)
    }

    pub fn knows_transaction(&self, hash: &TxHash) -> bool {
        self.known_transactions.contains(hash)
    }

    pub fn registered_at_secs(&self) -> u64 {
        self.registered_at_secs
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("identity", &self.identity())
            .field("version", &self.version())
            .finish()
    }
}
