//! Nullable peer: the remote end of a connection, without a socket.
//!
//! Whatever the node sends the peer lands in its outbound queue, which the
//! test reads with [`NullPeer::drain`].

use relay_messages::{BlockHashInfo, IdentifyMessage, WireMessage};
use relay_network::{Direction, NetworkError, Outbound, PeerChannel, PeerId, PeerManager};
use relay_types::Identity;
use tokio::sync::mpsc;

pub struct NullPeer {
    pub id: PeerId,
    pub identity: Identity,
    rx: mpsc::Receiver<Outbound>,
    closed: bool,
}

impl NullPeer {
    /// Register an outbound connection and complete the handshake with the
    /// given protocol version. The node's own `Identify` is discarded.
    pub fn connect(pm: &mut PeerManager, seed: u8, version: u16) -> Result<Self, NetworkError> {
        let mut peer = Self::register(pm, Direction::Outbound)?;
        let identify = peer.identify(pm, seed, version);
        pm.handle_identify(peer.id, &identify, 0)?;
        peer.identity = identify.identity;
        peer.drain();
        Ok(peer)
    }

    /// Register a connection that has not identified itself yet.
    pub fn register(pm: &mut PeerManager, direction: Direction) -> Result<Self, NetworkError> {
        let (channel, rx) = PeerChannel::new(pm.config().channel_capacity);
        let local = pm.local();
        let head = BlockHashInfo {
            hash: local.genesis_block_hash,
            sequence: 1,
        };
        let id = pm.register_connection(channel, direction, None, head, 0)?;
        Ok(Self {
            id,
            identity: Identity::new([0; 32]),
            rx,
            closed: false,
        })
    }

    /// An `Identify` this peer could send: same network and genesis as the
    /// node, its own identity.
    pub fn identify(&self, pm: &PeerManager, seed: u8, version: u16) -> IdentifyMessage {
        let local = pm.local();
        let mut identify = local.identify(local.genesis_block_hash, 1);
        identify.identity = Identity::new([seed; 32]);
        identify.version = version;
        identify.agent = format!("null-peer/{seed}");
        identify
    }

    /// Every message queued for this peer so far.
    pub fn drain(&mut self) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        while let Ok(outbound) = self.rx.try_recv() {
            match outbound {
                Outbound::Message(message) => messages.push(message),
                Outbound::Close => self.closed = true,
            }
        }
        messages
    }

    /// Whether the node closed the connection. Only up to date after
    /// [`NullPeer::drain`].
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
