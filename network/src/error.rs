use relay_messages::DisconnectReason;
use thiserror::Error;

use crate::PeerId;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    #[error("peer {0} rejected: {1:?}")]
    Rejected(PeerId, DisconnectReason),

    #[error("peer manager is stopped")]
    Stopped,

    #[error("outbound channel to peer {0} is full")]
    ChannelFull(PeerId),

    #[error("outbound channel to peer {0} is closed")]
    ChannelClosed(PeerId),

    #[error("protocol error: {0}")]
    Protocol(#[from] relay_protocol::ProtocolError),
}
