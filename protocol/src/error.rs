use relay_messages::DisconnectReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("peer is on network {0}")]
    NetworkMismatch(&'static str),

    #[error("peer has a different genesis block")]
    GenesisMismatch,

    #[error("peer announced our own identity")]
    SelfConnection,

    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Reason to put in the `Disconnecting` message sent to the offending peer.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::UnsupportedVersion(_) => DisconnectReason::UnsupportedVersion,
            Self::NetworkMismatch(_) => DisconnectReason::NetworkMismatch,
            Self::GenesisMismatch => DisconnectReason::GenesisMismatch,
            Self::SelfConnection => DisconnectReason::SelfConnection,
            Self::MessageTooLarge { .. } | Self::Malformed(_) => DisconnectReason::BadMessage,
            Self::Io(_) => DisconnectReason::Unknown,
        }
    }
}
