//! Node handshake protocol.
//!
//! Both sides send an `Identify` as soon as the connection opens. The
//! receiving side checks it against its own view of the network before the
//! peer is considered connected.

use relay_messages::IdentifyMessage;
use relay_types::{BlockHash, Identity, NetworkId};

use crate::{version, ProtocolError};

/// What the local node knows about itself for handshake purposes.
#[derive(Clone, Debug)]
pub struct LocalNode {
    pub identity: Identity,
    pub network_id: NetworkId,
    pub genesis_block_hash: BlockHash,
    pub agent: String,
    pub port: Option<u16>,
}

impl LocalNode {
    /// Build our own `Identify` for the given chain head.
    pub fn identify(&self, head: BlockHash, sequence: u64) -> IdentifyMessage {
        IdentifyMessage {
            identity: self.identity,
            version: version::PROTOCOL_VERSION,
            agent: self.agent.clone(),
            network_id: self.network_id,
            genesis_block_hash: self.genesis_block_hash,
            head,
            sequence,
            port: self.port,
        }
    }
}

/// Information about a peer after successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub identity: Identity,
    pub version: u16,
    pub agent: String,
    pub head: BlockHash,
    pub sequence: u64,
    pub port: Option<u16>,
}

/// Verify a peer's `Identify` message.
pub fn validate_identify(local: &LocalNode, msg: &IdentifyMessage) -> Result<PeerInfo, ProtocolError> {
    if !version::is_compatible(msg.version) {
        return Err(ProtocolError::UnsupportedVersion(msg.version));
    }
    if msg.network_id != local.network_id {
        return Err(ProtocolError::NetworkMismatch(msg.network_id.as_str()));
    }
    if msg.genesis_block_hash != local.genesis_block_hash {
        return Err(ProtocolError::GenesisMismatch);
    }
    if msg.identity == local.identity {
        return Err(ProtocolError::SelfConnection);
    }

    Ok(PeerInfo {
        identity: msg.identity,
        version: msg.version,
        agent: msg.agent.clone(),
        head: msg.head,
        sequence: msg.sequence,
        port: msg.port,
    })
}
