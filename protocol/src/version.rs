//! Protocol version management.

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 3;

/// Minimum supported protocol version.
pub const MIN_PROTOCOL_VERSION: u16 = 1;

/// First version that understands `NewBlockHashes`,
/// `NewPooledTransactionHashes` and the `V2` gossip encodings. Older peers
/// only ever receive full legacy payloads.
pub const HASH_ANNOUNCEMENT_VERSION: u16 = 2;

/// Check if a peer's protocol version is compatible.
pub fn is_compatible(peer_version: u16) -> bool {
    peer_version >= MIN_PROTOCOL_VERSION && peer_version <= PROTOCOL_VERSION
}

/// Whether a peer at `peer_version` can consume hash announcements.
pub fn supports_hash_announcements(peer_version: u16) -> bool {
    peer_version >= HASH_ANNOUNCEMENT_VERSION
}
