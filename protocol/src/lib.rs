//! Wire protocol: message framing, encoding/decoding, handshake, versioning.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod legacy;
pub mod version;

pub use error::ProtocolError;
pub use handshake::{validate_identify, LocalNode, PeerInfo};
pub use version::{
    is_compatible, supports_hash_announcements, HASH_ANNOUNCEMENT_VERSION, MIN_PROTOCOL_VERSION,
    PROTOCOL_VERSION,
};
