#![no_main]

use libfuzzer_sys::fuzz_target;

use relay_messages::NewBlockMessage;

fuzz_target!(|data: &[u8]| {
    // Deserializing gossiped blocks and transactions must never panic.
    let _ = bincode::deserialize::<relay_types::Block>(data);
    let _ = bincode::deserialize::<relay_types::Transaction>(data);
    let _ = bincode::deserialize::<relay_messages::CompactBlock>(data);

    // Legacy payloads carry the block as an opaque byte string.
    let legacy = NewBlockMessage {
        nonce: [0u8; 16],
        block: data.to_vec(),
    };
    let _ = relay_protocol::legacy::decode_block(&legacy);
});
