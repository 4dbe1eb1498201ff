#![no_main]

use libfuzzer_sys::fuzz_target;

use relay_messages::WireMessage;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes from a peer, framed and unframed.
    let _ = relay_protocol::codec::decode_framed::<WireMessage>(data);

    // Anything that decodes must encode again.
    if let Ok(message) = relay_protocol::codec::decode::<WireMessage>(data) {
        let frame = relay_protocol::codec::encode(&message).expect("decoded message re-encodes");
        let (again, used) =
            relay_protocol::codec::decode_framed::<WireMessage>(&frame).expect("re-encoded message decodes");
        assert_eq!(again, message);
        assert_eq!(used, frame.len());
    }
});
