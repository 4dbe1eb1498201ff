#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The codec enforces its size limit and rejects trailing bytes; neither
    // path may panic.
    let _ = relay_protocol::codec::decode::<Vec<u8>>(data);
    let _ = relay_protocol::codec::decode::<String>(data);
    let _ = relay_protocol::codec::decode_framed::<u64>(data);

    if data.len() >= 4 {
        let _ = relay_protocol::codec::decode_framed::<Vec<u8>>(data);
    }
});
