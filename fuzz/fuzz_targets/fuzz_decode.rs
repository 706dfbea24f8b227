#![no_main]

use libfuzzer_sys::fuzz_target;
use wirecall::config::CodecLimits;
use wirecall::core::packet::Packet;
use wirecall::core::serialization::{decode, encode};

fuzz_target!(|data: &[u8]| {
    let limits = CodecLimits {
        max_message_size: 1024 * 1024,
        max_frame_size: 64 * 1024,
        recursion_depth: 32,
    };

    // Anything that decodes must re-encode to the same bytes
    if let Ok(value) = decode(data, limits) {
        let again = encode(&value, limits).ok();
        assert_eq!(again.as_deref(), Some(data));
    }

    if let Ok(Some((packet, used))) = Packet::parse(data, limits) {
        assert!(used <= data.len());
        let _ = packet.payload(limits);
    }
    let _ = Packet::read_from(&mut &data[..], limits);
});
