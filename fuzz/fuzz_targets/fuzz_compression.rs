#![no_main]

use libfuzzer_sys::fuzz_target;
use wirecall::utils::compression::{compress, decompress, CompressionKind};

const MAX_OUTPUT: usize = 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    for kind in [CompressionKind::Gzip, CompressionKind::Lz4, CompressionKind::Zstd] {
        // Roundtrip must hold for anything that compresses
        if let Ok(compressed) = compress(data, &kind) {
            let out = decompress(&compressed, &kind, data.len());
            assert_eq!(out.ok().as_deref(), Some(data));
        }

        // Hostile input must fail cleanly and never exceed the bound
        if let Ok(out) = decompress(data, &kind, MAX_OUTPUT) {
            assert!(out.len() <= MAX_OUTPUT);
        }
    }
});
