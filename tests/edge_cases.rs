//! Edge case tests for the wire codec and frame reader
//!
//! Covers ceilings, malformed input and hostile length prefixes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use wirecall::config::{CodecLimits, MAGIC_BYTES, PROTOCOL_VERSION};
use wirecall::core::packet::{write_header, ChunkedWriter, Packet, FLAG_CHUNKED};
use wirecall::core::serialization::{decode, encode, Deserializer};
use wirecall::error::{Ceiling, ProtocolError};
use wirecall::utils::compression::{compress, CompressionKind};
use wirecall::Value;

fn small(message: usize, frame: usize, depth: usize) -> CodecLimits {
    CodecLimits {
        max_message_size: message,
        max_frame_size: frame,
        recursion_depth: depth,
    }
}

fn ceiling_of(err: &ProtocolError) -> Option<Ceiling> {
    match err {
        ProtocolError::LimitExceeded { ceiling, .. } => Some(*ceiling),
        _ => None,
    }
}

fn nested(depth: usize) -> Value {
    let mut value = Value::Null;
    for _ in 0..depth {
        value = Value::List(vec![value]);
    }
    value
}

// ============================================================================
// Value edge cases
// ============================================================================

#[test]
fn test_empty_containers() {
    let limits = CodecLimits::default();
    for value in [
        Value::List(vec![]),
        Value::Map(vec![]),
        Value::Bytes(vec![]),
        Value::String(String::new()),
        Value::Array {
            element_type: "string".into(),
            items: vec![],
        },
        Value::Object {
            type_name: "com.example.Empty".into(),
            fields: vec![],
        },
    ] {
        let bytes = encode(&value, limits).unwrap();
        assert_eq!(decode(&bytes, limits).unwrap(), value);
    }
}

#[test]
fn test_numeric_extremes() {
    let limits = CodecLimits::default();
    for value in [
        Value::I64(i64::MIN),
        Value::I64(i64::MAX),
        Value::U64(u64::MAX),
        Value::F64(f64::INFINITY),
        Value::F64(-0.0),
    ] {
        let bytes = encode(&value, limits).unwrap();
        assert_eq!(decode(&bytes, limits).unwrap(), value);
    }
}

#[test]
fn test_unicode_strings() {
    let value = Value::from("héllo → 世界 🦀");
    let limits = CodecLimits::default();
    let bytes = encode(&value, limits).unwrap();
    assert_eq!(decode(&bytes, limits).unwrap(), value);
}

// ============================================================================
// Ceilings
// ============================================================================

#[test]
fn test_depth_at_limit_is_accepted() {
    let limits = small(1024, 1024, 4);
    let bytes = encode(&nested(4), limits).unwrap();
    assert_eq!(decode(&bytes, limits).unwrap(), nested(4));
}

#[test]
fn test_depth_past_limit_rejected_on_encode() {
    let err = encode(&nested(5), small(1024, 1024, 4)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::RecursionDepth));
}

#[test]
fn test_depth_past_limit_rejected_on_decode() {
    let bytes = encode(&nested(5), CodecLimits::default()).unwrap();
    let err = decode(&bytes, small(1024, 1024, 4)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::RecursionDepth));
}

#[test]
fn test_message_ceiling_on_encode() {
    let value = Value::Bytes(vec![0; 200]);
    let err = encode(&value, small(100, 1024, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
}

#[test]
fn test_message_ceiling_on_decode() {
    let bytes = encode(&Value::Bytes(vec![0; 200]), CodecLimits::default()).unwrap();
    let err = decode(&bytes, small(100, 1024, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
}

#[test]
fn test_frame_ceiling_applies_to_each_item() {
    let value = Value::List(vec![Value::from("short"), Value::from("x".repeat(64))]);
    let err = encode(&value, small(4096, 32, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::FrameSize));

    // Many small items together may exceed the frame ceiling
    let value = Value::List((0..10).map(|_| Value::from("x".repeat(20))).collect());
    assert!(encode(&value, small(4096, 32, 8)).is_ok());
}

#[test]
fn test_hostile_length_prefix_does_not_allocate() {
    // Claims a 4 GiB byte string but carries nothing
    let mut bytes = vec![PROTOCOL_VERSION, 0x07];
    bytes.extend_from_slice(&u32::MAX.to_be_bytes());
    let err = decode(&bytes, CodecLimits::default()).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::FrameSize));
}

#[test]
fn test_hostile_count_within_ceiling_fails_cleanly() {
    // A list claiming a million entries, all missing
    let mut bytes = vec![PROTOCOL_VERSION, 0x08];
    bytes.extend_from_slice(&1_000_000u32.to_be_bytes());
    let err = decode(&bytes, CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::Serialization(_)));
}

#[test]
fn test_streamed_decode_checks_message_ceiling_before_reading() {
    // Length fits the frame ceiling but not the message ceiling
    let mut bytes = vec![PROTOCOL_VERSION, 0x07];
    bytes.extend_from_slice(&500u32.to_be_bytes());
    let mut deserializer = Deserializer::new(bytes.as_slice(), small(100, 1000, 8));
    let err = deserializer.read_message().unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn test_empty_input() {
    assert!(decode(&[], CodecLimits::default()).is_err());
}

#[test]
fn test_wrong_version() {
    let err = decode(&[99, 0x00], CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::UnsupportedVersion(99)));
}

#[test]
fn test_unknown_tag() {
    let err = decode(&[PROTOCOL_VERSION, 0x7F], CodecLimits::default()).unwrap_err();
    assert!(err.is_protocol());
}

#[test]
fn test_truncated_integer() {
    let err = decode(&[PROTOCOL_VERSION, 0x03, 0, 0], CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::Serialization(_)));
}

#[test]
fn test_invalid_utf8() {
    let mut bytes = vec![PROTOCOL_VERSION, 0x06];
    bytes.extend_from_slice(&2u32.to_be_bytes());
    bytes.extend_from_slice(&[0xFF, 0xFE]);
    let err = decode(&bytes, CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::Serialization(_)));
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = encode(&Value::Null, CodecLimits::default()).unwrap();
    bytes.push(0x00);
    assert!(decode(&bytes, CodecLimits::default()).is_err());
}

// ============================================================================
// Frames
// ============================================================================

#[test]
fn test_frame_bad_magic() {
    let mut bytes = Packet::new("/invoke", vec![1, 2, 3]).to_bytes().unwrap();
    bytes[0] = b'X';
    let err = Packet::parse(&bytes, CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidHeader));
}

#[test]
fn test_frame_unknown_flags() {
    let mut bytes = Packet::new("/invoke", vec![]).to_bytes().unwrap();
    bytes[5] = 0b1000_0000;
    let err = Packet::parse(&bytes, CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidHeader));
}

#[test]
fn test_frame_incomplete_waits_for_more() {
    let bytes = Packet::new("/invoke", vec![7; 100]).to_bytes().unwrap();
    for cut in [0, 4, 9, 20, bytes.len() - 1] {
        assert!(Packet::parse(&bytes[..cut], CodecLimits::default())
            .unwrap()
            .is_none());
    }
}

#[test]
fn test_fixed_body_bounded_by_message_ceiling() {
    let bytes = Packet::new("/", vec![0; 300]).to_bytes().unwrap();
    let err = Packet::parse(&bytes, small(200, 1000, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
    let err = Packet::read_from(&mut bytes.as_slice(), small(200, 1000, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
}

#[test]
fn test_oversized_chunk_rejected() {
    let mut bytes = Vec::new();
    write_header(&mut bytes, "/", None, true).unwrap();
    bytes.extend_from_slice(&100u32.to_be_bytes());
    bytes.extend_from_slice(&[0; 100]);
    bytes.extend_from_slice(&0u32.to_be_bytes());
    assert_eq!(bytes[5] & FLAG_CHUNKED, FLAG_CHUNKED);

    let err = Packet::parse(&bytes, small(1000, 50, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::FrameSize));
}

#[test]
fn test_chunks_sum_bounded_by_message_ceiling() {
    let limits = small(150, 64, 8);
    let mut writer = ChunkedWriter::new(Vec::new(), limits);
    writer.write_all(&[1; 200]).unwrap();
    let mut bytes = Vec::new();
    write_header(&mut bytes, "/", None, true).unwrap();
    bytes.extend_from_slice(&writer.finish().unwrap());

    let err = Packet::read_from(&mut bytes.as_slice(), limits).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
}

#[test]
fn test_header_of_hostile_frame_costs_nothing() {
    let mut bytes = MAGIC_BYTES.to_vec();
    bytes.extend_from_slice(&[PROTOCOL_VERSION, 0, 0, 1, b'/']);
    bytes.extend_from_slice(&u32::MAX.to_be_bytes());
    let err = Packet::read_from(&mut bytes.as_slice(), CodecLimits::default()).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
}

#[test]
fn test_decompression_bomb_rejected() {
    let body = compress(&vec![0u8; 1_000_000], &CompressionKind::Zstd).unwrap();
    let mut packet = Packet::new("/", body);
    packet.compression = Some(CompressionKind::Zstd);
    let err = packet.payload(small(10_000, 10_000, 8)).unwrap_err();
    assert_eq!(ceiling_of(&err), Some(Ceiling::MessageSize));
    assert!(matches!(err, ProtocolError::LimitExceeded { limit: 10_000, .. }));
}

#[test]
fn test_corrupt_compressed_body_is_decompression_failure() {
    let mut packet = Packet::new("/", vec![0x1f, 0x8b, 0x00, 0x01]);
    packet.compression = Some(CompressionKind::Gzip);
    let err = packet.payload(CodecLimits::default()).unwrap_err();
    assert!(matches!(err, ProtocolError::DecompressionFailure));
}
