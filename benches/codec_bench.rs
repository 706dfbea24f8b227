#![allow(clippy::unwrap_used)]

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};
use wirecall::config::CodecLimits;
use wirecall::core::codec::PacketCodec;
use wirecall::core::packet::Packet;
use wirecall::core::serialization::{decode, encode};
use wirecall::Value;

fn record(i: usize) -> Value {
    Value::object(
        "com.example.Customer",
        vec![
            ("id", Value::U64(i as u64)),
            ("name", Value::from(format!("customer-{i}"))),
            ("balance", Value::F64(i as f64 * 1.5)),
            ("active", Value::Bool(i % 2 == 0)),
        ],
    )
}

fn bench_value_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_codec");
    let limits = CodecLimits::default();

    for &count in &[1usize, 100, 10_000] {
        let value = Value::Array {
            element_type: "com.example.Customer".into(),
            items: (0..count).map(record).collect(),
        };
        let bytes = encode(&value, limits).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_function(format!("encode_{count}_records"), |b| {
            b.iter(|| encode(&value, limits).unwrap())
        });
        group.bench_function(format!("decode_{count}_records"), |b| {
            b.iter(|| decode(&bytes, limits).unwrap())
        });
    }

    group.finish();
}

fn bench_packet_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_codec");
    let payload_sizes = [64usize, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_decode_{size}b"), |b| {
            b.iter_batched(
                || Packet::new("/invoke", vec![0u8; size]),
                |packet| {
                    let mut codec = PacketCodec::new(CodecLimits::default());
                    let mut buf = BytesMut::with_capacity(size + 32);
                    codec.encode(packet, &mut buf).unwrap();
                    codec.decode(&mut buf).unwrap().unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_value_codec, bench_packet_codec);
criterion_main!(benches);
