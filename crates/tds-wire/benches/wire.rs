//! Benchmarks for packet de-framing and metadata decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::BytesMut;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tds_wire::{
    ColMetaData, ColumnData, PacketBuffer, TypeId, TypeInfo,
    packet::{PacketHeader, PacketStatus, PacketType, frame_payload},
};

/// Benchmark packet header decoding.
fn bench_packet_header_decode(c: &mut Criterion) {
    let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 1000);
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    let encoded = buf.freeze();

    c.bench_function("packet_header_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(PacketHeader::decode(&mut cursor).unwrap())
        })
    });
}

/// Benchmark pushing framed packets and draining them as u32 values.
fn bench_packet_buffer(c: &mut Criterion) {
    let payload: Vec<u8> = (0..64 * 1024).map(|i| i as u8).collect();
    let packets = frame_payload(&payload, 4096);

    let mut group = c.benchmark_group("packet_buffer");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("push_and_drain", |b| {
        b.iter(|| {
            let mut buf = PacketBuffer::new(4096);
            for packet in &packets {
                buf.push_raw(packet).unwrap();
            }
            let mut sum = 0u64;
            while let Some(v) = buf.try_get_u32_le().done() {
                sum = sum.wrapping_add(u64::from(v));
            }
            black_box(sum)
        })
    });
    group.finish();
}

/// Benchmark COLMETADATA decoding of a wide result.
fn bench_colmetadata_decode(c: &mut Criterion) {
    let meta = ColMetaData {
        columns: (0..64)
            .map(|i| {
                ColumnData::new(format!("col_{i}"), TypeId::IntN, TypeInfo {
                    max_length: Some(4),
                    ..Default::default()
                })
            })
            .collect(),
    };
    let mut buf = BytesMut::new();
    meta.encode(&mut buf);
    let encoded = buf.freeze();

    c.bench_function("colmetadata_decode_64", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(ColMetaData::decode(&mut cursor).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_packet_header_decode,
    bench_packet_buffer,
    bench_colmetadata_decode
);
criterion_main!(benches);
