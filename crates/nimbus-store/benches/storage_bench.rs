//! Storage benchmarks for Nimbus.
//!
//! Benchmarks the chunk store's staged-write/publish path and streamed
//! reads at various payload sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nimbus_store::{ChunkStore, ChunkWriter, FileChunkStore};
use std::io::{Read, Write};
use tempfile::TempDir;

/// Generate test data of the specified size.
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Benchmark chunk publish (stage, hash, sync, rename).
fn bench_chunk_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_store_publish");

    for size in [1_024, 102_400, 1_048_576].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("publish", size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let store = FileChunkStore::new(dir.path()).unwrap();
            let data = generate_data(size);

            b.iter(|| {
                let mut writer = store.new_writer().unwrap();
                writer.write_all(&data).unwrap();
                black_box(writer.finish().unwrap())
            });
        });
    }

    group.finish();
}

/// Benchmark streamed chunk reads.
fn bench_chunk_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_store_read");

    for size in [1_024, 102_400, 1_048_576].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("read", size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let store = FileChunkStore::new(dir.path()).unwrap();
            let data = generate_data(size);

            let mut writer = store.new_writer().unwrap();
            writer.write_all(&data).unwrap();
            let (digest, _) = writer.finish().unwrap();

            b.iter(|| {
                let mut reader = store.new_reader(&digest).unwrap();
                let mut read = Vec::with_capacity(size);
                reader.read_to_end(&mut read).unwrap();
                black_box(read)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_publish, bench_chunk_read);
criterion_main!(benches);
