//! Write path benchmarks.
//!
//! Run with: `cargo bench --bench write_path`
//!
//! Measures `StagedWriter::write` throughput, which holds the batch lock
//! across the scratch append, with and without gzip.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stagewrite::staging::{InMemoryObjectStore, InMemoryScratchStore, StagedWriter, WriterConfig};
use stagewrite::Compression;
use std::sync::Arc;

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for (name, compression) in [("raw", Compression::None), ("gzip", Compression::gzip())] {
        for value_len in [64usize, 1024] {
            let value = vec![b'x'; value_len];
            group.throughput(Throughput::Bytes(value_len as u64));

            group.bench_function(format!("{}_value_len_{}", name, value_len), |b| {
                let config = WriterConfig {
                    compression,
                    ..WriterConfig::default()
                };
                let writer = StagedWriter::with_scratch(
                    Arc::new(InMemoryObjectStore::new()),
                    Arc::new(InMemoryScratchStore::new()),
                    config,
                );
                b.iter(|| writer.write(black_box("bench/key"), black_box(&value)))
            });
        }
    }

    group.finish();
}

fn bench_write_many_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_many_keys");
    group.throughput(Throughput::Elements(1));

    let keys: Vec<String> = (0..256).map(|i| format!("bench/key-{}", i)).collect();
    let value = vec![b'x'; 128];

    group.bench_function("raw_256_keys", |b| {
        let writer = StagedWriter::with_scratch(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryScratchStore::new()),
            WriterConfig::default(),
        );
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % keys.len();
            writer.write(black_box(&keys[i]), black_box(&value))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_write, bench_write_many_keys);
criterion_main!(benches);
