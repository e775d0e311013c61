use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use spark_stream::{Cursor, ReadStatus};

const TOTAL: usize = 64 * 1024;

fn drain(cursor: &mut Cursor, local: &mut [u8]) -> usize {
    let mut total = 0;
    while let Ok(ReadStatus::Read(count)) = cursor.read(local) {
        total += count;
    }
    total
}

fn flat_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_read");
    group.throughput(Throughput::Bytes(TOTAL as u64));
    let data = vec![0x5au8; TOTAL];
    for chunk in [256usize, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            let mut local = vec![0u8; chunk];
            b.iter(|| {
                let mut cursor = Cursor::from_bytes(data.clone()).expect("non-empty");
                black_box(drain(&mut cursor, &mut local))
            });
        });
    }
    group.finish();
}

fn composed_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("composed_read");
    group.throughput(Throughput::Bytes(TOTAL as u64));
    for pieces in [2usize, 8, 32] {
        let piece = vec![0xa5u8; TOTAL / pieces];
        group.bench_with_input(BenchmarkId::from_parameter(pieces), &pieces, |b, &pieces| {
            let mut local = vec![0u8; 4096];
            b.iter(|| {
                let mut cursor = Cursor::from_bytes(piece.clone()).expect("non-empty");
                for _ in 1..pieces {
                    let tail = Cursor::from_bytes(piece.clone()).expect("non-empty");
                    cursor.concat(&tail).expect("concat");
                }
                black_box(drain(&mut cursor, &mut local))
            });
        });
    }
    group.finish();
}

fn clone_cost(c: &mut Criterion) {
    let cursor = Cursor::from_bytes(vec![1u8; TOTAL]).expect("non-empty");
    c.bench_function("clone_at", |b| {
        b.iter(|| black_box(cursor.clone_at(black_box(1024)).expect("clone")))
    });
}

criterion_group!(benches, flat_reads, composed_reads, clone_cost);
criterion_main!(benches);
