//! Throughput Benchmark for CatchDB
//!
//! Measures request dispatch for each data type, the block parser and the
//! key comparator the store orders every record with.

use bytes::Bytes;
use catchdb::commands::CommandHandler;
use catchdb::protocol::{encode_request, Frame};
use catchdb::storage::{AggregateComparator, Comparator, MemStore};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn request(words: &[&str]) -> Vec<Bytes> {
    words.iter().map(|w| Bytes::from(w.to_string())).collect()
}

/// Benchmark flat SET / GET
fn bench_flat(c: &mut Criterion) {
    let mut handler = CommandHandler::new(MemStore::new());

    let mut group = c.benchmark_group("flat");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i);
            black_box(handler.execute(&request(&["set", &key, "small_value"])));
            i += 1;
        });
    });

    for i in 0..100_000 {
        let key = format!("key:{}", i);
        handler.execute(&request(&["set", &key, "value"]));
    }

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(handler.execute(&request(&["get", &key])));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark HSET / HGET on one hash
fn bench_hash(c: &mut Criterion) {
    let mut handler = CommandHandler::new(MemStore::new());

    let mut group = c.benchmark_group("hash");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hset", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let field = format!("field:{}", i % 10_000);
            black_box(handler.execute(&request(&["hset", "h", &field, "value"])));
            i += 1;
        });
    });

    group.bench_function("hget", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let field = format!("field:{}", i % 10_000);
            black_box(handler.execute(&request(&["hget", "h", &field])));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark queue push/pop pairs
fn bench_queue(c: &mut Criterion) {
    let mut handler = CommandHandler::new(MemStore::new());
    let push = request(&["qpush_back", "q", "item"]);
    let pop = request(&["qpop_front", "q"]);

    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(2));

    group.bench_function("push_pop", |b| {
        b.iter(|| {
            black_box(handler.execute(&push));
            black_box(handler.execute(&pop));
        });
    });

    group.finish();
}

/// Benchmark ZSET updates and ZTOPN
fn bench_zset(c: &mut Criterion) {
    let mut handler = CommandHandler::new(MemStore::new());

    let mut group = c.benchmark_group("zset");
    group.throughput(Throughput::Elements(1));

    group.bench_function("zset_rescore", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let member = format!("m:{}", i % 1_000);
            let score = (i * 7919 % 100_000).to_string();
            black_box(handler.execute(&request(&["zset", "z", &member, &score])));
            i += 1;
        });
    });

    let topn = request(&["ztopn", "z", "10"]);
    group.bench_function("ztopn_10", |b| {
        b.iter(|| black_box(handler.execute(&topn)));
    });

    group.finish();
}

/// Benchmark request parsing, whole and byte-split
fn bench_parser(c: &mut Criterion) {
    let small = encode_request(&["hset", "users", "alice", "42"]);
    let large_value = "x".repeat(16 * 1024);
    let large = encode_request(&["set", "blob", large_value.as_str()]);

    let mut group = c.benchmark_group("parser");

    group.throughput(Throughput::Bytes(small.len() as u64));
    group.bench_function("small_request", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            black_box(frame.parse(&small).unwrap());
            black_box(frame.take_blocks());
        });
    });

    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("16kb_request", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            black_box(frame.parse(&large).unwrap());
            black_box(frame.take_blocks());
        });
    });

    group.throughput(Throughput::Bytes(small.len() as u64));
    group.bench_function("small_request_split", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            let mut pos = 0;
            let mut end = 1;
            while !frame.is_complete() && end <= small.len() {
                pos += frame.parse(&small[pos..end]).unwrap();
                end += 1;
            }
            black_box(frame.take_blocks());
        });
    });

    group.finish();
}

/// Benchmark the record comparator
fn bench_comparator(c: &mut Criterion) {
    let mut zs_a = b"ZS\x01\x00z".to_vec();
    zs_a.extend_from_slice(&(-5i64).to_le_bytes());
    zs_a.extend_from_slice(b"alice");
    let mut zs_b = b"ZS\x01\x00z".to_vec();
    zs_b.extend_from_slice(&10i64.to_le_bytes());
    zs_b.extend_from_slice(b"bob");

    let mut group = c.benchmark_group("comparator");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hash_fields", |b| {
        b.iter(|| {
            black_box(AggregateComparator::compare(
                black_box(b"H\x05\x00usersalice"),
                black_box(b"H\x05\x00usersbob"),
            ))
        });
    });

    group.bench_function("zset_scores", |b| {
        b.iter(|| black_box(AggregateComparator::compare(black_box(&zs_a[..]), black_box(&zs_b[..]))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_flat,
    bench_hash,
    bench_queue,
    bench_zset,
    bench_parser,
    bench_comparator,
);

criterion_main!(benches);
