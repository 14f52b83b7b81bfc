//! Benchmarks for session fan-out
//!
//! Publishes records to a registry with a growing number of joined sessions,
//! delivering into in-process mailboxes.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use oxilink::session::{Mailboxes, SessionRegistry};
use oxilink::test_utils::indexed_record;
use oxilink::types::SessionKey;
use std::hint::black_box;
use std::sync::Arc;

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for sessions in [1usize, 16, 256] {
        let mailboxes = Arc::new(Mailboxes::new(64));
        let registry = SessionRegistry::new(50, Arc::clone(&mailboxes));
        let feeds: Vec<_> = (0..sessions)
            .map(|i| {
                let key = SessionKey::from(format!("viewer-{i}"));
                let feed = mailboxes.open(key.clone());
                registry.join(key);
                feed
            })
            .collect();

        let mut next = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(sessions), &sessions, |b, _| {
            b.iter(|| {
                let record = Arc::new(indexed_record(next));
                next += 1;
                black_box(registry.publish(record))
            })
        });

        drop(feeds);
    }

    group.finish();
}

criterion_group!(benches, bench_publish);
criterion_main!(benches);
