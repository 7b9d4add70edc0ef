use bfx_bench::fixture::corpus;
use bfx_core::config::EngineConfig;
use bfx_indexer::IndexEngine;
use bfx_storage::store::MemDupStore;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

fn bench_insert_throughput(c: &mut Criterion) {
    let docs = corpus(200);

    let mut group = c.benchmark_group("insert_throughput");
    group.throughput(Throughput::Elements(docs.len() as u64));
    group.bench_function("insert_200_mixed_documents", |b| {
        b.iter(|| {
            let mut engine = IndexEngine::new(MemDupStore::new(), EngineConfig::default());
            for (key, body) in &docs {
                engine.insert(key.as_bytes(), body).unwrap();
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert_throughput);
criterion_main!(benches);
