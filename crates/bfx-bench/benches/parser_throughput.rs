use bfx_bench::fixture::mixed_document;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

fn bench_parser_throughput(c: &mut Criterion) {
    let doc = mixed_document("0");

    let mut group = c.benchmark_group("parser_throughput");
    group.throughput(Throughput::Bytes(doc.len() as u64));
    group.bench_function("parse_mixed_document", |b| {
        b.iter(|| bfx_parser::parse(&doc, false));
    });
    group.finish();
}

criterion_group!(benches, bench_parser_throughput);
criterion_main!(benches);
