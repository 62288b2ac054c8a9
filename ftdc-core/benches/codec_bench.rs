use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ftdc_core::{read_structured, BatchCollector, Collector, Document};
use rand::{Rng, SeedableRng};

fn samples(count: usize, metrics: usize) -> Vec<Document> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut counters = vec![0i64; metrics];

    (0..count)
        .map(|_| {
            let mut doc = Document::new().with("host", "bench");
            for (idx, counter) in counters.iter_mut().enumerate() {
                // mostly idle counters, like real server status output
                if rng.gen_bool(0.2) {
                    *counter += rng.gen_range(1..100);
                }
                doc.push(format!("m{}", idx), *counter);
            }
            doc
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for metrics in [10usize, 100, 1000] {
        let input = samples(300, metrics);
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(metrics), &input, |b, input| {
            b.iter(|| {
                let mut collector = BatchCollector::new(300);
                for sample in input {
                    collector.add(sample.clone()).unwrap();
                }
                black_box(collector.resolve().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for metrics in [10usize, 100, 1000] {
        let mut collector = BatchCollector::new(300);
        for sample in samples(300, metrics) {
            collector.add(sample).unwrap();
        }
        let bytes = collector.resolve().unwrap();

        group.throughput(Throughput::Elements(300));
        group.bench_with_input(BenchmarkId::from_parameter(metrics), &bytes, |b, bytes| {
            b.iter(|| black_box(read_structured(&bytes[..]).count()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
