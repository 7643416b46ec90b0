//! Benchmarks CTPH fingerprint computation and pairwise comparison across
//! subtitle-sized text bodies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use epimatch_core::hash::{compare, CtphFingerprint};

/// Build `sentences` short sentences of subtitle-like text, roughly
/// modeling an episode transcript of that length.
fn sample_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Line {i}: the crew gathers in the corridor before the mission briefing begins."))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("ctph_compute");
    for &sentences in &[50usize, 500, 2_000] {
        let text = sample_text(sentences);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sentences), &text, |b, text| {
            b.iter(|| black_box(CtphFingerprint::compute(black_box(text))));
        });
    }
    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let a = CtphFingerprint::compute(&sample_text(500));
    let b_text = sample_text(500).replace("mission", "assignment");
    let b_fp = CtphFingerprint::compute(&b_text);

    c.bench_function("ctph_compare", |bencher| {
        bencher.iter(|| black_box(compare(black_box(&a), black_box(&b_fp))));
    });
}

criterion_group!(benches, bench_compute, bench_compare);
criterion_main!(benches);
