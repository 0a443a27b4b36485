//! End-to-end benchmarks: forward latency and full generation.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gpt_oxidized::{create_demo_model_seeded, InferenceEngine, SamplingParams, TextGenerator};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bench_forward_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_latency");

    let engine = InferenceEngine::new(create_demo_model_seeded(0)).unwrap();

    for seq_len in [1, 8, 32, 64] {
        let input: Vec<usize> = (0..seq_len).map(|i| 1 + i % 95).collect();
        group.bench_with_input(BenchmarkId::new("forward", seq_len), &seq_len, |b, _| {
            b.iter(|| engine.forward(&input).unwrap());
        });
    }

    group.finish();
}

fn bench_full_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_generation");

    let weights = Arc::new(create_demo_model_seeded(0));
    let generator = TextGenerator::from_weights(weights).unwrap();
    let prompt = vec![40usize, 69, 76, 76, 79];

    for (name, params) in [
        (
            "greedy",
            SamplingParams {
                temperature: 1.0,
                top_k: 1,
                top_p: 1.0,
            },
        ),
        (
            "nucleus",
            SamplingParams {
                temperature: 0.8,
                top_k: 40,
                top_p: 0.9,
            },
        ),
    ] {
        for max_new in [10, 50] {
            group.bench_with_input(BenchmarkId::new(name, max_new), &max_new, |b, &max_new| {
                b.iter(|| {
                    let mut rng = StdRng::seed_from_u64(7);
                    generator.generate(&prompt, max_new, &params, &mut rng).unwrap()
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_forward_latency, bench_full_generation);
criterion_main!(benches);
