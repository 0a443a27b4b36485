//! Reference comparison: forward logits of a seeded demo model.
//!
//! The seeded model must be reproducible across constructions and runs; logits must be sane.

use gpt_oxidized::{create_demo_model_seeded, InferenceEngine, SamplingParams, TextGenerator};
use std::sync::Arc;

const SEED: u64 = 42;
const TEST_INPUT: [usize; 3] = [40, 69, 76];
const MAX_RELATIVE_DIFF: f32 = 0.01;

fn max_relative_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).abs() / y.abs().max(1e-6))
        .fold(0.0f32, f32::max)
}

#[test]
fn reference_comparison_determinism() {
    let engine = InferenceEngine::new(create_demo_model_seeded(SEED)).unwrap();
    let logits_a = engine.forward(&TEST_INPUT).unwrap();
    let logits_b = engine.forward(&TEST_INPUT).unwrap();
    let diff = max_relative_diff(&logits_a, &logits_b);
    assert!(
        diff <= MAX_RELATIVE_DIFF,
        "forward pass must be deterministic: max relative diff {} > {}",
        diff,
        MAX_RELATIVE_DIFF
    );
}

#[test]
fn reference_comparison_same_seed_same_model() {
    let a = InferenceEngine::new(create_demo_model_seeded(SEED))
        .unwrap()
        .forward(&TEST_INPUT)
        .unwrap();
    let b = InferenceEngine::new(create_demo_model_seeded(SEED))
        .unwrap()
        .forward(&TEST_INPUT)
        .unwrap();
    assert_eq!(a, b);

    let other = InferenceEngine::new(create_demo_model_seeded(SEED + 1))
        .unwrap()
        .forward(&TEST_INPUT)
        .unwrap();
    assert_ne!(a, other, "different seeds should give different weights");
}

#[test]
fn reference_comparison_logits_finite() {
    let model = create_demo_model_seeded(SEED);
    let vocab_size = model.vocab_size();
    let engine = InferenceEngine::new(model).unwrap();
    let logits = engine.forward(&TEST_INPUT).unwrap();
    assert_eq!(logits.len(), vocab_size);
    assert!(
        logits.iter().all(|x| x.is_finite()),
        "logits must be finite (no NaN/Inf)"
    );
}

#[test]
fn reference_comparison_logits_not_all_zero() {
    let logits = InferenceEngine::new(create_demo_model_seeded(SEED))
        .unwrap()
        .forward(&TEST_INPUT)
        .unwrap();
    let non_zero = logits.iter().filter(|&&x| x != 0.0).count();
    assert!(non_zero > 0, "logits should not be all zero");
}

#[test]
fn reference_comparison_seeded_generation_repeats() {
    let gen = TextGenerator::from_weights(Arc::new(create_demo_model_seeded(SEED))).unwrap();
    let params = SamplingParams::default();
    let a = gen.generate_seeded(&TEST_INPUT, 16, &params, SEED).unwrap();
    let b = gen.generate_seeded(&TEST_INPUT, 16, &params, SEED).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
}
