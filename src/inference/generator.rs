//! Autoregressive text generation over a [`LanguageModel`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::context::Context;
use super::engine::InferenceEngine;
use super::sampling::{Sampler, SamplingParams};
use crate::errors::GptError;
use crate::model::{GptConfig, ModelWeights};

/// Upper bound the CLI applies to `max_new`.
pub const MAX_NEW_TOKENS: usize = 512;

/// Anything that maps a token window to next-token logits.
pub trait LanguageModel {
    fn config(&self) -> &GptConfig;

    /// Logits for the position after the last id, `[vocab_size]`.
    fn forward(&self, ids: &[usize]) -> Result<Vec<f32>>;
}

impl LanguageModel for InferenceEngine {
    fn config(&self) -> &GptConfig {
        &self.weights().config
    }

    fn forward(&self, ids: &[usize]) -> Result<Vec<f32>> {
        InferenceEngine::forward(self, ids)
    }
}

/// Text generator wrapping a model.
pub struct TextGenerator<M = InferenceEngine> {
    model: M,
}

impl TextGenerator<InferenceEngine> {
    pub fn from_weights(weights: Arc<ModelWeights>) -> Result<Self, GptError> {
        Ok(Self::new(InferenceEngine::from_arc(weights)?))
    }
}

impl<M: LanguageModel> TextGenerator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Generate exactly `max_new` ids after `prompt_ids`. Prompt ids are not
    /// part of the result. There is no stop token.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        prompt_ids: &[usize],
        max_new: usize,
        params: &SamplingParams,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let start = Instant::now();
        let out = self
            .stream(prompt_ids, max_new, *params, rng)
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Generated {} tokens in {:.1} ms",
            out.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(out)
    }

    /// Same as [`generate`](Self::generate) with a fresh `StdRng` from `seed`.
    pub fn generate_seeded(
        &self,
        prompt_ids: &[usize],
        max_new: usize,
        params: &SamplingParams,
        seed: u64,
    ) -> Result<Vec<usize>> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.generate(prompt_ids, max_new, params, &mut rng)
    }

    /// Lazy generation: each `next()` runs one forward pass and one draw.
    /// Dropping the stream between items abandons the request cleanly.
    pub fn stream<'a, R: Rng + ?Sized>(
        &'a self,
        prompt_ids: &[usize],
        max_new: usize,
        params: SamplingParams,
        rng: &'a mut R,
    ) -> TokenStream<'a, M, R> {
        let config = self.model.config();
        let context = if prompt_ids.is_empty() && max_new > 0 {
            let seed_id = config.vocab_size - 1;
            warn!("Empty prompt, seeding context with id {}", seed_id);
            Context::new(&[seed_id], config.max_seq)
        } else {
            Context::new(prompt_ids, config.max_seq)
        };
        TokenStream {
            model: &self.model,
            context,
            sampler: Sampler::new(params),
            rng,
            remaining: max_new,
            done: false,
        }
    }
}

/// Iterator over newly generated ids. Stops after `max_new` ids or the
/// first error.
pub struct TokenStream<'a, M, R: ?Sized> {
    model: &'a M,
    context: Context,
    sampler: Sampler,
    rng: &'a mut R,
    remaining: usize,
    done: bool,
}

impl<M: LanguageModel, R: Rng + ?Sized> TokenStream<'_, M, R> {
    fn step(&mut self) -> Result<usize> {
        let logits = self.model.forward(self.context.window())?;
        let next = self.sampler.sample(&logits, &mut *self.rng)?;
        self.context.push(next);
        debug!("Sampled token {}", next);
        Ok(next)
    }
}

impl<M: LanguageModel, R: Rng + ?Sized> Iterator for TokenStream<'_, M, R> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = self.step();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.remaining))
        }
    }
}

/// One-shot generation over shared weights.
pub fn generate<R: Rng + ?Sized>(
    prompt_ids: &[usize],
    weights: Arc<ModelWeights>,
    max_new: usize,
    params: &SamplingParams,
    rng: &mut R,
) -> Result<Vec<usize>> {
    TextGenerator::from_weights(weights)?.generate(prompt_ids, max_new, params, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::create_demo_model_seeded;
    use std::cell::RefCell;

    /// Records every window it sees; always prefers the id after the last one.
    struct MockModel {
        config: GptConfig,
        calls: RefCell<Vec<Vec<usize>>>,
    }

    impl MockModel {
        fn new(vocab_size: usize, max_seq: usize) -> Self {
            Self {
                config: GptConfig {
                    vocab_size,
                    max_seq,
                    ..GptConfig::default()
                },
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for MockModel {
        fn config(&self) -> &GptConfig {
            &self.config
        }

        fn forward(&self, ids: &[usize]) -> Result<Vec<f32>> {
            self.calls.borrow_mut().push(ids.to_vec());
            let next = (ids[ids.len() - 1] + 1) % self.config.vocab_size;
            let mut logits = vec![0.0; self.config.vocab_size];
            logits[next] = 10.0;
            Ok(logits)
        }
    }

    fn greedy() -> SamplingParams {
        SamplingParams {
            temperature: 1.0,
            top_k: 1,
            top_p: 1.0,
        }
    }

    #[test]
    fn zero_max_new_never_calls_the_model() {
        let gen = TextGenerator::new(MockModel::new(10, 4));
        let out = gen.generate_seeded(&[1, 2], 0, &greedy(), 0).unwrap();
        assert!(out.is_empty());
        assert!(gen.model().calls.borrow().is_empty());
    }

    #[test]
    fn returns_exactly_max_new_ids() {
        let gen = TextGenerator::new(MockModel::new(10, 4));
        let out = gen.generate_seeded(&[1], 5, &greedy(), 0).unwrap();
        assert_eq!(out, vec![2, 3, 4, 5, 6]);
        assert_eq!(gen.model().calls.borrow().len(), 5);
    }

    #[test]
    fn windows_are_the_last_max_seq_ids() {
        let gen = TextGenerator::new(MockModel::new(20, 3));
        gen.generate_seeded(&[1, 2, 3, 4, 5], 3, &greedy(), 0).unwrap();
        let calls = gen.model().calls.borrow();
        assert_eq!(calls[0], vec![3, 4, 5]);
        assert_eq!(calls[1], vec![4, 5, 6]);
        assert_eq!(calls[2], vec![5, 6, 7]);
    }

    #[test]
    fn empty_prompt_is_seeded_with_last_id() {
        let gen = TextGenerator::new(MockModel::new(10, 4));
        let out = gen.generate_seeded(&[], 2, &greedy(), 0).unwrap();
        assert_eq!(gen.model().calls.borrow()[0], vec![9]);
        // seed id is not part of the output
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn stream_can_be_abandoned_early() {
        let gen = TextGenerator::new(MockModel::new(10, 4));
        let mut rng = StdRng::seed_from_u64(0);
        let first: Vec<usize> = gen
            .stream(&[1], 100, greedy(), &mut rng)
            .take(3)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(first, vec![2, 3, 4]);
        assert_eq!(gen.model().calls.borrow().len(), 3);
    }

    #[test]
    fn stream_prefix_matches_full_generation() {
        let weights = Arc::new(create_demo_model_seeded(11));
        let gen = TextGenerator::from_weights(weights).unwrap();
        let params = SamplingParams::default();
        let full = gen.generate_seeded(&[40, 41], 6, &params, 99).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let partial: Vec<usize> = gen
            .stream(&[40, 41], 6, params, &mut rng)
            .take(4)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(&full[..4], &partial[..]);
    }

    #[test]
    fn forward_errors_stop_the_stream() {
        let gen = TextGenerator::from_weights(Arc::new(create_demo_model_seeded(1))).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut stream = gen.stream(&[500], 5, SamplingParams::default(), &mut rng);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }

    #[test]
    fn free_function_is_deterministic_with_seed() {
        let weights = Arc::new(create_demo_model_seeded(2));
        let params = SamplingParams::default();
        let mut rng = StdRng::seed_from_u64(5);
        let a = generate(&[10], weights.clone(), 8, &params, &mut rng).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let b = generate(&[10], weights, 8, &params, &mut rng).unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        assert!(a.iter().all(|&id| id < 96));
    }

    #[test]
    fn free_function_rejects_mis_sized_weights() {
        let mut weights = create_demo_model_seeded(2);
        weights.tok_emb = crate::kernels::Tensor2D::zeros(10, weights.d_model());
        let mut rng = StdRng::seed_from_u64(0);
        let err = generate(&[50], Arc::new(weights), 4, &SamplingParams::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GptError>(),
            Some(GptError::ShapeMismatch { .. })
        ));
    }
}
