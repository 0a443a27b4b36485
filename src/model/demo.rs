//! Build a tiny demo GPT model for testing (small random dense weights).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::GptConfig;
use super::weights::{Linear, LayerWeights, ModelWeights, NormWeights};
use crate::kernels::Tensor2D;

/// Unknown-character entry placed at id 0 of the demo vocabulary.
pub const DEMO_UNK: &str = "<unk>";

/// `<unk>` followed by printable ASCII (space through `~`).
pub fn demo_vocab() -> Vec<String> {
    std::iter::once(DEMO_UNK.to_string())
        .chain((b' '..=b'~').map(|b| (b as char).to_string()))
        .collect()
}

fn rand_matrix(rng: &mut impl Rng, rows: usize, cols: usize, scale: f32) -> Tensor2D {
    let mut t = Tensor2D::zeros(rows, cols);
    for v in t.as_mut_slice() {
        *v = rng.gen_range(-scale..scale);
    }
    t
}

fn rand_vec(rng: &mut impl Rng, n: usize, lo: f32, hi: f32) -> Vec<f32> {
    (0..n).map(|_| rng.gen_range(lo..=hi)).collect()
}

fn rand_linear(rng: &mut impl Rng, out_f: usize, in_f: usize) -> Linear {
    let scale = (in_f as f32).sqrt().recip();
    Linear {
        weight: rand_matrix(rng, out_f, in_f, scale),
        bias: rand_vec(rng, out_f, -0.01, 0.01),
    }
}

fn rand_norm(rng: &mut impl Rng, width: usize) -> NormWeights {
    NormWeights {
        gain: rand_vec(rng, width, 0.9, 1.1),
        bias: rand_vec(rng, width, -0.01, 0.01),
    }
}

/// Create a small demo model with random weights for testing/demo.
pub fn create_demo_model() -> ModelWeights {
    create_demo_model_seeded(rand::random::<u64>())
}

/// Create a deterministic demo model from a seed (for tests and golden outputs).
pub fn create_demo_model_seeded(seed: u64) -> ModelWeights {
    let mut rng = StdRng::seed_from_u64(seed);
    let vocab = demo_vocab();
    let config = GptConfig {
        vocab_size: vocab.len(),
        ..GptConfig::default()
    };
    let d = config.d_model;

    let layers = (0..config.n_layer)
        .map(|_| LayerWeights {
            ln1: rand_norm(&mut rng, d),
            ln2: rand_norm(&mut rng, d),
            attn_qkv: rand_linear(&mut rng, 3 * d, d),
            attn_proj: rand_linear(&mut rng, d, d),
            fc1: rand_linear(&mut rng, config.d_ff, d),
            fc2: rand_linear(&mut rng, d, config.d_ff),
        })
        .collect();

    let tok_emb = rand_matrix(&mut rng, config.vocab_size, d, 0.5);
    let pos_emb = rand_matrix(&mut rng, config.max_seq, d, 0.1);
    let final_norm = Some(rand_norm(&mut rng, d));

    ModelWeights {
        config,
        vocab: Some(vocab),
        tok_emb,
        pos_emb,
        layers,
        final_norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocab_is_printable_ascii_plus_unk() {
        let v = demo_vocab();
        assert_eq!(v.len(), 96);
        assert_eq!(v[0], DEMO_UNK);
        assert_eq!(v[1], " ");
        assert_eq!(v[95], "~");
    }

    #[test]
    fn seeded_models_are_identical() {
        assert_eq!(create_demo_model_seeded(9), create_demo_model_seeded(9));
        assert_ne!(create_demo_model_seeded(9), create_demo_model_seeded(10));
    }
}
