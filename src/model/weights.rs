//! Dense GPT weights: embeddings, pre-norm blocks and an optional final norm.

use crate::errors::GptError;
use crate::kernels::{layer_norm, linear, Tensor2D, LAYER_NORM_EPS};

use super::config::GptConfig;

/// LayerNorm affine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NormWeights {
    pub gain: Vec<f32>,
    pub bias: Vec<f32>,
}

impl NormWeights {
    pub fn forward(&self, x: &Tensor2D) -> Tensor2D {
        layer_norm(x, &self.gain, &self.bias, LAYER_NORM_EPS)
    }
}

/// Affine projection. `weight` holds one row per output feature (`O × D`).
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    pub weight: Tensor2D,
    pub bias: Vec<f32>,
}

impl Linear {
    pub fn forward(&self, x: &Tensor2D) -> Tensor2D {
        linear(x, &self.weight, &self.bias)
    }
}

/// One pre-norm decoder block.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    pub ln1: NormWeights,
    pub ln2: NormWeights,
    /// Fused Q/K/V projection, `3·d_model × d_model`.
    pub attn_qkv: Linear,
    pub attn_proj: Linear,
    pub fc1: Linear,
    pub fc2: Linear,
}

/// Full model. Immutable once built; share it through `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWeights {
    pub config: GptConfig,
    /// Character table for the char codec, when the document carries one.
    pub vocab: Option<Vec<String>>,
    /// `[vocab_size, d_model]`, also used as the output head.
    pub tok_emb: Tensor2D,
    /// `[>= max_seq, d_model]`
    pub pos_emb: Tensor2D,
    pub layers: Vec<LayerWeights>,
    pub final_norm: Option<NormWeights>,
}

fn check_len(field: String, expected: usize, actual: usize) -> Result<(), GptError> {
    if expected != actual {
        return Err(GptError::shape(field, expected, actual));
    }
    Ok(())
}

fn check_matrix(field: String, t: &Tensor2D, rows: usize, cols: usize) -> Result<(), GptError> {
    if t.shape() != (rows, cols) {
        return Err(GptError::shape(
            field,
            format!("{}x{}", rows, cols),
            format!("{}x{}", t.rows(), t.cols()),
        ));
    }
    Ok(())
}

fn check_linear(
    prefix: &str,
    name: &str,
    l: &Linear,
    out_f: usize,
    in_f: usize,
) -> Result<(), GptError> {
    check_matrix(format!("{}.{}_w", prefix, name), &l.weight, out_f, in_f)?;
    check_len(format!("{}.{}_b", prefix, name), out_f, l.bias.len())
}

fn check_norm(prefix: &str, name: &str, n: &NormWeights, width: usize) -> Result<(), GptError> {
    check_len(format!("{}{}_w", prefix, name), width, n.gain.len())?;
    check_len(format!("{}{}_b", prefix, name), width, n.bias.len())
}

impl ModelWeights {
    pub fn d_model(&self) -> usize {
        self.config.d_model
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Check every tensor against the config. Field names in errors follow
    /// the canonical document layout (`layers[0].fc1_w`, `ln_f_b`, ...).
    pub fn validate(&self) -> Result<(), GptError> {
        let c = &self.config;
        c.validate()?;
        let d = c.d_model;

        if let Some(vocab) = &self.vocab {
            check_len("vocab".to_string(), c.vocab_size, vocab.len())?;
        }
        check_matrix("tok_emb".to_string(), &self.tok_emb, c.vocab_size, d)?;
        if self.pos_emb.rows() < c.max_seq || self.pos_emb.cols() != d {
            return Err(GptError::shape(
                "pos_emb",
                format!(">={}x{}", c.max_seq, d),
                format!("{}x{}", self.pos_emb.rows(), self.pos_emb.cols()),
            ));
        }
        check_len("layers".to_string(), c.n_layer, self.layers.len())?;

        for (i, layer) in self.layers.iter().enumerate() {
            let p = format!("layers[{}]", i);
            check_norm(&format!("{}.", p), "ln1", &layer.ln1, d)?;
            check_norm(&format!("{}.", p), "ln2", &layer.ln2, d)?;
            check_linear(&p, "attn_qkv", &layer.attn_qkv, 3 * d, d)?;
            check_linear(&p, "attn_proj", &layer.attn_proj, d, d)?;
            check_linear(&p, "fc1", &layer.fc1, c.d_ff, d)?;
            check_linear(&p, "fc2", &layer.fc2, d, c.d_ff)?;
        }

        if let Some(norm) = &self.final_norm {
            check_norm("", "ln_f", norm, d)?;
        }
        Ok(())
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        let linear = |l: &Linear| l.weight.as_slice().len() + l.bias.len();
        let norm = |n: &NormWeights| n.gain.len() + n.bias.len();
        let layers: usize = self
            .layers
            .iter()
            .map(|l| {
                norm(&l.ln1)
                    + norm(&l.ln2)
                    + linear(&l.attn_qkv)
                    + linear(&l.attn_proj)
                    + linear(&l.fc1)
                    + linear(&l.fc2)
            })
            .sum();
        self.tok_emb.as_slice().len()
            + self.pos_emb.as_slice().len()
            + layers
            + self.final_norm.as_ref().map(norm).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::demo::create_demo_model_seeded;

    #[test]
    fn demo_model_validates() {
        let w = create_demo_model_seeded(1);
        w.validate().unwrap();
        assert!(w.parameter_count() > 0);
    }

    #[test]
    fn wrong_fc1_shape_names_the_field() {
        let mut w = create_demo_model_seeded(1);
        w.layers[1].fc1.weight = Tensor2D::zeros(3, w.d_model());
        let err = w.validate().unwrap_err().to_string();
        assert!(err.contains("layers[1].fc1_w"), "{}", err);
    }

    #[test]
    fn short_final_norm_names_the_field() {
        let mut w = create_demo_model_seeded(1);
        if let Some(n) = w.final_norm.as_mut() {
            n.bias.pop();
        }
        let err = w.validate().unwrap_err().to_string();
        assert!(err.contains("ln_f_b"), "{}", err);
    }

    #[test]
    fn short_pos_emb_is_rejected() {
        let mut w = create_demo_model_seeded(1);
        w.pos_emb = Tensor2D::zeros(2, w.d_model());
        let err = w.validate().unwrap_err().to_string();
        assert!(err.contains("pos_emb"), "{}", err);
    }
}
